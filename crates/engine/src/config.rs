use crate::error::{EngineError, Result};
use noteseek_chunker::ChunkerConfig;
use noteseek_search::QueryOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Explicit embedding dimension; resolved from the provider's
    /// model-info endpoint when unset
    pub dimension: Option<usize>,
    /// Environment variable holding the API key, if the provider needs one
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: None,
            api_key_env: None,
        }
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}

/// Judge-model rerank settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:3b".to_string(),
            api_key_env: None,
        }
    }
}

impl RerankConfig {
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}

/// Reconciler timing and batching. The defaults are observed-in-practice
/// values kept as configuration rather than hard-coded assumptions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Debounce window for change events; reset on repeat events per path
    pub debounce_secs: u64,
    /// Interval between bidirectional reconciliation scans
    pub reconcile_interval_secs: u64,
    /// Indexing waits until no activity signal for this long
    pub idle_threshold_secs: u64,
    /// Stale documents processed per reconciliation cycle
    pub batch_cap: usize,
    /// Dirty-flag snapshot save interval
    pub save_interval_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 3,
            reconcile_interval_secs: 60,
            idle_threshold_secs: 120,
            batch_cap: 10,
            save_interval_secs: 30,
        }
    }
}

impl SchedulingConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    #[must_use]
    pub const fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    #[must_use]
    pub const fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

/// Full engine configuration, loadable from a TOML file with environment
/// overrides for the provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
    pub scheduling: SchedulingConfig,
    pub chunking: ChunkerConfig,
    pub query: QueryOptions,
    /// Snapshot location; defaults to `.noteseek/index.json` under the vault
    pub snapshot_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file if present, defaults otherwise; env overrides apply
    /// either way
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NOTESEEK_EMBEDDING_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("NOTESEEK_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(url) = std::env::var("NOTESEEK_RERANK_URL") {
            self.rerank.base_url = url;
        }
    }

    #[must_use]
    pub fn snapshot_path_for(&self, vault_dir: &Path) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| vault_dir.join(".noteseek").join("index.json"))
    }
}
