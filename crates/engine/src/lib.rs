//! # Noteseek Engine
//!
//! The reconciler: keeps the hybrid index synchronized with a mutable
//! vault of notes edited out-of-band, without blocking interactive use.
//!
//! ## Pipeline
//!
//! ```text
//! Vault directory
//!     │
//!     ├──> VaultWatcher (change events) ──┐
//!     │                                   ├──> debounce queue
//!     ├──> periodic bidirectional scan ───┘        │
//!     │                                       idle gate, batch cap
//!     │                                            │
//!     └──> Chunker ──> Index (phase 1) ──> Embeddings (phase 2)
//!                         │
//!                         └──> snapshot (dirty flag + timer)
//! ```
//!
//! One dedicated worker owns the index and the queue; queries and
//! mutations alike flow through its command channel.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use noteseek_engine::{Engine, EngineConfig, VaultStore};
//! use noteseek_providers::{HttpEmbeddingClient, ModelProfile};
//! use noteseek_search::{SearchMode, SearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let store = Arc::new(VaultStore::new("/path/to/vault")?);
//!     let embedder = Arc::new(HttpEmbeddingClient::new(
//!         config.embedding.base_url.as_str(),
//!         None,
//!         ModelProfile::for_model(&config.embedding.model),
//!     ));
//!     let snapshot = config.snapshot_path_for(std::path::Path::new("/path/to/vault"));
//!
//!     let engine = Engine::start(config, store, embedder, None, snapshot).await?;
//!     engine.reconcile_now().await?;
//!     let response = engine
//!         .search(SearchRequest::new("tea ceremony", SearchMode::Hybrid))
//!         .await?;
//!     println!("{} hits", response.hits.len());
//!     Ok(())
//! }
//! ```

mod activity;
mod config;
mod error;
mod queue;
mod reconciler;
mod store;
mod watch;

pub use activity::IdleGate;
pub use config::{EmbeddingConfig, EngineConfig, RerankConfig, SchedulingConfig};
pub use error::{EngineError, Result};
pub use queue::{DebounceQueue, QueueItem, QueueKind};
pub use reconciler::{DocState, Engine, EngineStatus, SearchResponse};
pub use store::{extract_tags, DocEvent, DocumentMeta, DocumentStore, VaultStore};
pub use watch::VaultWatcher;
