mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use noteseek_engine::{Engine, EngineConfig, VaultStore, VaultWatcher};
use noteseek_providers::{HttpEmbeddingClient, HttpRerankClient, ModelProfile, RerankProvider};
use noteseek_search::{SearchMode, SearchRequest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "noteseek", version, about = "Hybrid search over a local notes vault")]
struct Cli {
    /// Vault directory
    #[arg(long, default_value = ".", global = true)]
    vault: PathBuf,

    /// Config file (defaults to <vault>/.noteseek/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Fulltext,
    Vector,
    Hybrid,
}

impl From<Mode> for SearchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fulltext => Self::Fulltext,
            Mode::Vector => Self::Vector,
            Mode::Hybrid => Self::Hybrid,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Index the vault, then exit
    Index {
        /// Discard the existing snapshot and re-index everything
        #[arg(long)]
        full: bool,
    },
    /// Search the indexed vault
    Search {
        query: String,
        #[arg(long, value_enum, default_value = "hybrid")]
        mode: Mode,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Only notes under this path prefix
        #[arg(long)]
        path: Option<String>,
        /// Only notes carrying this tag (repeatable)
        #[arg(long)]
        tag: Vec<String>,
        /// Minimum similarity for vector results
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,
        /// Second-pass rerank via the judge model
        #[arg(long)]
        rerank: bool,
        /// Emit JSON instead of human output
        #[arg(long)]
        json: bool,
    },
    /// List notes by path pattern and tag, without touching the index
    Find {
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Index, then keep watching the vault until interrupted
    Watch,
    /// Show index counters and reconciliation state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let vault = cli
        .vault
        .canonicalize()
        .with_context(|| format!("vault directory not found: {}", cli.vault.display()))?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| vault.join(".noteseek").join("config.toml"));
    let config = EngineConfig::load_or_default(&config_path)?;
    let snapshot_path = config.snapshot_path_for(&vault);

    if let Command::Index { full: true } = cli.command {
        if snapshot_path.exists() {
            std::fs::remove_file(&snapshot_path)
                .with_context(|| format!("removing {}", snapshot_path.display()))?;
        }
    }

    let store = Arc::new(VaultStore::new(&vault)?);
    let embedder = Arc::new(HttpEmbeddingClient::new(
        config.embedding.base_url.as_str(),
        config.embedding.api_key(),
        ModelProfile::for_model(&config.embedding.model),
    ));
    let reranker: Option<Arc<dyn RerankProvider>> = config.rerank.enabled.then(|| {
        Arc::new(HttpRerankClient::new(
            config.rerank.base_url.as_str(),
            config.rerank.api_key(),
            config.rerank.model.as_str(),
        )) as Arc<dyn RerankProvider>
    });

    let engine = Engine::start(
        config,
        store.clone(),
        embedder,
        reranker,
        snapshot_path,
    )
    .await?;

    match cli.command {
        Command::Index { .. } => run_index(&engine).await?,
        Command::Search {
            query,
            mode,
            limit,
            path,
            tag,
            min_score,
            rerank,
            json,
        } => {
            let mut request = SearchRequest::new(query, mode.into());
            request.limit = limit;
            request.path_prefix = path;
            request.tags = tag;
            request.min_score = min_score;
            request.rerank = rerank;
            run_search(&engine, request, json).await?;
        }
        Command::Find { path, tag, json } => {
            let docs = engine.find(path, tag).await?;
            output::print_documents(&docs, json)?;
        }
        Command::Watch => run_watch(store, &engine).await?,
        Command::Status => {
            let status = engine.status().await?;
            output::print_status(&status);
        }
    }

    engine.shutdown().await?;
    Ok(())
}

/// Drive reconciliation cycles until the backlog is empty
async fn run_index(engine: &Engine) -> Result<()> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("valid progress template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut total = 0usize;
    loop {
        total += engine.reconcile_now().await?;
        let status = engine.status().await?;
        bar.set_message(format!(
            "indexed {total} notes ({} chunks, {} pending)",
            status.chunks, status.pending
        ));
        if status.pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    engine.flush().await?;

    let status = engine.status().await?;
    bar.finish_and_clear();
    println!(
        "Indexed {} notes, {} chunks ({} embedded)",
        status.documents, status.chunks, status.embedded_chunks
    );
    if status.embedded_chunks < status.chunks {
        println!(
            "{}",
            console::style("Some chunks are keyword-only; embeddings retry on the next run")
                .yellow()
        );
    }
    Ok(())
}

async fn run_search(engine: &Engine, request: SearchRequest, json: bool) -> Result<()> {
    let status = engine.status().await?;
    if status.documents == 0 {
        log::warn!("Index is empty; run `noteseek index` first");
    }

    let response = engine.search(request).await?;
    output::print_hits(&response.hits, json)?;
    Ok(())
}

/// Index the vault, then follow change notifications until ctrl-c
async fn run_watch(store: Arc<VaultStore>, engine: &Engine) -> Result<()> {
    run_index(engine).await?;
    let _watcher = VaultWatcher::start(store, engine.clone())?;
    println!("Watching for changes (ctrl-c to stop)");

    tokio::signal::ctrl_c().await?;
    println!("Shutting down");
    engine.flush().await?;
    Ok(())
}
