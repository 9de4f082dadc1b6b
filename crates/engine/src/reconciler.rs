use crate::activity::IdleGate;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::queue::{DebounceQueue, QueueKind};
use crate::store::{DocEvent, DocumentMeta, DocumentStore};
use globset::Glob;
use noteseek_chunker::Chunker;
use noteseek_index::{load_snapshot, save_snapshot, SearchIndex};
use noteseek_providers::{EmbeddingProvider, RerankProvider};
use noteseek_search::{QueryEngine, SearchHit, SearchRequest};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Per-document reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    Unknown,
    Stale,
    Indexing,
    Current,
    Absent,
}

/// Pollable engine health, answered by the worker
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    /// Queued paths awaiting their debounce or idle window
    pub pending: usize,
    pub stale: usize,
    pub indexing: bool,
    /// Seconds until queued work may start ("processing in N seconds");
    /// `None` when the idle gate is already open
    pub idle_in_secs: Option<u64>,
    pub last_error: Option<String>,
}

/// A search answer tagged with its submission sequence number. A caller
/// holding results from two in-flight queries keeps the higher sequence
/// and discards the other.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub sequence: u64,
    pub hits: Vec<SearchHit>,
}

enum EngineCommand {
    Search {
        request: SearchRequest,
        reply: oneshot::Sender<Result<Vec<SearchHit>>>,
    },
    Event(DocEvent),
    SetActive(Option<String>),
    Activity,
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Find {
        path_pattern: Option<String>,
        tag: Option<String>,
        reply: oneshot::Sender<Result<Vec<DocumentMeta>>>,
    },
    Reconcile {
        reply: oneshot::Sender<Result<usize>>,
    },
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the engine actor.
///
/// One dedicated worker owns the index, the queue, and the document
/// states; every read and write funnels through its command channel, so
/// no lock ever guards the index itself.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    command_tx: mpsc::Sender<EngineCommand>,
    sequence: AtomicU64,
}

impl Engine {
    /// Resolve the embedding dimension, load (or discard) the snapshot,
    /// and spawn the worker. Fails only on configuration errors: an
    /// unreachable provider with no configured dimension, or a snapshot
    /// built for a different model or dimension.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
        snapshot_path: PathBuf,
    ) -> Result<Engine> {
        let dimension = match config.embedding.dimension {
            Some(dimension) => dimension,
            None => {
                embedder
                    .model_info()
                    .await
                    .map_err(|e| {
                        EngineError::Config(format!(
                            "embedding dimension not configured and provider unavailable: {e}"
                        ))
                    })?
                    .dimension
            }
        };

        let outcome = load_snapshot(&snapshot_path, &config.embedding.model, dimension).await?;
        if outcome.needs_rebuild() {
            log::info!("Index snapshot unusable; all notes will be re-indexed");
        }
        let index = outcome.into_index();

        let query_engine = QueryEngine::new(embedder.clone(), reranker, config.query.clone());
        let chunker = Chunker::new(config.chunking.clone());

        let (command_tx, command_rx) = mpsc::channel(256);
        let now = Instant::now();
        let worker = EngineWorker {
            store,
            embedder,
            chunker,
            query_engine,
            index,
            queue: DebounceQueue::new(config.scheduling.debounce()),
            idle: IdleGate::new(config.scheduling.idle_threshold()),
            states: HashMap::new(),
            needs_embedding: HashSet::new(),
            active_path: None,
            snapshot_path,
            dirty: false,
            last_save: now,
            // The first periodic scan runs one interval in; callers who
            // want an immediate sync use `reconcile_now`.
            next_reconcile: now + config.scheduling.reconcile_interval(),
            indexing: false,
            last_error: None,
            config,
        };

        tokio::spawn(worker.run(command_rx));

        Ok(Engine {
            inner: Arc::new(EngineInner {
                command_tx,
                sequence: AtomicU64::new(0),
            }),
        })
    }

    /// Execute a query. The returned sequence number lets the caller
    /// discard a late result that was overtaken by a newer query.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(EngineCommand::Search { request, reply })
            .await?;
        let hits = rx.await??;
        Ok(SearchResponse { sequence, hits })
    }

    /// Feed a change notification; producers only enqueue, the worker
    /// mutates the index
    pub async fn notify(&self, event: DocEvent) -> Result<()> {
        self.inner
            .command_tx
            .send(EngineCommand::Event(event))
            .await?;
        Ok(())
    }

    /// Mark the note the user currently has open; it will be deferred
    /// and re-queued instead of indexed under their cursor
    pub async fn set_active_document(&self, path: Option<String>) -> Result<()> {
        self.inner
            .command_tx
            .send(EngineCommand::SetActive(path))
            .await?;
        Ok(())
    }

    /// Record a user-activity signal, arming the idle gate
    pub async fn record_activity(&self) -> Result<()> {
        self.inner.command_tx.send(EngineCommand::Activity).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(EngineCommand::Status { reply })
            .await?;
        Ok(rx.await?)
    }

    /// Thin pass-through to the document store, independent of the index
    pub async fn find(
        &self,
        path_pattern: Option<String>,
        tag: Option<String>,
    ) -> Result<Vec<DocumentMeta>> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(EngineCommand::Find {
                path_pattern,
                tag,
                reply,
            })
            .await?;
        rx.await?
    }

    /// Run one reconciliation cycle now: a bidirectional scan plus a
    /// single batch-capped drain, bypassing the idle gate (an explicit
    /// request is its own activity signal). Returns the number of
    /// documents processed; call again while `status().pending > 0` to
    /// work through a backlog.
    pub async fn reconcile_now(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(EngineCommand::Reconcile { reply })
            .await?;
        rx.await?
    }

    /// Persist the snapshot immediately regardless of the dirty timer
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(EngineCommand::Flush { reply })
            .await?;
        rx.await?
    }

    /// Stop the worker after a best-effort flush
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(EngineCommand::Shutdown { reply })
            .await?;
        rx.await?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let (reply, _rx) = oneshot::channel();
            let _ = self
                .inner
                .command_tx
                .try_send(EngineCommand::Shutdown { reply });
        }
    }
}

struct EngineWorker {
    config: EngineConfig,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    query_engine: QueryEngine,
    index: SearchIndex,
    queue: DebounceQueue,
    idle: IdleGate,
    states: HashMap<String, DocState>,
    /// Notes indexed keyword-only because embedding failed; retried on
    /// the next reconciliation cycle
    needs_embedding: HashSet<String>,
    active_path: Option<String>,
    snapshot_path: PathBuf,
    dirty: bool,
    last_save: Instant,
    next_reconcile: Instant,
    indexing: bool,
    last_error: Option<String>,
}

impl EngineWorker {
    async fn run(mut self, mut command_rx: mpsc::Receiver<EngineCommand>) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                // Commands outrank background ticks so queries are never
                // stuck behind a pending index batch.
                biased;
                maybe_cmd = command_rx.recv() => {
                    match maybe_cmd {
                        Some(EngineCommand::Shutdown { reply }) => {
                            self.flush_on_exit().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.flush_on_exit().await;
                            break;
                        }
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    self.on_tick().await;
                }
            }
        }
        log::info!("Engine worker stopped");
    }

    /// Earliest instant at which timed work is due: the reconcile tick,
    /// the idle-gated queue deadline, or the dirty-save deadline
    fn next_deadline(&self) -> Instant {
        let now = Instant::now();
        let mut deadline = self.next_reconcile;
        if let Some(queue_deadline) = self.queue.next_deadline() {
            deadline = deadline.min(queue_deadline.max(self.idle.ready_at(now)));
        }
        if self.dirty {
            deadline = deadline.min(self.last_save + self.config.scheduling.save_interval());
        }
        deadline
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        if now >= self.next_reconcile {
            if let Err(err) = self.scan().await {
                log::warn!("Reconciliation scan failed: {err}");
                self.last_error = Some(err.to_string());
            }
            self.next_reconcile = Instant::now() + self.config.scheduling.reconcile_interval();
        }

        if self.idle.is_idle(now) {
            self.drain(now).await;
        }

        self.maybe_save(Instant::now()).await;
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Search { request, reply } => {
                let result = self
                    .query_engine
                    .search(&self.index, &request)
                    .await
                    .map_err(EngineError::from);
                let _ = reply.send(result);
            }
            EngineCommand::Event(event) => self.handle_event(event).await,
            EngineCommand::SetActive(path) => self.active_path = path,
            EngineCommand::Activity => self.idle.record_activity(),
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineCommand::Find {
                path_pattern,
                tag,
                reply,
            } => {
                let _ = reply.send(self.find(path_pattern, tag).await);
            }
            EngineCommand::Reconcile { reply } => {
                let result = match self.scan().await {
                    // Manual reconciliation is user-initiated: skip the idle gate.
                    Ok(_) => Ok(self.drain(Instant::now()).await),
                    Err(err) => Err(err),
                };
                self.maybe_save(Instant::now()).await;
                let _ = reply.send(result);
            }
            EngineCommand::Flush { reply } => {
                let result = self.save().await;
                let _ = reply.send(result);
            }
            EngineCommand::Shutdown { .. } => unreachable!("handled in run loop"),
        }
    }

    /// Change notifications both arm the idle gate and enqueue work
    async fn handle_event(&mut self, event: DocEvent) {
        self.idle.record_activity();
        match event {
            DocEvent::Created(path) | DocEvent::Modified(path) => {
                self.states.insert(path.clone(), DocState::Stale);
                self.queue.enqueue_event(&path, QueueKind::Index);
            }
            DocEvent::Deleted(path) => {
                self.queue.enqueue_event(&path, QueueKind::Delete);
            }
            DocEvent::Renamed { from, to } => self.handle_rename(from, to).await,
        }
    }

    /// A rename whose content is unchanged is a metadata-only move, no
    /// re-embedding; anything else becomes delete + insert
    async fn handle_rename(&mut self, from: String, to: String) {
        let new_content = match self.store.read_content(&to).await {
            Ok(Some(content)) => content,
            _ => {
                self.queue.enqueue_event(&from, QueueKind::Delete);
                self.queue.enqueue_event(&to, QueueKind::Index);
                return;
            }
        };

        let unchanged = self.index.chunks_for_document(&from).is_some_and(|stored| {
            let fresh = self.chunker.chunk(&new_content, &from);
            stored.len() == fresh.len()
                && stored.iter().zip(&fresh).all(|(a, b)| a.content == b.content)
        });

        if unchanged {
            self.index.rename_document(&from, &to);
            if self.needs_embedding.remove(&from) {
                self.needs_embedding.insert(to.clone());
            }
            self.states.insert(from, DocState::Absent);
            self.states.insert(to, DocState::Current);
            self.dirty = true;
        } else {
            self.queue.enqueue_event(&from, QueueKind::Delete);
            self.queue.enqueue_event(&to, QueueKind::Index);
        }
    }

    /// Bidirectional reconciliation: forward (live mtimes vs indexed
    /// mtimes) and reverse (indexed paths vs live paths). The safety net
    /// for changes made while the engine was not running and for events
    /// the listener missed.
    async fn scan(&mut self) -> Result<usize> {
        let live = self.store.list_documents().await?;
        let mut live_paths: HashSet<String> = HashSet::with_capacity(live.len());
        let mut newly_stale = 0;

        for doc in live {
            let stale = self
                .index
                .document_mtime(&doc.path)
                .is_none_or(|indexed| doc.mtime > indexed);
            if stale {
                self.states.insert(doc.path.clone(), DocState::Stale);
                self.queue.enqueue_scan(&doc.path, QueueKind::Index);
                newly_stale += 1;
            } else if self.needs_embedding.contains(&doc.path) {
                // Keyword-only note: retry the embedding phase this cycle.
                self.queue.enqueue_scan(&doc.path, QueueKind::Index);
            }
            live_paths.insert(doc.path);
        }

        for path in self.index.paths() {
            if !live_paths.contains(&path) {
                log::debug!("Orphaned index entry for {path}");
                self.queue.enqueue_scan(&path, QueueKind::Delete);
            }
        }

        if newly_stale > 0 {
            log::info!("Reconciliation found {newly_stale} stale notes");
        }
        Ok(newly_stale)
    }

    /// Process up to `batch_cap` due items; the rest wait for the next
    /// cycle so a large backlog never causes an unbounded pause
    async fn drain(&mut self, now: Instant) -> usize {
        let batch = self
            .queue
            .take_due(now, self.config.scheduling.batch_cap);
        if batch.is_empty() {
            return 0;
        }

        self.indexing = true;
        let mut processed = 0;
        for item in batch {
            if self.active_path.as_deref() == Some(item.path.as_str()) {
                log::debug!("Deferring actively edited note {}", item.path);
                self.queue.requeue(item);
                continue;
            }
            match item.kind {
                QueueKind::Index => self.index_document(&item.path).await,
                QueueKind::Delete => self.delete_document(&item.path),
            }
            processed += 1;
            // Yield between documents so interactive work is never starved.
            tokio::task::yield_now().await;
        }
        self.indexing = false;
        processed
    }

    async fn index_document(&mut self, path: &str) {
        self.states.insert(path.to_string(), DocState::Indexing);

        let meta = match self.store.metadata(path).await {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                // Deleted mid-reconciliation: idempotent removal.
                self.delete_document(path);
                return;
            }
            Err(err) => {
                log::warn!("Failed to stat {path}: {err}");
                self.last_error = Some(err.to_string());
                self.states.insert(path.to_string(), DocState::Stale);
                return;
            }
        };
        let content = match self.store.read_content(path).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                self.delete_document(path);
                return;
            }
            Err(err) => {
                log::warn!("Failed to read {path}: {err}");
                self.last_error = Some(err.to_string());
                self.states.insert(path.to_string(), DocState::Stale);
                return;
            }
        };

        let chunks = self.chunker.chunk(&content, path);

        // Phase 1: keyword-searchable immediately, embeddings or not.
        self.index
            .insert_document(path, chunks, meta.mtime, meta.tags, meta.folder);
        self.dirty = true;
        self.states.insert(path.to_string(), DocState::Current);

        // Phase 2: embeddings. Failure leaves the note keyword-only.
        self.attach_embeddings(path).await;
    }

    async fn attach_embeddings(&mut self, path: &str) {
        let texts: Vec<String> = self
            .index
            .chunks_for_document(path)
            .map(|chunks| chunks.iter().map(|c| c.content.clone()).collect())
            .unwrap_or_default();
        if texts.is_empty() {
            return;
        }

        match self.embedder.embed_documents(&texts).await {
            Ok(vectors) => match self.index.attach_embeddings(path, vectors) {
                Ok(()) => {
                    self.needs_embedding.remove(path);
                    self.dirty = true;
                }
                Err(err) => {
                    log::warn!("Rejected embeddings for {path}: {err}");
                    self.last_error = Some(err.to_string());
                }
            },
            Err(err) => {
                log::warn!("Embedding failed for {path}: {err}; note stays keyword-searchable");
                self.needs_embedding.insert(path.to_string());
                self.last_error = Some(err.to_string());
            }
        }
    }

    fn delete_document(&mut self, path: &str) {
        // Idempotent: removing an already-absent note is a no-op.
        if self.index.remove_document(path) {
            self.dirty = true;
        }
        self.needs_embedding.remove(path);
        self.states.insert(path.to_string(), DocState::Absent);
    }

    fn status(&self) -> EngineStatus {
        let stats = self.index.stats();
        let now = Instant::now();
        let idle_in_secs = if self.queue.is_empty() {
            None
        } else {
            self.idle.remaining(now).map(|wait| wait.as_secs())
        };
        EngineStatus {
            documents: stats.documents,
            chunks: stats.chunks,
            embedded_chunks: stats.embedded_chunks,
            pending: self.queue.len(),
            stale: self
                .states
                .values()
                .filter(|state| matches!(state, DocState::Stale | DocState::Indexing))
                .count(),
            indexing: self.indexing,
            idle_in_secs,
            last_error: self.last_error.clone(),
        }
    }

    async fn find(
        &self,
        path_pattern: Option<String>,
        tag: Option<String>,
    ) -> Result<Vec<DocumentMeta>> {
        let matcher = match path_pattern {
            Some(pattern) => Some(
                Glob::new(&pattern)
                    .map_err(|e| EngineError::Config(format!("invalid path pattern: {e}")))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let docs = self.store.list_documents().await?;
        Ok(docs
            .into_iter()
            .filter(|doc| {
                matcher
                    .as_ref()
                    .is_none_or(|m| m.is_match(&doc.path))
            })
            .filter(|doc| {
                tag.as_ref()
                    .is_none_or(|t| doc.tags.iter().any(|have| have == t))
            })
            .collect())
    }

    async fn maybe_save(&mut self, now: Instant) {
        if self.dirty && now >= self.last_save + self.config.scheduling.save_interval() {
            let _ = self.save().await;
        }
    }

    async fn save(&mut self) -> Result<()> {
        match save_snapshot(&self.index, &self.snapshot_path).await {
            Ok(()) => {
                self.dirty = false;
                self.last_save = Instant::now();
                Ok(())
            }
            Err(err) => {
                log::warn!("Failed to save index snapshot: {err}");
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Mandatory flush on shutdown, best-effort
    async fn flush_on_exit(&mut self) {
        if self.dirty {
            let _ = self.save().await;
        }
    }
}
