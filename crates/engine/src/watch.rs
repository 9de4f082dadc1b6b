use crate::error::{EngineError, Result};
use crate::reconciler::Engine;
use crate::store::{DocEvent, VaultStore};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Filesystem watcher bridging change notifications into engine
/// commands. Producers only enqueue; the engine worker does every index
/// mutation. The periodic reconciliation scan covers anything this
/// listener misses.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    pub fn start(store: Arc<VaultStore>, engine: Engine) -> Result<VaultWatcher> {
        let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(1024);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| EngineError::Other(format!("watcher init failed: {e}")))?;
        watcher
            .watch(store.root(), RecursiveMode::Recursive)
            .map_err(|e| {
                EngineError::Other(format!(
                    "failed to watch {}: {e}",
                    store.root().display()
                ))
            })?;

        tokio::spawn(async move {
            while let Some(result) = event_rx.recv().await {
                match result {
                    Ok(event) => {
                        for doc_event in translate_event(&store, &event) {
                            if engine.notify(doc_event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => log::warn!("Watcher error: {err}"),
                }
            }
        });

        Ok(VaultWatcher { _watcher: watcher })
    }
}

/// Map a notify event onto document events, dropping non-note paths
fn translate_event(store: &VaultStore, event: &Event) -> Vec<DocEvent> {
    let relative = |path: &Path| store.relative_note_path(path);

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter_map(|p| relative(p).map(DocEvent::Created))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter_map(|p| relative(p).map(DocEvent::Deleted))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            match (
                event.paths.first().and_then(|p| relative(p)),
                event.paths.get(1).and_then(|p| relative(p)),
            ) {
                (Some(from), Some(to)) => vec![DocEvent::Renamed { from, to }],
                // A rename across the vault boundary degrades to the
                // half we can still see.
                (Some(from), None) => vec![DocEvent::Deleted(from)],
                (None, Some(to)) => vec![DocEvent::Created(to)],
                (None, None) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .filter_map(|p| relative(p).map(DocEvent::Deleted))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .filter_map(|p| relative(p).map(DocEvent::Created))
            .collect(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter_map(|p| relative(p).map(DocEvent::Modified))
            .collect(),
        _ => Vec::new(),
    }
}
