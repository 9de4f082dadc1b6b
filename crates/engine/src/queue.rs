use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Work kind for a queued path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Index,
    Delete,
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub path: String,
    pub kind: QueueKind,
    pub deadline: Instant,
}

/// Debounced work queue, deduplicated by path.
///
/// A change event for an already-queued path resets its deadline instead
/// of creating a duplicate entry, collapsing rapid edit bursts into one
/// re-index. Scan-discovered staleness enqueues without disturbing a
/// pending debounce window.
#[derive(Debug)]
pub struct DebounceQueue {
    debounce: Duration,
    items: HashMap<String, QueueItem>,
}

impl DebounceQueue {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            items: HashMap::new(),
        }
    }

    /// Enqueue from a change event: the deadline is pushed out to
    /// `now + debounce` even when the path is already queued
    pub fn enqueue_event(&mut self, path: &str, kind: QueueKind) {
        let deadline = Instant::now() + self.debounce;
        self.items.insert(
            path.to_string(),
            QueueItem {
                path: path.to_string(),
                kind,
                deadline,
            },
        );
    }

    /// Enqueue from a reconciliation scan: immediate deadline, but an
    /// existing entry (possibly mid-debounce) is left untouched
    pub fn enqueue_scan(&mut self, path: &str, kind: QueueKind) {
        self.items
            .entry(path.to_string())
            .or_insert_with(|| QueueItem {
                path: path.to_string(),
                kind,
                deadline: Instant::now(),
            });
    }

    /// Put a deferred item back with a fresh debounce window
    pub fn requeue(&mut self, item: QueueItem) {
        let deadline = Instant::now() + self.debounce;
        self.items.insert(
            item.path.clone(),
            QueueItem { deadline, ..item },
        );
    }

    /// Earliest pending deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.items.values().map(|item| item.deadline).min()
    }

    /// Remove and return up to `max` items whose deadline has passed,
    /// earliest first
    pub fn take_due(&mut self, now: Instant, max: usize) -> Vec<QueueItem> {
        let mut due: Vec<QueueItem> = self
            .items
            .values()
            .filter(|item| item.deadline <= now)
            .cloned()
            .collect();
        due.sort_by_key(|item| item.deadline);
        due.truncate(max);
        for item in &due {
            self.items.remove(&item.path);
        }
        due
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn repeat_events_reset_the_deadline_without_duplicates() {
        let mut queue = DebounceQueue::new(Duration::from_secs(3));
        queue.enqueue_event("a.md", QueueKind::Index);
        let first = queue.next_deadline().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        queue.enqueue_event("a.md", QueueKind::Index);

        assert_eq!(queue.len(), 1);
        assert!(queue.next_deadline().unwrap() > first);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_enqueue_does_not_disturb_pending_debounce() {
        let mut queue = DebounceQueue::new(Duration::from_secs(3));
        queue.enqueue_event("a.md", QueueKind::Index);
        let pending = queue.next_deadline().unwrap();

        queue.enqueue_scan("a.md", QueueKind::Index);
        assert_eq!(queue.next_deadline().unwrap(), pending);

        // A fresh path from a scan is due immediately.
        queue.enqueue_scan("b.md", QueueKind::Index);
        let due = queue.take_due(Instant::now(), 10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].path, "b.md");
    }

    #[tokio::test(start_paused = true)]
    async fn take_due_honors_the_cap() {
        let mut queue = DebounceQueue::new(Duration::ZERO);
        for i in 0..25 {
            queue.enqueue_event(&format!("{i}.md"), QueueKind::Index);
        }
        tokio::time::advance(Duration::from_millis(1)).await;

        let due = queue.take_due(Instant::now(), 10);
        assert_eq!(due.len(), 10);
        assert_eq!(queue.len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_event_overrides_queued_index() {
        let mut queue = DebounceQueue::new(Duration::ZERO);
        queue.enqueue_event("a.md", QueueKind::Index);
        queue.enqueue_event("a.md", QueueKind::Delete);
        tokio::time::advance(Duration::from_millis(1)).await;

        let due = queue.take_due(Instant::now(), 10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, QueueKind::Delete);
    }
}
