//! Index recovery queue.
//!
//! When a file mutation succeeds but the matching index mutation
//! fails, the tool call still succeeds and the mutation lands here.
//! A single background worker replays entries against the index with
//! exponential backoff until they stick or run out of retries. The
//! queue lives in process memory only; it does not survive a restart.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RecoveryConfig;
use crate::error::Result;
use crate::index::SearchIndex;
use crate::metrics::{MetricsCollector, QueueGauge};
use crate::store::NoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryOperation {
    Index,
    Update,
    Delete,
}

impl RecoveryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryOperation::Index => "index",
            RecoveryOperation::Update => "update",
            RecoveryOperation::Delete => "delete",
        }
    }
}

/// A deferred index mutation. Keyed by `(note_uid, operation)`;
/// re-enqueueing the same key replaces the prior entry.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub operation: RecoveryOperation,
    pub note_uid: String,
    pub note_file_path: Option<PathBuf>,
    pub first_enqueued_at: Instant,
    pub retries: u32,
    pub last_error: String,
}

impl RecoveryEntry {
    fn key(&self) -> (String, RecoveryOperation) {
        (self.note_uid.clone(), self.operation)
    }

    /// Due when `now >= first_enqueued_at + base * 2^retries`.
    /// `first_enqueued_at` is reset on every failed retry, so the
    /// backoff always measures from the most recent attempt.
    fn is_due(&self, now: Instant, base: std::time::Duration) -> bool {
        let wait = base.saturating_mul(2u32.saturating_pow(self.retries));
        now.checked_duration_since(self.first_enqueued_at)
            .map(|elapsed| elapsed >= wait)
            .unwrap_or(false)
    }
}

/// Serializable view of one queue entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub operation: RecoveryOperation,
    pub note_uid: String,
    pub note_file_path: Option<PathBuf>,
    pub retries: u32,
    pub last_error: String,
}

/// Snapshot of the whole queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub processing: bool,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Default)]
struct State {
    entries: Vec<RecoveryEntry>,
    processing: bool,
    worker_running: bool,
    stopped: bool,
    success_count: u64,
    failure_count: u64,
    worker: Option<JoinHandle<()>>,
}

pub struct RecoveryQueue {
    store: Arc<NoteStore>,
    index: Arc<SearchIndex>,
    metrics: Arc<MetricsCollector>,
    config: RecoveryConfig,
    state: Mutex<State>,
}

impl RecoveryQueue {
    pub fn new(
        store: Arc<NoteStore>,
        index: Arc<SearchIndex>,
        metrics: Arc<MetricsCollector>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            index,
            metrics,
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Upsert an entry and make sure the worker is running.
    pub fn enqueue(
        self: &Arc<Self>,
        operation: RecoveryOperation,
        note_uid: &str,
        note_file_path: Option<PathBuf>,
        error: &str,
    ) {
        let entry = RecoveryEntry {
            operation,
            note_uid: note_uid.to_string(),
            note_file_path,
            first_enqueued_at: Instant::now(),
            retries: 0,
            last_error: error.to_string(),
        };

        let mut state = self.lock();
        if state.stopped {
            tracing::warn!(uid = note_uid, op = operation.as_str(), "queue stopped, dropping entry");
            return;
        }

        let key = entry.key();
        state.entries.retain(|existing| existing.key() != key);
        state.entries.push(entry);
        tracing::debug!(
            uid = note_uid,
            op = operation.as_str(),
            size = state.entries.len(),
            "enqueued index recovery entry"
        );

        if !state.worker_running {
            state.worker_running = true;
            let queue = Arc::clone(self);
            state.worker = Some(tokio::spawn(async move { queue.worker_loop().await }));
        }
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            size: state.entries.len(),
            processing: state.processing,
            entries: state
                .entries
                .iter()
                .map(|e| EntrySnapshot {
                    operation: e.operation,
                    note_uid: e.note_uid.clone(),
                    note_file_path: e.note_file_path.clone(),
                    retries: e.retries,
                    last_error: e.last_error.clone(),
                })
                .collect(),
        }
    }

    /// Stop the worker and drop (but log) anything still queued.
    pub fn cleanup(&self) {
        let (residual, worker) = {
            let mut state = self.lock();
            state.stopped = true;
            state.worker_running = false;
            (std::mem::take(&mut state.entries), state.worker.take())
        };

        if let Some(handle) = worker {
            handle.abort();
        }
        for entry in residual {
            tracing::error!(
                uid = %entry.note_uid,
                op = entry.operation.as_str(),
                retries = entry.retries,
                "recovery entry dropped at shutdown"
            );
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.worker_interval).await;

            let due: Vec<RecoveryEntry> = {
                let mut state = self.lock();
                if state.stopped {
                    state.worker_running = false;
                    return;
                }
                state.processing = true;
                let now = Instant::now();
                state
                    .entries
                    .iter()
                    .filter(|e| e.is_due(now, self.config.base_delay))
                    .cloned()
                    .collect()
            };

            let processed = due.len();
            for entry in due {
                let outcome = self.apply(&entry).await;
                let mut state = self.lock();
                match outcome {
                    Ok(()) => {
                        let key = entry.key();
                        state.entries.retain(|e| e.key() != key);
                        state.success_count += 1;
                        tracing::info!(
                            uid = %entry.note_uid,
                            op = entry.operation.as_str(),
                            "recovered index mutation"
                        );
                    }
                    Err(err) => {
                        let abandoned = register_failure(
                            &mut state.entries,
                            &entry.key(),
                            &err.to_string(),
                            self.config.max_retries,
                            Instant::now(),
                        );
                        if abandoned {
                            state.failure_count += 1;
                            tracing::error!(
                                uid = %entry.note_uid,
                                op = entry.operation.as_str(),
                                max_retries = self.config.max_retries,
                                %err,
                                "abandoning index recovery entry"
                            );
                        } else {
                            tracing::warn!(
                                uid = %entry.note_uid,
                                op = entry.operation.as_str(),
                                %err,
                                "index recovery attempt failed"
                            );
                        }
                    }
                }
            }

            let stop = {
                let mut state = self.lock();
                state.processing = false;
                self.metrics.record_queue(QueueGauge {
                    queue_size: state.entries.len(),
                    processing_count: processed,
                    success_count: state.success_count,
                    failure_count: state.failure_count,
                    timestamp: chrono::Utc::now(),
                });
                if state.entries.is_empty() || state.stopped {
                    state.worker_running = false;
                    true
                } else {
                    false
                }
            };
            if stop {
                return;
            }
        }
    }

    /// Replay one entry against the index, taking the disk as truth:
    /// a note that no longer exists is removed from the index even
    /// for `index`/`update` operations.
    async fn apply(&self, entry: &RecoveryEntry) -> Result<()> {
        match entry.operation {
            RecoveryOperation::Delete => self.index.remove_note(&entry.note_uid).await,
            RecoveryOperation::Index | RecoveryOperation::Update => {
                let mut found = None;
                if let Some(path) = &entry.note_file_path {
                    if let Ok(note) = self.store.load_lenient(path).await {
                        if note.front.id == entry.note_uid {
                            found = Some((path.clone(), note));
                        }
                    }
                }
                if found.is_none() {
                    found = self.store.find_by_uid(&entry.note_uid).await?;
                }

                match found {
                    Some((path, note)) => {
                        let rel = path
                            .strip_prefix(self.store.vault_path())
                            .unwrap_or(&path)
                            .to_string_lossy()
                            .into_owned();
                        self.index.index_note(&note, &rel).await
                    }
                    None => self.index.remove_note(&entry.note_uid).await,
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Bookkeeping for a failed retry. Returns true when the entry hit
/// the retry ceiling and was removed.
fn register_failure(
    entries: &mut Vec<RecoveryEntry>,
    key: &(String, RecoveryOperation),
    error: &str,
    max_retries: u32,
    now: Instant,
) -> bool {
    let Some(position) = entries.iter().position(|e| &e.key() == key) else {
        return false;
    };

    let entry = &mut entries[position];
    entry.retries += 1;
    entry.last_error = error.to_string();
    entry.first_enqueued_at = now;

    if entry.retries >= max_retries {
        entries.remove(position);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, FrontMatter, Note};

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(20),
            worker_interval: Duration::from_millis(10),
        }
    }

    fn build_queue(temp: &TempDir) -> (Arc<RecoveryQueue>, Arc<NoteStore>, Arc<SearchIndex>) {
        let store = Arc::new(NoteStore::new(temp.path().to_path_buf()));
        let index = Arc::new(SearchIndex::open(&temp.path().join(".zettel/index.db")).unwrap());
        let metrics = Arc::new(MetricsCollector::new());
        let queue = Arc::new(RecoveryQueue::new(
            Arc::clone(&store),
            Arc::clone(&index),
            metrics,
            fast_config(),
        ));
        (queue, store, index)
    }

    fn entry(uid: &str, op: RecoveryOperation) -> RecoveryEntry {
        RecoveryEntry {
            operation: op,
            note_uid: uid.to_string(),
            note_file_path: None,
            first_enqueued_at: Instant::now(),
            retries: 0,
            last_error: "initial".into(),
        }
    }

    #[tokio::test]
    async fn enqueue_same_key_replaces_prior_entry() {
        let temp = TempDir::new().unwrap();
        let (queue, _store, _index) = build_queue(&temp);

        queue.enqueue(RecoveryOperation::Index, "uid-1", None, "first failure");
        queue.enqueue(RecoveryOperation::Index, "uid-1", None, "second failure");

        let status = queue.status();
        assert_eq!(status.size, 1);
        assert_eq!(status.entries[0].last_error, "second failure");
        assert_eq!(status.entries[0].retries, 0);

        queue.cleanup();
    }

    #[tokio::test]
    async fn distinct_operations_are_distinct_keys() {
        let temp = TempDir::new().unwrap();
        let (queue, _store, _index) = build_queue(&temp);

        queue.enqueue(RecoveryOperation::Index, "uid-1", None, "a");
        queue.enqueue(RecoveryOperation::Delete, "uid-1", None, "b");
        assert_eq!(queue.status().size, 2);

        queue.cleanup();
    }

    #[tokio::test]
    async fn worker_drains_successful_entries_and_stops() {
        let temp = TempDir::new().unwrap();
        let (queue, store, index) = build_queue(&temp);

        let mut note = Note::new(FrontMatter::new(mint_uid(), "Recover Me".into()), "body".into());
        let path = store.save(&mut note).await.unwrap();

        queue.enqueue(
            RecoveryOperation::Index,
            &note.front.id,
            Some(path),
            "index was down",
        );

        // Give the worker a few cycles to come due and drain
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if queue.status().size == 0 {
                break;
            }
        }

        assert_eq!(queue.status().size, 0);
        assert!(index.get_note(&note.front.id).await.unwrap().is_some());

        queue.cleanup();
    }

    #[tokio::test]
    async fn delete_entries_remove_index_rows() {
        let temp = TempDir::new().unwrap();
        let (queue, _store, index) = build_queue(&temp);

        let note = Note::new(FrontMatter::new(mint_uid(), "Ghost".into()), "body".into());
        index.index_note(&note, "ghost.md").await.unwrap();

        queue.enqueue(RecoveryOperation::Delete, &note.front.id, None, "delete failed");

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if queue.status().size == 0 {
                break;
            }
        }

        assert!(index.get_note(&note.front.id).await.unwrap().is_none());
        queue.cleanup();
    }

    #[tokio::test]
    async fn index_entry_for_vanished_note_removes_the_row() {
        let temp = TempDir::new().unwrap();
        let (queue, _store, index) = build_queue(&temp);

        // Row exists in the index but the note never hits the disk
        let note = Note::new(FrontMatter::new(mint_uid(), "Vanished".into()), "body".into());
        index.index_note(&note, "vanished.md").await.unwrap();

        queue.enqueue(RecoveryOperation::Update, &note.front.id, None, "stale");

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if queue.status().size == 0 {
                break;
            }
        }

        assert!(index.get_note(&note.front.id).await.unwrap().is_none());
        queue.cleanup();
    }

    #[tokio::test]
    async fn cleanup_drops_residual_entries() {
        let temp = TempDir::new().unwrap();
        let (queue, _store, _index) = build_queue(&temp);

        queue.enqueue(RecoveryOperation::Index, "uid-residual", None, "pending");
        queue.cleanup();

        assert_eq!(queue.status().size, 0);
        // Enqueue after cleanup is a no-op
        queue.enqueue(RecoveryOperation::Index, "uid-late", None, "late");
        assert_eq!(queue.status().size, 0);
    }

    #[test]
    fn backoff_doubles_with_each_retry() {
        let base = Duration::from_secs(1);
        let mut e = entry("u", RecoveryOperation::Index);
        let enqueued = e.first_enqueued_at;

        assert!(!e.is_due(enqueued + Duration::from_millis(500), base));
        assert!(e.is_due(enqueued + Duration::from_secs(1), base));

        e.retries = 2;
        assert!(!e.is_due(enqueued + Duration::from_secs(3), base));
        assert!(e.is_due(enqueued + Duration::from_secs(4), base));
    }

    #[test]
    fn register_failure_resets_clock_and_abandons_at_ceiling() {
        let mut entries = vec![entry("u", RecoveryOperation::Index)];
        let key = ("u".to_string(), RecoveryOperation::Index);
        let later = Instant::now() + Duration::from_secs(5);

        assert!(!register_failure(&mut entries, &key, "again", 3, later));
        assert_eq!(entries[0].retries, 1);
        assert_eq!(entries[0].last_error, "again");
        assert_eq!(entries[0].first_enqueued_at, later);

        assert!(!register_failure(&mut entries, &key, "again", 3, later));
        assert!(register_failure(&mut entries, &key, "final", 3, later));
        assert!(entries.is_empty());
    }
}
