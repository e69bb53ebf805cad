//! Shared execution context for tool handlers.
//!
//! The note store and metrics collector exist from construction; the
//! search index and recovery queue are created lazily on first use, so
//! tests get per-context isolation and the server gets one shared set.
//! Teardown is explicit via [`ServerContext::cleanup`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;
use vault_notes::Note;

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::index::SearchIndex;
use crate::metrics::MetricsCollector;
use crate::policy::ExecutionPolicy;
use crate::recovery::{RecoveryOperation, RecoveryQueue};
use crate::store::{content_hash, NoteStore, DEFAULT_SCAN_CONCURRENCY};

pub struct ServerContext {
    pub config: Config,
    pub store: Arc<NoteStore>,
    pub metrics: Arc<MetricsCollector>,
    pub policy: ExecutionPolicy,
    index: OnceCell<Arc<SearchIndex>>,
    recovery: OnceCell<Arc<RecoveryQueue>>,
}

impl ServerContext {
    pub fn new(config: Config) -> Arc<Self> {
        let store = Arc::new(NoteStore::new(config.vault_path.clone()));
        let policy = ExecutionPolicy {
            timeout: config.tool_timeout,
            max_retries: config.tool_retries,
            ..ExecutionPolicy::default()
        };

        Arc::new(Self {
            config,
            store,
            metrics: Arc::new(MetricsCollector::new()),
            policy,
            index: OnceCell::new(),
            recovery: OnceCell::new(),
        })
    }

    /// The search index, opened (and reconciled against the disk) on
    /// first use.
    pub async fn index(&self) -> Result<Arc<SearchIndex>> {
        let index = self
            .index
            .get_or_try_init(|| async {
                let path = self.config.index_path.clone();
                let index = tokio::task::spawn_blocking(move || SearchIndex::open(&path))
                    .await
                    .map_err(|err| {
                        ServerError::internal(format!("index open task failed: {err}"))
                    })??;
                let index = Arc::new(index);
                if let Err(err) = reconcile(&self.store, &index).await {
                    tracing::warn!(%err, "index reconciliation failed; continuing");
                }
                if let Err(err) = maybe_optimize(&index).await {
                    tracing::warn!(%err, "index optimize failed; continuing");
                }
                Ok::<_, ServerError>(index)
            })
            .await?;
        Ok(Arc::clone(index))
    }

    /// The recovery queue, created on first use (which also forces
    /// the index open).
    pub async fn recovery(self: &Arc<Self>) -> Result<Arc<RecoveryQueue>> {
        let index = self.index().await?;
        let queue = self
            .recovery
            .get_or_init(|| async {
                Arc::new(RecoveryQueue::new(
                    Arc::clone(&self.store),
                    index,
                    Arc::clone(&self.metrics),
                    self.config.recovery.clone(),
                ))
            })
            .await;
        Ok(Arc::clone(queue))
    }

    /// Try the index upsert for a freshly written note; on failure,
    /// hand it to the recovery queue and return the user-visible
    /// warning. The tool call itself stays successful either way.
    pub async fn index_upsert_or_enqueue(
        self: &Arc<Self>,
        operation: RecoveryOperation,
        note: &Note,
        path: &Path,
    ) -> Option<String> {
        let rel = self.store.rel_path(path);
        match self.index().await {
            Ok(index) => match index.index_note(note, &rel).await {
                Ok(()) => None,
                Err(err) => {
                    self.enqueue_recovery(operation, &note.front.id, Some(path), &err)
                        .await;
                    Some(format!(
                        "search index update failed ({}); queued for background retry",
                        err.code
                    ))
                }
            },
            Err(err) => {
                tracing::error!(%err, "search index unavailable for upsert");
                Some(format!(
                    "search index unavailable ({}); it will be reconciled when it opens",
                    err.code
                ))
            }
        }
    }

    /// Try the index delete for a removed note; on failure, hand it
    /// to the recovery queue and return the user-visible warning.
    pub async fn index_remove_or_enqueue(self: &Arc<Self>, uid: &str) -> Option<String> {
        match self.index().await {
            Ok(index) => match index.remove_note(uid).await {
                Ok(()) => None,
                Err(err) => {
                    self.enqueue_recovery(RecoveryOperation::Delete, uid, None, &err)
                        .await;
                    Some(format!(
                        "search index delete failed ({}); queued for background retry",
                        err.code
                    ))
                }
            },
            Err(err) => {
                tracing::error!(%err, "search index unavailable for delete");
                Some(format!(
                    "search index unavailable ({}); it will be reconciled when it opens",
                    err.code
                ))
            }
        }
    }

    async fn enqueue_recovery(
        self: &Arc<Self>,
        operation: RecoveryOperation,
        uid: &str,
        path: Option<&Path>,
        err: &ServerError,
    ) {
        match self.recovery().await {
            Ok(queue) => queue.enqueue(
                operation,
                uid,
                path.map(|p| p.to_path_buf()),
                &err.to_string(),
            ),
            Err(queue_err) => {
                tracing::error!(uid, %queue_err, "cannot enqueue index recovery entry");
            }
        }
    }

    /// Stop the recovery worker and flush the index. Explicit so
    /// tests and shutdown paths control teardown order.
    pub async fn cleanup(&self) {
        if let Some(queue) = self.recovery.get() {
            queue.cleanup();
        }
        if let Some(index) = self.index.get() {
            if let Err(err) = index.close().await {
                tracing::warn!(%err, "index close failed");
            }
        }
    }
}

/// One-time disk/index reconciliation after an index open: upsert
/// notes whose serialized content hash differs from the stored row
/// and prune rows whose files are gone.
async fn reconcile(store: &NoteStore, index: &SearchIndex) -> Result<()> {
    let existing: HashMap<String, String> = index.note_hashes().await?.into_iter().collect();
    let corpus = store.load_all(true, DEFAULT_SCAN_CONCURRENCY).await?;

    let mut seen = HashSet::new();
    let mut batch = Vec::new();
    for (path, note) in corpus {
        seen.insert(note.front.id.clone());
        let markdown = match note.to_markdown() {
            Ok(markdown) => markdown,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "skipping unserializable note");
                continue;
            }
        };
        if existing.get(&note.front.id) != Some(&content_hash(&markdown)) {
            batch.push((store.rel_path(&path), note));
        }
    }

    for uid in existing.keys() {
        if !seen.contains(uid) {
            index.remove_note(uid).await?;
        }
    }

    if !batch.is_empty() {
        let count = index.batch_index(batch).await?;
        tracing::info!(count, "reconciled index with vault");
    }
    Ok(())
}

/// Days between opportunistic vacuum passes.
const VACUUM_INTERVAL_DAYS: i64 = 7;

/// Merge the FTS structures and vacuum when the last recorded pass is
/// missing or older than the interval. Runs once per process, right
/// after the index opens.
async fn maybe_optimize(index: &SearchIndex) -> Result<()> {
    let stats = index.stats().await?;
    let due = match stats
        .last_vacuum
        .as_deref()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
    {
        Some(last) => {
            chrono::Utc::now() - last.with_timezone(&chrono::Utc)
                > chrono::Duration::days(VACUUM_INTERVAL_DAYS)
        }
        None => true,
    };

    if due {
        index.optimize().await?;
        tracing::debug!("optimized search index");
    }
    Ok(())
}
