//! Durable outbox processing for offline-originated mutations.
//!
//! Clients that edit while disconnected record their intent as queue
//! entries; the processor drains PENDING entries in creation order,
//! applies each operation, and commits the retry/failure bookkeeping.
//! This is the only place retry and terminal decisions are made —
//! individual merge operations stay retry-agnostic.

use std::str::FromStr;
use std::sync::Arc;

use crate::access::AccessControl;
use crate::error::{CowriteError, Result};
use crate::resolver;
use crate::retry::RetryPolicy;
use crate::snapshot::compress_state;
use crate::store::DocumentStore;
use crate::types::{
    DocumentPatch, QueueEntry, QueueEntryPatch, SyncOperation, SyncRequest, SyncStatus,
};
use crate::update_handler::DocLocks;

/// Maximum entries accepted per batch call and processed per drain pass.
pub const BATCH_LIMIT: usize = 100;

/// Title applied by CREATE when the payload carries none.
const DEFAULT_TITLE: &str = "Untitled Document";

/// Result of processing a single queue entry.
#[derive(Debug)]
pub struct OpOutcome {
    /// Whether the operation was applied.
    pub success: bool,
    /// The failure, when `success` is false. The error's transience
    /// decides whether the entry is retried or terminally failed.
    pub error: Option<CowriteError>,
}

impl OpOutcome {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e),
            },
        }
    }
}

/// Per-entry rejection recorded while accepting a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    /// Document the rejected request targeted.
    pub doc_id: String,
    /// Why it was rejected.
    pub error: String,
}

/// Result of accepting a batch of sync requests.
#[derive(Debug)]
pub struct BatchReceipt {
    /// Entries that were durably queued as PENDING.
    pub queued: Vec<QueueEntry>,
    /// Requests that were rejected, with reasons.
    pub errors: Vec<BatchError>,
}

/// Sync-queue status of one document for one user.
#[derive(Debug)]
pub struct QueueStatus {
    /// The document in question.
    pub doc_id: String,
    /// Entries still awaiting processing.
    pub pending_count: usize,
    /// Entries applied successfully.
    pub synced_count: usize,
    /// Entries that failed terminally.
    pub failed_count: usize,
    /// The user's entries for this document in creation order.
    pub operations: Vec<QueueEntry>,
}

/// Drains the durable outbox and applies queued operations.
pub struct SyncQueueProcessor {
    store: Arc<dyn DocumentStore>,
    access: Arc<dyn AccessControl>,
    retry: RetryPolicy,
    locks: Arc<DocLocks>,
}

impl SyncQueueProcessor {
    /// Create a processor with the default retry policy.
    ///
    /// The lock registry must be the same one the synchronous
    /// [`UpdateHandler`](crate::UpdateHandler) uses, so queued and
    /// synchronous mutations of a document exclude each other.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        access: Arc<dyn AccessControl>,
        locks: Arc<DocLocks>,
    ) -> Self {
        Self::with_policy(store, access, locks, RetryPolicy::default())
    }

    /// Create a processor with a custom retry policy.
    pub fn with_policy(
        store: Arc<dyn DocumentStore>,
        access: Arc<dyn AccessControl>,
        locks: Arc<DocLocks>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            access,
            retry,
            locks,
        }
    }

    /// Accept a batch of sync requests from a client.
    ///
    /// The batch is rejected wholesale when empty or larger than
    /// [`BATCH_LIMIT`]. Individual requests are validated (target id,
    /// permission) and rejected ones are reported in the receipt without
    /// affecting the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::Permanent`] for a wholesale rejection, or
    /// [`CowriteError::Storage`] if queueing fails.
    pub fn enqueue_batch(&self, user_id: &str, requests: &[SyncRequest]) -> Result<BatchReceipt> {
        if requests.is_empty() {
            return Err(CowriteError::Permanent("Invalid operations array".into()));
        }
        if requests.len() > BATCH_LIMIT {
            return Err(CowriteError::Permanent(format!(
                "Maximum {} operations per batch",
                BATCH_LIMIT
            )));
        }

        let mut queued = Vec::new();
        let mut errors = Vec::new();

        for request in requests {
            if request.doc_id.is_empty() {
                errors.push(BatchError {
                    doc_id: request.doc_id.clone(),
                    error: "Missing docId".to_string(),
                });
                continue;
            }

            match self.access.resolve_permission(&request.doc_id, user_id) {
                Ok(permission) if permission.can_read() => {}
                Ok(_) => {
                    errors.push(BatchError {
                        doc_id: request.doc_id.clone(),
                        error: "Access denied".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    errors.push(BatchError {
                        doc_id: request.doc_id.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            let entry = self.store.enqueue(
                user_id,
                &request.doc_id,
                &request.operation.to_string(),
                request.payload.clone(),
            )?;
            queued.push(entry);
        }

        log::info!(
            "Batch sync: {} queued, {} rejected",
            queued.len(),
            errors.len()
        );
        Ok(BatchReceipt { queued, errors })
    }

    /// Process a single queue entry, dispatching on its operation kind.
    ///
    /// An unknown operation string is a permanent failure and is never
    /// retried.
    pub fn process_operation(&self, entry: &QueueEntry) -> OpOutcome {
        let operation = match SyncOperation::from_str(&entry.operation) {
            Ok(operation) => operation,
            Err(e) => return OpOutcome::from_result(Err(CowriteError::Permanent(e))),
        };

        let result = match operation {
            SyncOperation::Create => self.process_create(entry),
            SyncOperation::Update => self.process_update(entry),
            SyncOperation::Delete => self.process_delete(entry),
        };

        if let Err(ref e) = result {
            log::warn!(
                "Error processing {} for doc {}: {}",
                entry.operation,
                entry.doc_id,
                e
            );
        }
        OpOutcome::from_result(result)
    }

    /// Mark the target document durably synced and apply a queued title.
    fn process_create(&self, entry: &QueueEntry) -> Result<()> {
        let lock = self.locks.for_doc(&entry.doc_id);
        let _guard = lock.lock().unwrap();

        let title = entry
            .payload
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        self.store.update_document(
            &entry.doc_id,
            DocumentPatch {
                is_local_only: Some(false),
                title: Some(title),
                ..Default::default()
            },
        )?;

        log::debug!("CREATE processed: {}", entry.doc_id);
        Ok(())
    }

    /// Merge queued content into the current document row.
    ///
    /// A payload with CRDT update bytes merges through the conflict
    /// resolver; plain content falls back to a field-level overwrite.
    fn process_update(&self, entry: &QueueEntry) -> Result<()> {
        let lock = self.locks.for_doc(&entry.doc_id);
        let _guard = lock.lock().unwrap();

        let doc = self
            .store
            .find_document(&entry.doc_id)?
            .ok_or_else(|| CowriteError::NotFound(entry.doc_id.clone()))?;

        let mut final_content = doc.text_content.clone();
        if let Some(content) = entry.payload.content.as_deref() {
            final_content = match entry.payload.update_bytes()? {
                Some(update) => resolver::merge_updates(&doc.text_content, &update).merged_content,
                None => content.to_string(),
            };
        }

        let crdt_state = match entry.payload.state_bytes()? {
            Some(state) => Some(compress_state(&state)?),
            None => None,
        };

        self.store.update_document(
            &entry.doc_id,
            DocumentPatch {
                text_content: Some(final_content),
                version: Some(doc.version + 1),
                is_local_only: Some(false),
                crdt_state,
                last_modified_at: Some(chrono::Utc::now().timestamp_millis()),
                ..Default::default()
            },
        )?;

        log::debug!("UPDATE processed: {}", entry.doc_id);
        Ok(())
    }

    /// Remove the document record entirely.
    fn process_delete(&self, entry: &QueueEntry) -> Result<()> {
        let lock = self.locks.for_doc(&entry.doc_id);
        let _guard = lock.lock().unwrap();

        self.store.delete_document(&entry.doc_id)?;

        log::debug!("DELETE processed: {}", entry.doc_id);
        Ok(())
    }

    /// Drain up to [`BATCH_LIMIT`] PENDING entries in creation order.
    ///
    /// Success marks an entry SYNCED with a `synced_at` stamp. A
    /// transient failure increments the retry count and keeps the entry
    /// PENDING while the incremented count is still retry-eligible,
    /// otherwise it becomes terminally FAILED. Non-transient failures go
    /// straight to FAILED.
    ///
    /// Returns the number of entries that reached SYNCED in this pass.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::Storage`] if fetching the queue or
    /// committing bookkeeping fails.
    pub fn drain_pending_queue(&self) -> Result<usize> {
        let pending = self.store.pending_entries(BATCH_LIMIT)?;
        let total = pending.len();
        let mut synced_count = 0;

        for entry in pending {
            let outcome = self.process_operation(&entry);

            if outcome.success {
                self.store.update_entry(
                    &entry.id,
                    QueueEntryPatch {
                        status: Some(SyncStatus::Synced),
                        synced_at: Some(chrono::Utc::now().timestamp_millis()),
                        ..Default::default()
                    },
                )?;
                synced_count += 1;
                continue;
            }

            let error = outcome
                .error
                .expect("failed outcome always carries an error");

            if !error.is_transient() {
                self.store.update_entry(
                    &entry.id,
                    QueueEntryPatch {
                        status: Some(SyncStatus::Failed),
                        error: Some(error.to_string()),
                        ..Default::default()
                    },
                )?;
                continue;
            }

            let retries = entry.retries + 1;
            if self.retry.is_retry_eligible(retries) {
                self.store.update_entry(
                    &entry.id,
                    QueueEntryPatch {
                        retries: Some(retries),
                        error: Some(error.to_string()),
                        ..Default::default()
                    },
                )?;
            } else {
                self.store.update_entry(
                    &entry.id,
                    QueueEntryPatch {
                        status: Some(SyncStatus::Failed),
                        retries: Some(retries),
                        error: Some(format!("Max retries exceeded: {}", error)),
                        ..Default::default()
                    },
                )?;
            }
        }

        log::info!("Processed queue: {}/{} synced", synced_count, total);
        Ok(synced_count)
    }

    /// Report the sync-queue status of one document for one user.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::AccessDenied`] if the user has no access
    /// to the document.
    pub fn status_for_document(&self, doc_id: &str, user_id: &str) -> Result<QueueStatus> {
        let permission = self.access.resolve_permission(doc_id, user_id)?;
        if !permission.can_read() {
            return Err(CowriteError::AccessDenied {
                doc_id: doc_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let operations = self.store.entries_for_document(doc_id, user_id)?;
        let count_status =
            |status: SyncStatus| operations.iter().filter(|e| e.status == status).count();

        Ok(QueueStatus {
            doc_id: doc_id.to_string(),
            pending_count: count_status(SyncStatus::Pending),
            synced_count: count_status(SyncStatus::Synced),
            failed_count: count_status(SyncStatus::Failed),
            operations,
        })
    }
}
