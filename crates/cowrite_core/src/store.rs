//! Persistence abstraction for documents and the sync queue.
//!
//! This module defines the [`DocumentStore`] trait which abstracts over
//! storage backends (relational, embedded, in-memory) for the three kinds
//! of durable rows the core mutates: document rows, sync queue entries,
//! and snapshot history.

use crate::error::Result;
use crate::types::{DocumentPatch, DocumentRecord, QueueEntry, QueueEntryPatch, SyncPayload};

/// Trait for document and sync-queue storage backends.
///
/// # Storage model
///
/// 1. **Document rows**: current title, projection, compressed CRDT state,
///    version, and the local-only flag.
/// 2. **Sync queue**: the durable outbox of pending offline operations.
/// 3. **Snapshot history**: one compressed state blob per persisted
///    version, enabling bounded retention of older snapshots.
///
/// Implementations map their own failure types to
/// [`CowriteError::Storage`](crate::CowriteError::Storage), which is the
/// transient (queue-retryable) error class.
pub trait DocumentStore: Send + Sync {
    // ==================== Document rows ====================

    /// Fetch a document row by id. Returns `None` if it does not exist.
    fn find_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>>;

    /// Insert a new document row.
    fn insert_document(&self, doc: DocumentRecord) -> Result<()>;

    /// Apply a partial update to a document row as a single atomic write.
    ///
    /// Fails with [`CowriteError::NotFound`](crate::CowriteError::NotFound)
    /// if the row does not exist.
    fn update_document(&self, doc_id: &str, patch: DocumentPatch) -> Result<()>;

    /// Remove a document row entirely.
    ///
    /// Fails with [`CowriteError::NotFound`](crate::CowriteError::NotFound)
    /// if the row does not exist.
    fn delete_document(&self, doc_id: &str) -> Result<()>;

    // ==================== Sync queue ====================

    /// Append a new PENDING entry to the outbox and return it.
    fn enqueue(
        &self,
        user_id: &str,
        doc_id: &str,
        operation: &str,
        payload: SyncPayload,
    ) -> Result<QueueEntry>;

    /// Fetch up to `limit` PENDING entries ordered by creation time
    /// ascending.
    ///
    /// The ordering preserves causal intent order for entries targeting
    /// the same document within a drain pass.
    fn pending_entries(&self, limit: usize) -> Result<Vec<QueueEntry>>;

    /// Fetch all of a user's entries for one document in creation order,
    /// regardless of status.
    fn entries_for_document(&self, doc_id: &str, user_id: &str) -> Result<Vec<QueueEntry>>;

    /// Apply bookkeeping updates to a queue entry.
    ///
    /// Fails with [`CowriteError::NotFound`](crate::CowriteError::NotFound)
    /// if the entry does not exist.
    fn update_entry(&self, entry_id: &str, patch: QueueEntryPatch) -> Result<()>;

    // ==================== Snapshot history ====================

    /// Record a compressed snapshot blob for a document version.
    fn record_snapshot(&self, doc_id: &str, version: u64, state: &[u8]) -> Result<()>;

    /// List the versions with retained snapshots for a document, ascending.
    fn snapshot_versions(&self, doc_id: &str) -> Result<Vec<u64>>;

    /// Delete retained snapshots with `version < min_version`.
    ///
    /// Returns the number of snapshots removed.
    fn delete_snapshots_before(&self, doc_id: &str, min_version: u64) -> Result<usize>;
}
