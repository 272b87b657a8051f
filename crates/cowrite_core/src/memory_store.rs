//! In-memory storage implementation.
//!
//! This provides a simple in-memory implementation of [`DocumentStore`]
//! for use in unit tests, development, and single-process deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CowriteError, Result};
use crate::store::DocumentStore;
use crate::types::{
    DocumentPatch, DocumentRecord, QueueEntry, QueueEntryPatch, SyncPayload, SyncStatus,
};

/// In-memory document and queue storage.
///
/// Thread-safe via `RwLock`; data is lost when dropped. Queue entries are
/// held in insertion order, which doubles as `created_at` ascending order
/// since timestamps are assigned on insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    queue: RwLock<Vec<QueueEntry>>,
    /// doc_id -> (version -> compressed state)
    snapshots: RwLock<HashMap<String, Vec<(u64, Vec<u8>)>>>,
    /// Last assigned entry timestamp, used to keep creation times
    /// strictly increasing when the clock does not advance between
    /// inserts.
    last_created_at: RwLock<i64>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_created_at(&self) -> i64 {
        let mut last = self.last_created_at.write().unwrap();
        let now = chrono::Utc::now().timestamp_millis();
        *last = now.max(*last + 1);
        *last
    }
}

impl DocumentStore for MemoryStore {
    fn find_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.get(doc_id).cloned())
    }

    fn insert_document(&self, doc: DocumentRecord) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn update_document(&self, doc_id: &str, patch: DocumentPatch) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| CowriteError::NotFound(doc_id.to_string()))?;

        if let Some(title) = patch.title {
            doc.title = title;
        }
        if let Some(text_content) = patch.text_content {
            doc.text_content = text_content;
        }
        if let Some(crdt_state) = patch.crdt_state {
            doc.crdt_state = Some(crdt_state);
        }
        if let Some(version) = patch.version {
            doc.version = version;
        }
        if let Some(is_local_only) = patch.is_local_only {
            doc.is_local_only = is_local_only;
        }
        if let Some(last_modified_at) = patch.last_modified_at {
            doc.last_modified_at = last_modified_at;
        }
        Ok(())
    }

    fn delete_document(&self, doc_id: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        if docs.remove(doc_id).is_none() {
            return Err(CowriteError::NotFound(doc_id.to_string()));
        }
        let mut snapshots = self.snapshots.write().unwrap();
        snapshots.remove(doc_id);
        Ok(())
    }

    fn enqueue(
        &self,
        user_id: &str,
        doc_id: &str,
        operation: &str,
        payload: SyncPayload,
    ) -> Result<QueueEntry> {
        let entry = QueueEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            doc_id: doc_id.to_string(),
            operation: operation.to_string(),
            payload,
            status: SyncStatus::Pending,
            retries: 0,
            error: None,
            created_at: self.next_created_at(),
            synced_at: None,
        };

        let mut queue = self.queue.write().unwrap();
        queue.push(entry.clone());
        Ok(entry)
    }

    fn pending_entries(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        let queue = self.queue.read().unwrap();
        let mut pending: Vec<QueueEntry> = queue
            .iter()
            .filter(|e| e.status == SyncStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    fn entries_for_document(&self, doc_id: &str, user_id: &str) -> Result<Vec<QueueEntry>> {
        let queue = self.queue.read().unwrap();
        let mut entries: Vec<QueueEntry> = queue
            .iter()
            .filter(|e| e.doc_id == doc_id && e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn update_entry(&self, entry_id: &str, patch: QueueEntryPatch) -> Result<()> {
        let mut queue = self.queue.write().unwrap();
        let entry = queue
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| CowriteError::NotFound(entry_id.to_string()))?;

        if let Some(status) = patch.status {
            entry.status = status;
        }
        if let Some(retries) = patch.retries {
            entry.retries = retries;
        }
        if let Some(error) = patch.error {
            entry.error = Some(error);
        }
        if let Some(synced_at) = patch.synced_at {
            entry.synced_at = Some(synced_at);
        }
        Ok(())
    }

    fn record_snapshot(&self, doc_id: &str, version: u64, state: &[u8]) -> Result<()> {
        let mut snapshots = self.snapshots.write().unwrap();
        snapshots
            .entry(doc_id.to_string())
            .or_default()
            .push((version, state.to_vec()));
        Ok(())
    }

    fn snapshot_versions(&self, doc_id: &str) -> Result<Vec<u64>> {
        let snapshots = self.snapshots.read().unwrap();
        let mut versions: Vec<u64> = snapshots
            .get(doc_id)
            .map(|s| s.iter().map(|(v, _)| *v).collect())
            .unwrap_or_default();
        versions.sort_unstable();
        Ok(versions)
    }

    fn delete_snapshots_before(&self, doc_id: &str, min_version: u64) -> Result<usize> {
        let mut snapshots = self.snapshots.write().unwrap();
        let Some(doc_snapshots) = snapshots.get_mut(doc_id) else {
            return Ok(0);
        };
        let before = doc_snapshots.len();
        doc_snapshots.retain(|(v, _)| *v >= min_version);
        Ok(before - doc_snapshots.len())
    }
}
