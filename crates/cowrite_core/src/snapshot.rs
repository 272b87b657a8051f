//! Versioned, compressed snapshot persistence.
//!
//! A snapshot is the full CRDT state of a replica, zlib-compressed, written
//! together with the version number and plain-text projection as one atomic
//! document-row update. A copy of each compressed blob also lands in the
//! snapshot history, which `prune` trims to a bounded retention window.

use std::io::{Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{CowriteError, Result};
use crate::replica::TextReplica;
use crate::store::DocumentStore;
use crate::types::DocumentPatch;

/// Number of historical snapshot versions retained by default.
pub const DEFAULT_KEEP_VERSIONS: u64 = 10;

/// Compress raw CRDT state for storage.
pub(crate) fn compress_state(state: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(state)
        .and_then(|_| encoder.finish())
        .map_err(|e| CowriteError::Storage(format!("failed to compress state: {}", e)))
}

/// Decompress stored CRDT state.
pub(crate) fn decompress_state(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut state = Vec::new();
    decoder
        .read_to_end(&mut state)
        .map_err(|e| CowriteError::Storage(format!("failed to decompress state: {}", e)))?;
    Ok(state)
}

/// Compresses and persists replica state as versioned snapshots.
pub struct SnapshotManager {
    store: Arc<dyn DocumentStore>,
}

impl SnapshotManager {
    /// Create a snapshot manager over the given store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist the replica's full state at `version`.
    ///
    /// The document row receives `{crdt_state, version, text_content,
    /// last_modified_at}` in a single update; a persisted row is never
    /// left with a mismatched combination of the three. The compressed
    /// blob is also recorded in the snapshot history.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::NotFound`] if the document row does not
    /// exist, or [`CowriteError::Storage`] on a persistence failure.
    pub fn persist(&self, doc_id: &str, replica: &TextReplica, version: u64) -> Result<()> {
        let state = replica.encode_state();
        let compressed = compress_state(&state)?;
        let content = replica.text();

        self.store.update_document(
            doc_id,
            DocumentPatch {
                crdt_state: Some(compressed.clone()),
                version: Some(version),
                text_content: Some(content),
                last_modified_at: Some(chrono::Utc::now().timestamp_millis()),
                ..Default::default()
            },
        )?;
        self.store.record_snapshot(doc_id, version, &compressed)?;

        log::debug!(
            "Snapshot created for doc {} v{} ({} -> {} bytes)",
            doc_id,
            version,
            state.len(),
            compressed.len()
        );
        Ok(())
    }

    /// Trim snapshot history to the last `keep_versions` versions.
    ///
    /// No-op while the document's current version is within the retention
    /// window. Returns the number of snapshots removed.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::NotFound`] if the document row does not
    /// exist.
    pub fn prune(&self, doc_id: &str, keep_versions: u64) -> Result<usize> {
        let doc = self
            .store
            .find_document(doc_id)?
            .ok_or_else(|| CowriteError::NotFound(doc_id.to_string()))?;

        if doc.version <= keep_versions {
            return Ok(0);
        }

        let min_version = doc.version - keep_versions + 1;
        let removed = self.store.delete_snapshots_before(doc_id, min_version)?;
        if removed > 0 {
            log::debug!(
                "Pruned {} snapshots for doc {}, keeping v{}..=v{}",
                removed,
                doc_id,
                min_version,
                doc.version
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::types::DocumentRecord;

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_document(DocumentRecord::new("doc-1", "user-1", "Notes"))
            .unwrap();
        store
    }

    #[test]
    fn test_compress_round_trip() {
        let state = b"some replica state bytes".to_vec();
        let compressed = compress_state(&state).unwrap();
        assert_eq!(decompress_state(&compressed).unwrap(), state);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let result = decompress_state(&[0x00, 0x01, 0x02]);
        assert!(matches!(result, Err(CowriteError::Storage(_))));
    }

    #[test]
    fn test_persist_writes_matching_row() {
        let store = seeded_store();
        let snapshots = SnapshotManager::new(store.clone());
        let replica = TextReplica::with_content("Hello World");

        snapshots.persist("doc-1", &replica, 1).unwrap();

        let doc = store.find_document("doc-1").unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.text_content, "Hello World");

        let stored = decompress_state(doc.crdt_state.as_deref().unwrap()).unwrap();
        let mut restored = TextReplica::new();
        restored.apply_update(&stored).unwrap();
        assert_eq!(restored.text(), "Hello World");

        assert_eq!(store.snapshot_versions("doc-1").unwrap(), vec![1]);
    }

    #[test]
    fn test_persist_unknown_document_is_not_found() {
        let snapshots = SnapshotManager::new(Arc::new(MemoryStore::new()));
        let replica = TextReplica::new();
        let result = snapshots.persist("missing", &replica, 1);
        assert!(matches!(result, Err(CowriteError::NotFound(_))));
    }

    #[test]
    fn test_prune_is_noop_within_retention_window() {
        let store = seeded_store();
        let snapshots = SnapshotManager::new(store.clone());
        let replica = TextReplica::with_content("v");

        for version in 1..=5 {
            snapshots.persist("doc-1", &replica, version).unwrap();
        }

        let removed = snapshots.prune("doc-1", DEFAULT_KEEP_VERSIONS).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.snapshot_versions("doc-1").unwrap().len(), 5);
    }

    #[test]
    fn test_prune_removes_versions_outside_window() {
        let store = seeded_store();
        let snapshots = SnapshotManager::new(store.clone());
        let replica = TextReplica::with_content("v");

        for version in 1..=15 {
            snapshots.persist("doc-1", &replica, version).unwrap();
        }

        let removed = snapshots.prune("doc-1", DEFAULT_KEEP_VERSIONS).unwrap();

        assert_eq!(removed, 5);
        assert_eq!(
            store.snapshot_versions("doc-1").unwrap(),
            (6..=15).collect::<Vec<u64>>()
        );
    }
}
