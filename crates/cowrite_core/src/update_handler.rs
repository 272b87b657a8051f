//! Orchestration of a single edit round-trip.
//!
//! `UpdateHandler` is the primary entry point for both synchronous editor
//! calls and the async queue: apply a client's update bytes, or compute
//! the delta a client is missing. A single update moves through
//! load -> merge -> snapshot, with no partial-commit state: either all
//! steps complete or the document row is left exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::access::AccessControl;
use crate::error::{CowriteError, Result};
use crate::snapshot::SnapshotManager;
use crate::state_store::DocumentStateStore;
use crate::store::DocumentStore;

/// Per-document lock registry.
///
/// All mutating operations on a document (synchronous updates, queued
/// UPDATE/DELETE) hold the document's lock from load through persist, so
/// two writers can never interleave between read and write of the same
/// row. Operations on different documents proceed in parallel.
#[derive(Default)]
pub struct DocLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocLocks {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock handle for a document, creating it on first use.
    pub fn for_doc(&self, doc_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Structured result of applying a client update.
///
/// Failures are captured here rather than propagated; callers always
/// receive a decidable outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Whether the update was applied and persisted.
    pub success: bool,
    /// The document version after the call. On failure, the version the
    /// client reported.
    pub new_version: u64,
    /// The post-merge plain-text projection. Empty on failure.
    pub content: String,
    /// Failure message when `success` is false.
    pub error: Option<String>,
}

impl UpdateOutcome {
    fn failure(client_version: u64, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            new_version: client_version,
            content: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Applies client updates and computes sync deltas.
pub struct UpdateHandler {
    store: Arc<dyn DocumentStore>,
    state_store: DocumentStateStore,
    snapshots: SnapshotManager,
    access: Arc<dyn AccessControl>,
    locks: Arc<DocLocks>,
}

impl UpdateHandler {
    /// Create an update handler.
    ///
    /// The lock registry is shared with the queue processor so that
    /// synchronous and queued mutations of the same document exclude each
    /// other.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        access: Arc<dyn AccessControl>,
        locks: Arc<DocLocks>,
    ) -> Self {
        Self {
            state_store: DocumentStateStore::new(store.clone()),
            snapshots: SnapshotManager::new(store.clone()),
            store,
            access,
            locks,
        }
    }

    /// Apply update bytes from a client and persist the result.
    ///
    /// The new version is derived from the stored row (`stored + 1`)
    /// under the document lock; the client's reported version is advisory
    /// and only logged when stale. This keeps the persisted version
    /// strictly monotonic even when clients race.
    pub fn apply_client_update(
        &self,
        doc_id: &str,
        update: &[u8],
        client_version: u64,
        user_id: &str,
    ) -> UpdateOutcome {
        match self.check_edit_permission(doc_id, user_id) {
            Ok(()) => {}
            Err(e) => return UpdateOutcome::failure(client_version, e),
        }

        let lock = self.locks.for_doc(doc_id);
        let _guard = lock.lock().unwrap();

        let doc = match self.store.find_document(doc_id) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                return UpdateOutcome::failure(client_version, CowriteError::NotFound(doc_id.to_string()));
            }
            Err(e) => return UpdateOutcome::failure(client_version, e),
        };

        let mut replica = match self.state_store.load_replica(doc_id) {
            Ok(replica) => replica,
            Err(e) => return UpdateOutcome::failure(client_version, e),
        };

        if let Err(e) = self.state_store.apply_binary_update(&mut replica, update) {
            return UpdateOutcome::failure(client_version, e);
        }

        if client_version != doc.version {
            log::debug!(
                "Client of doc {} reported version {} but stored version is {}",
                doc_id,
                client_version,
                doc.version
            );
        }
        let new_version = doc.version + 1;

        if let Err(e) = self.snapshots.persist(doc_id, &replica, new_version) {
            return UpdateOutcome::failure(client_version, e);
        }

        log::info!(
            "Update applied to doc {} by user {} (v{})",
            doc_id,
            user_id,
            new_version
        );

        UpdateOutcome {
            success: true,
            new_version,
            content: self.state_store.project_text(&replica),
            error: None,
        }
    }

    /// Compute the update bytes a client is missing, given its state
    /// vector.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::AccessDenied`] if the user has no access,
    /// [`CowriteError::NotFound`] if the document does not exist, or
    /// [`CowriteError::MalformedUpdate`] for an undecodable state vector.
    pub fn compute_sync_updates(
        &self,
        doc_id: &str,
        client_state_vector: &[u8],
        user_id: &str,
    ) -> Result<Vec<u8>> {
        self.check_read_permission(doc_id, user_id)?;
        let replica = self.state_store.load_replica(doc_id)?;
        self.state_store
            .compute_state_vector_diff(&replica, client_state_vector)
    }

    /// Encode the document's full CRDT state, as fetched when a client
    /// opens the editor.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::AccessDenied`] if the user has no access,
    /// or [`CowriteError::NotFound`] if the document does not exist.
    pub fn encode_document_state(&self, doc_id: &str, user_id: &str) -> Result<Vec<u8>> {
        self.check_read_permission(doc_id, user_id)?;
        let replica = self.state_store.load_replica(doc_id)?;
        Ok(self.state_store.encode_full_state(&replica))
    }

    /// Validate update bytes before applying them.
    ///
    /// Rejects empty payloads only. Version mismatch detection is left to
    /// the CRDT engine's causal-history check during apply.
    pub fn validate_update(&self, update: &[u8], _expected_version: u64) -> bool {
        !update.is_empty()
    }

    fn check_edit_permission(&self, doc_id: &str, user_id: &str) -> Result<()> {
        let permission = self.access.resolve_permission(doc_id, user_id)?;
        if !permission.can_edit() {
            return Err(CowriteError::AccessDenied {
                doc_id: doc_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    fn check_read_permission(&self, doc_id: &str, user_id: &str) -> Result<()> {
        let permission = self.access.resolve_permission(doc_id, user_id)?;
        if !permission.can_read() {
            return Err(CowriteError::AccessDenied {
                doc_id: doc_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AllowAll, Permission};
    use crate::memory_store::MemoryStore;
    use crate::replica::TextReplica;
    use crate::types::DocumentRecord;

    fn handler_with_doc() -> (Arc<MemoryStore>, UpdateHandler) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_document(DocumentRecord::new("doc-1", "user-1", "Notes"))
            .unwrap();
        let handler = UpdateHandler::new(store.clone(), Arc::new(AllowAll), Arc::new(DocLocks::new()));
        (store, handler)
    }

    /// Update bytes that insert "Hello" into an empty document.
    fn hello_update() -> Vec<u8> {
        TextReplica::with_content("Hello").encode_state()
    }

    #[test]
    fn test_apply_update_to_empty_document() {
        let (store, handler) = handler_with_doc();

        let outcome = handler.apply_client_update("doc-1", &hello_update(), 0, "user-1");

        assert!(outcome.success, "unexpected error: {:?}", outcome.error);
        assert_eq!(outcome.new_version, 1);
        assert_eq!(outcome.content, "Hello");

        let doc = store.find_document("doc-1").unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.text_content, "Hello");
        assert!(doc.crdt_state.is_some());
    }

    #[test]
    fn test_version_increments_by_exactly_one_per_update() {
        let (store, handler) = handler_with_doc();

        let first = handler.apply_client_update("doc-1", &hello_update(), 0, "user-1");
        assert_eq!(first.new_version, 1);

        let second_update = TextReplica::with_content(" World").encode_state();
        let second = handler.apply_client_update("doc-1", &second_update, 1, "user-1");

        assert!(second.success);
        assert_eq!(second.new_version, 2);
        assert_eq!(store.find_document("doc-1").unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_stale_client_version_does_not_break_monotonicity() {
        let (store, handler) = handler_with_doc();

        handler.apply_client_update("doc-1", &hello_update(), 0, "user-1");
        // Client reports a stale version; the stored version still advances by 1
        let outcome = handler.apply_client_update("doc-1", &hello_update(), 0, "user-1");

        assert!(outcome.success);
        assert_eq!(outcome.new_version, 2);
        assert_eq!(store.find_document("doc-1").unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_unknown_document_is_a_failure_outcome() {
        let (_, handler) = handler_with_doc();

        let outcome = handler.apply_client_update("missing", &hello_update(), 0, "user-1");

        assert!(!outcome.success);
        assert_eq!(outcome.new_version, 0);
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_malformed_update_is_a_failure_outcome_and_leaves_row_untouched() {
        let (store, handler) = handler_with_doc();
        handler.apply_client_update("doc-1", &hello_update(), 0, "user-1");

        let outcome = handler.apply_client_update("doc-1", &[0xba, 0xad], 1, "user-1");

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Malformed update"));

        let doc = store.find_document("doc-1").unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.text_content, "Hello");
    }

    #[test]
    fn test_viewer_cannot_edit() {
        struct ViewerOnly;
        impl AccessControl for ViewerOnly {
            fn resolve_permission(&self, _doc_id: &str, _user_id: &str) -> Result<Permission> {
                Ok(Permission::Viewer)
            }
        }

        let store = Arc::new(MemoryStore::new());
        store
            .insert_document(DocumentRecord::new("doc-1", "user-1", "Notes"))
            .unwrap();
        let handler =
            UpdateHandler::new(store.clone(), Arc::new(ViewerOnly), Arc::new(DocLocks::new()));

        let outcome = handler.apply_client_update("doc-1", &hello_update(), 0, "user-2");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Access denied"));

        // Read path is still allowed for a viewer
        assert!(handler.encode_document_state("doc-1", "user-2").is_ok());
    }

    #[test]
    fn test_compute_sync_updates_reconstructs_document_for_new_client() {
        let (_, handler) = handler_with_doc();
        handler.apply_client_update("doc-1", &hello_update(), 0, "user-1");

        let empty_sv = TextReplica::new().encode_state_vector();
        let diff = handler
            .compute_sync_updates("doc-1", &empty_sv, "user-1")
            .unwrap();

        let mut fresh = TextReplica::new();
        fresh.apply_update(&diff).unwrap();
        assert_eq!(fresh.text(), "Hello");
    }

    #[test]
    fn test_validate_update_rejects_only_empty_payloads() {
        let (_, handler) = handler_with_doc();
        assert!(!handler.validate_update(&[], 0));
        assert!(handler.validate_update(&[0x01], 0));
        // expectedVersion is not enforced at this boundary
        assert!(handler.validate_update(&[0x01], 999));
    }

    #[test]
    fn test_concurrent_updates_to_same_document_serialize() {
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        store
            .insert_document(DocumentRecord::new("doc-1", "user-1", "Notes"))
            .unwrap();
        let handler = Arc::new(UpdateHandler::new(
            store.clone(),
            Arc::new(AllowAll),
            Arc::new(DocLocks::new()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let handler = handler.clone();
                thread::spawn(move || {
                    let update = TextReplica::with_content(&format!("edit {}", i)).encode_state();
                    handler.apply_client_update("doc-1", &update, 0, "user-1")
                })
            })
            .collect();

        let outcomes: Vec<UpdateOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(outcomes.iter().all(|o| o.success));
        // Every writer got a distinct version and the row ends at 8
        let mut versions: Vec<u64> = outcomes.iter().map(|o| o.new_version).collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
        assert_eq!(store.find_document("doc-1").unwrap().unwrap().version, 8);
    }
}
