//! Bridge between durable storage and live CRDT replicas.
//!
//! Documents are not held resident; every operation rehydrates a fresh
//! [`TextReplica`] from the persisted (compressed) state and discards it
//! afterwards.

use std::sync::Arc;

use crate::error::{CowriteError, Result};
use crate::replica::TextReplica;
use crate::snapshot::decompress_state;
use crate::store::DocumentStore;

/// Loads and encodes document replica state against a persistence
/// collaborator.
pub struct DocumentStateStore {
    store: Arc<dyn DocumentStore>,
}

impl DocumentStateStore {
    /// Create a state store over the given persistence collaborator.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Instantiate a replica from previously saved raw state bytes.
    ///
    /// A decode failure is logged and swallowed: the replica is returned
    /// in its empty state rather than failing the caller. A corrupt
    /// snapshot must not make a document permanently inaccessible.
    pub fn create_replica(&self, saved_state: Option<&[u8]>) -> TextReplica {
        let mut replica = TextReplica::new();

        if let Some(state) = saved_state
            && !state.is_empty()
            && let Err(e) = replica.apply_update(state)
        {
            log::warn!("Failed to apply saved state, starting empty: {}", e);
            return TextReplica::new();
        }

        replica
    }

    /// Load a document's replica from its persisted CRDT state.
    ///
    /// The stored state is decompressed before rehydration; a corrupt
    /// blob degrades to an empty replica the same way a decode failure
    /// does.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::NotFound`] if no document row exists.
    pub fn load_replica(&self, doc_id: &str) -> Result<TextReplica> {
        let doc = self
            .store
            .find_document(doc_id)?
            .ok_or_else(|| CowriteError::NotFound(doc_id.to_string()))?;

        let raw_state = match doc.crdt_state.as_deref() {
            Some(compressed) => match decompress_state(compressed) {
                Ok(state) => Some(state),
                Err(e) => {
                    log::warn!("Stored state for doc {} is corrupt: {}", doc_id, e);
                    None
                }
            },
            None => None,
        };

        Ok(self.create_replica(raw_state.as_deref()))
    }

    /// Read the plain-text projection of a replica.
    pub fn project_text(&self, replica: &TextReplica) -> String {
        replica.text()
    }

    /// Apply binary update bytes to a live replica.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::MalformedUpdate`] if the bytes cannot be
    /// decoded as a valid CRDT update; the replica is left untouched.
    pub fn apply_binary_update(&self, replica: &mut TextReplica, update: &[u8]) -> Result<()> {
        replica.apply_update(update)
    }

    /// Serialize the entire replica for snapshotting.
    pub fn encode_full_state(&self, replica: &TextReplica) -> Vec<u8> {
        replica.encode_state()
    }

    /// Compute the operations the replica holds that a client, identified
    /// by its state vector, does not yet have.
    ///
    /// This lets a reconnecting client fetch only the missing delta
    /// instead of the full document history.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::MalformedUpdate`] if the state vector
    /// cannot be decoded.
    pub fn compute_state_vector_diff(
        &self,
        replica: &TextReplica,
        client_state_vector: &[u8],
    ) -> Result<Vec<u8>> {
        replica.diff_against_state_vector(client_state_vector)
    }
}
