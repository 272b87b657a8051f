//! In-memory CRDT replica for a single document.
//!
//! `TextReplica` wraps a yrs document holding one Y.Text and exposes the
//! narrow capability surface the rest of the crate needs: apply a binary
//! update, project the text, encode full state or a state-vector diff.
//! No yrs type leaks past this module, so swapping the backing engine
//! touches this file only.

use yrs::{
    Doc, GetString, ReadTxn, StateVector, Text, Transact, Update, updates::decoder::Decode,
    updates::encoder::Encode,
};

use crate::error::{CowriteError, Result};

/// Name of the Y.Text holding the document content.
///
/// Clients create their text with the same root name, so updates produced
/// by any replica address the same shared sequence.
const CONTENT_TEXT_NAME: &str = "content";

/// A live CRDT replica of a single document's text content.
///
/// Replicas are rehydrated fresh per operation and never kept resident;
/// convergence comes from the CRDT merge semantics, not from replica
/// identity.
///
/// # Example
///
/// ```
/// use cowrite_core::TextReplica;
///
/// let a = TextReplica::with_content("Hello");
/// let mut b = TextReplica::new();
/// b.apply_update(&a.encode_state()).unwrap();
/// assert_eq!(b.text(), "Hello");
/// ```
pub struct TextReplica {
    doc: Doc,
    content: yrs::TextRef,
}

impl TextReplica {
    /// Create a new empty replica.
    pub fn new() -> Self {
        let doc = Doc::new();
        let content = doc.get_or_insert_text(CONTENT_TEXT_NAME);
        Self { doc, content }
    }

    /// Create a replica seeded with `text` as a single initial insert.
    pub fn with_content(text: &str) -> Self {
        let replica = Self::new();
        if !text.is_empty() {
            let mut txn = replica.doc.transact_mut();
            replica.content.insert(&mut txn, 0, text);
        }
        replica
    }

    /// Apply a binary update from another replica.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::MalformedUpdate`] if the bytes cannot be
    /// decoded or applied as a valid update. The replica is left untouched
    /// on failure.
    pub fn apply_update(&mut self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| CowriteError::MalformedUpdate(format!("failed to decode update: {}", e)))?;

        let mut txn = self.doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| CowriteError::MalformedUpdate(format!("failed to apply update: {}", e)))?;
        Ok(())
    }

    /// Get the plain-text projection of the replica.
    pub fn text(&self) -> String {
        let txn = self.doc.transact();
        self.content.get_string(&txn)
    }

    /// Length of the projected text in characters.
    pub fn len(&self) -> u32 {
        let txn = self.doc.transact();
        self.content.len(&txn)
    }

    /// Whether the projected text is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode the full replica state as a single update.
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the replica's state vector for diff computation.
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the operations this replica holds that a peer with the given
    /// state vector does not yet have.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::MalformedUpdate`] if the state vector bytes
    /// cannot be decoded.
    pub fn diff_against_state_vector(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector).map_err(|e| {
            CowriteError::MalformedUpdate(format!("failed to decode state vector: {}", e))
        })?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }
}

impl Default for TextReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TextReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextReplica")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_replica_is_empty() {
        let replica = TextReplica::new();
        assert_eq!(replica.text(), "");
        assert!(replica.is_empty());
    }

    #[test]
    fn test_with_content() {
        let replica = TextReplica::with_content("Hello World");
        assert_eq!(replica.text(), "Hello World");
        assert_eq!(replica.len(), 11);
    }

    #[test]
    fn test_apply_update_syncs_replicas() {
        let source = TextReplica::with_content("shared text");
        let mut target = TextReplica::new();

        target.apply_update(&source.encode_state()).unwrap();

        assert_eq!(target.text(), "shared text");
    }

    #[test]
    fn test_apply_garbage_update_fails_and_leaves_text_unchanged() {
        let mut replica = TextReplica::with_content("intact");

        let result = replica.apply_update(&[0xff, 0x13, 0x37, 0x00]);

        assert!(matches!(result, Err(CowriteError::MalformedUpdate(_))));
        assert_eq!(replica.text(), "intact");
    }

    #[test]
    fn test_concurrent_edits_converge() {
        let mut a = TextReplica::with_content("Hello World");
        let mut b = TextReplica::new();
        b.apply_update(&a.encode_state()).unwrap();

        // Divergent edits on both sides
        {
            let mut txn = a.doc.transact_mut();
            a.content.insert(&mut txn, 0, "A: ");
        }
        {
            let mut txn = b.doc.transact_mut();
            b.content.insert(&mut txn, 11, "!");
        }

        let update_a = a.encode_state();
        let update_b = b.encode_state();
        a.apply_update(&update_b).unwrap();
        b.apply_update(&update_a).unwrap();

        assert_eq!(a.text(), b.text());
        assert!(a.text().contains("A: "));
        assert!(a.text().contains('!'));
    }

    #[test]
    fn test_diff_against_state_vector() {
        let a = TextReplica::with_content("base");
        let mut b = TextReplica::new();
        b.apply_update(&a.encode_state()).unwrap();

        let sv_b = b.encode_state_vector();

        let mut a2 = TextReplica::new();
        a2.apply_update(&a.encode_state()).unwrap();
        {
            let mut txn = a2.doc.transact_mut();
            a2.content.insert(&mut txn, 4, " extended");
        }

        let diff = a2.diff_against_state_vector(&sv_b).unwrap();
        b.apply_update(&diff).unwrap();

        assert_eq!(b.text(), "base extended");
    }

    #[test]
    fn test_diff_with_empty_state_vector_reconstructs_document() {
        let replica = TextReplica::with_content("full history");
        let empty_sv = TextReplica::new().encode_state_vector();

        let diff = replica.diff_against_state_vector(&empty_sv).unwrap();

        let mut fresh = TextReplica::new();
        fresh.apply_update(&diff).unwrap();
        assert_eq!(fresh.text(), "full history");
    }

    #[test]
    fn test_diff_with_garbage_state_vector_fails() {
        let replica = TextReplica::with_content("content");
        let result = replica.diff_against_state_vector(&[0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(result, Err(CowriteError::MalformedUpdate(_))));
    }
}
