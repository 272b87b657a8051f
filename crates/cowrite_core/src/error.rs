use thiserror::Error;

/// Unified error type for cowrite operations
#[derive(Debug, Error)]
pub enum CowriteError {
    /// The referenced document does not exist. Surfaced to the caller,
    /// never retried.
    #[error("Document not found: '{0}'")]
    NotFound(String),

    /// Update bytes failed to decode or apply against the CRDT engine.
    /// The replica is left untouched.
    #[error("Malformed update: {0}")]
    MalformedUpdate(String),

    /// The permission gate rejected the acting user. Produced by the
    /// access-control collaborator and merely propagated here.
    #[error("Access denied to document '{doc_id}' for user '{user_id}'")]
    AccessDenied {
        /// Document the user attempted to act on.
        doc_id: String,
        /// The acting user.
        user_id: String,
    },

    /// Storage I/O failure during merge or snapshot. Eligible for queue
    /// retry up to the policy's maximum.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unknown operation kind, or retries exhausted. Never retried.
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl CowriteError {
    /// Whether a queued operation that failed with this error may be retried.
    ///
    /// Only storage failures are considered transient; everything else in
    /// the taxonomy describes a condition a retry cannot fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, CowriteError::Storage(_))
    }
}

/// Result type alias for cowrite operations
pub type Result<T> = std::result::Result<T, CowriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_transient() {
        assert!(CowriteError::Storage("disk full".into()).is_transient());
        assert!(!CowriteError::NotFound("doc-1".into()).is_transient());
        assert!(!CowriteError::MalformedUpdate("bad bytes".into()).is_transient());
        assert!(
            !CowriteError::AccessDenied {
                doc_id: "doc-1".into(),
                user_id: "user-1".into(),
            }
            .is_transient()
        );
        assert!(!CowriteError::Permanent("unknown operation".into()).is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = CowriteError::NotFound("doc-42".into());
        assert_eq!(err.to_string(), "Document not found: 'doc-42'");

        let err = CowriteError::AccessDenied {
            doc_id: "doc-1".into(),
            user_id: "user-9".into(),
        };
        assert!(err.to_string().contains("doc-1"));
        assert!(err.to_string().contains("user-9"));
    }
}
