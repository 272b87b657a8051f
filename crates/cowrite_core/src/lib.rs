//! Core library for Cowrite: CRDT-backed collaborative document
//! synchronization.
//!
//! Multiple clients edit a shared text document concurrently, sometimes
//! disconnected; this crate converges all replicas to the same content
//! without losing edits, persists compact compressed snapshots, and
//! replays offline-originated mutations from a durable outbox with
//! bounded retry.
//!
//! HTTP routing, authentication, presence, and UI concerns live outside
//! this crate; it consumes storage and authorization through the
//! [`DocumentStore`] and [`AccessControl`] traits.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cowrite_core::{
//!     AllowAll, DocLocks, DocumentRecord, DocumentStore, MemoryStore, TextReplica, UpdateHandler,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert_document(DocumentRecord::new("doc-1", "user-1", "Notes")).unwrap();
//!
//! let locks = Arc::new(DocLocks::new());
//! let handler = UpdateHandler::new(store, Arc::new(AllowAll), locks);
//!
//! let update = TextReplica::with_content("Hello").encode_state();
//! let outcome = handler.apply_client_update("doc-1", &update, 0, "user-1");
//! assert!(outcome.success);
//! assert_eq!(outcome.content, "Hello");
//! assert_eq!(outcome.new_version, 1);
//! ```

#![warn(missing_docs)]

/// Authorization collaborator interface
pub mod access;

/// Error (common error types)
pub mod error;

/// In-memory persistence backend
pub mod memory_store;

/// Sync queue processing (durable outbox drain with retry)
pub mod queue;

/// Live CRDT replica of a document
pub mod replica;

/// Conflict resolution (CRDT merge and last-write-wins)
pub mod resolver;

/// Retry and backoff arithmetic
pub mod retry;

/// Snapshot compression and versioned persistence
pub mod snapshot;

/// Bridge between durable storage and live replicas
pub mod state_store;

/// Persistence collaborator interface
pub mod store;

/// Core record and wire types
pub mod types;

/// Update orchestration (apply client updates, compute sync deltas)
pub mod update_handler;

pub use access::{AccessControl, AllowAll, Permission};
pub use error::{CowriteError, Result};
pub use memory_store::MemoryStore;
pub use queue::{BATCH_LIMIT, BatchError, BatchReceipt, OpOutcome, QueueStatus, SyncQueueProcessor};
pub use replica::TextReplica;
pub use resolver::{MergeOutcome, VersionOrder};
pub use retry::{RetryPlan, RetryPolicy};
pub use snapshot::{DEFAULT_KEEP_VERSIONS, SnapshotManager};
pub use state_store::DocumentStateStore;
pub use store::DocumentStore;
pub use types::{
    DocumentPatch, DocumentRecord, QueueEntry, QueueEntryPatch, SyncOperation, SyncPayload,
    SyncRequest, SyncStatus,
};
pub use update_handler::{DocLocks, UpdateHandler, UpdateOutcome};
