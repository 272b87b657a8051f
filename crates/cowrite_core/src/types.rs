//! Core record types for document synchronization.
//!
//! These mirror the durable rows the persistence collaborator manages
//! (documents, sync queue entries, snapshot history) and the wire shape
//! of offline sync payloads.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::error::{CowriteError, Result};

/// A document row as held by the persistence collaborator.
///
/// `text_content` is the denormalized plain-text projection of
/// `crdt_state`; after any successful write the two never diverge.
/// `crdt_state` is stored zlib-compressed and is `None` for documents
/// that have never been snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Unique document identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// User who owns the document.
    pub owner_id: String,
    /// Materialized plain-text projection, denormalized for fast reads.
    pub text_content: String,
    /// Compressed binary encoding of the full CRDT replica.
    pub crdt_state: Option<Vec<u8>>,
    /// Monotonically increasing, incremented exactly once per applied
    /// mutation.
    pub version: u64,
    /// Set while the document exists only on the creating client and has
    /// not yet been confirmed durable by the sync queue.
    pub is_local_only: bool,
    /// Unix timestamp of creation (milliseconds).
    pub created_at: i64,
    /// Unix timestamp of last successful mutation (milliseconds).
    pub last_modified_at: i64,
}

impl DocumentRecord {
    /// Create a fresh, empty document at version 0.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: id.into(),
            title: title.into(),
            owner_id: owner_id.into(),
            text_content: String::new(),
            crdt_state: None,
            version: 0,
            is_local_only: false,
            created_at: now,
            last_modified_at: now,
        }
    }
}

/// Partial update to a document row.
///
/// Only `Some` fields are written; the write is applied atomically as a
/// single row update, so a persisted row is never left with a mismatched
/// `version`/`text_content`/`crdt_state` combination.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    /// New title.
    pub title: Option<String>,
    /// New plain-text projection.
    pub text_content: Option<String>,
    /// New compressed CRDT state.
    pub crdt_state: Option<Vec<u8>>,
    /// New version number.
    pub version: Option<u64>,
    /// New local-only flag.
    pub is_local_only: Option<bool>,
    /// New last-modified timestamp (milliseconds).
    pub last_modified_at: Option<i64>,
}

/// Kind of a queued offline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    /// Confirm a locally created document as durable.
    Create,
    /// Apply queued content changes to an existing document.
    Update,
    /// Remove a document.
    Delete,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOperation::Create => write!(f, "CREATE"),
            SyncOperation::Update => write!(f, "UPDATE"),
            SyncOperation::Delete => write!(f, "DELETE"),
        }
    }
}

impl std::str::FromStr for SyncOperation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(SyncOperation::Create),
            "UPDATE" => Ok(SyncOperation::Update),
            "DELETE" => Ok(SyncOperation::Delete),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// Lifecycle state of a queue entry.
///
/// `Pending` may transition to `Synced`, back to `Pending` (retry), or to
/// `Failed`; `Synced` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Awaiting processing or a further retry.
    Pending,
    /// Successfully applied; terminal.
    Synced,
    /// Retries exhausted or permanently rejected; terminal.
    Failed,
}

/// Operation-specific payload of a queue entry.
///
/// Binary fields travel base64-encoded at the API boundary and are
/// decoded to raw bytes before entering the merge path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// New title (CREATE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Plain replacement content (UPDATE, last-write-wins fallback).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Base64-encoded CRDT update bytes (UPDATE, merge path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yjs_update: Option<String>,
    /// Base64-encoded full CRDT state to replace the stored snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yjs_state: Option<String>,
}

impl SyncPayload {
    /// Attach raw CRDT update bytes, base64-encoding them for the wire.
    pub fn with_update_bytes(mut self, update: &[u8]) -> Self {
        self.yjs_update = Some(STANDARD.encode(update));
        self
    }

    /// Attach raw full-state bytes, base64-encoding them for the wire.
    pub fn with_state_bytes(mut self, state: &[u8]) -> Self {
        self.yjs_state = Some(STANDARD.encode(state));
        self
    }

    /// Decode the CRDT update bytes, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::MalformedUpdate`] if the field is not valid
    /// base64.
    pub fn update_bytes(&self) -> Result<Option<Vec<u8>>> {
        decode_base64_field(self.yjs_update.as_deref(), "yjsUpdate")
    }

    /// Decode the full CRDT state bytes, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CowriteError::MalformedUpdate`] if the field is not valid
    /// base64.
    pub fn state_bytes(&self) -> Result<Option<Vec<u8>>> {
        decode_base64_field(self.yjs_state.as_deref(), "yjsState")
    }
}

fn decode_base64_field(value: Option<&str>, field: &str) -> Result<Option<Vec<u8>>> {
    match value {
        None => Ok(None),
        Some(encoded) => STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|e| CowriteError::MalformedUpdate(format!("invalid base64 in {}: {}", field, e))),
    }
}

/// A durable outbox record for an offline-originated mutation.
///
/// Created when a client records an intent to mutate while potentially
/// offline, consumed and retired by the queue processor, and never
/// mutated by any other actor.
///
/// The operation kind is kept as the stored string so that rows written
/// by older or foreign clients with unrecognized kinds surface as
/// permanent dispatch failures instead of being unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Unique entry identifier.
    pub id: String,
    /// User who queued the operation.
    pub user_id: String,
    /// Target document.
    pub doc_id: String,
    /// Operation kind as stored ("CREATE", "UPDATE", "DELETE").
    pub operation: String,
    /// Operation-specific payload.
    pub payload: SyncPayload,
    /// Current lifecycle state.
    pub status: SyncStatus,
    /// Count of failed attempts so far.
    pub retries: u32,
    /// Last failure message, if any attempt has failed.
    pub error: Option<String>,
    /// Unix timestamp of creation (milliseconds).
    pub created_at: i64,
    /// Unix timestamp of successful sync (milliseconds).
    pub synced_at: Option<i64>,
}

/// Partial update to a queue entry's bookkeeping fields.
#[derive(Debug, Clone, Default)]
pub struct QueueEntryPatch {
    /// New lifecycle state.
    pub status: Option<SyncStatus>,
    /// New failed-attempt count.
    pub retries: Option<u32>,
    /// New failure message.
    pub error: Option<String>,
    /// New synced timestamp (milliseconds).
    pub synced_at: Option<i64>,
}

/// Wire shape of a single batch sync request entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Target document.
    pub doc_id: String,
    /// Requested operation kind.
    pub operation: SyncOperation,
    /// Operation-specific payload.
    #[serde(default)]
    pub payload: SyncPayload,
}
