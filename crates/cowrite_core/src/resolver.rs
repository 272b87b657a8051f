//! Stateless conflict resolution over document content.
//!
//! Two strategies coexist: CRDT merge when the client supplied update
//! bytes, and last-write-wins when only plain content is available.
//! CRDT merges are commutative and convergent, so applying an update
//! against a freshly seeded replica is correct as long as the base
//! content and the incoming bytes are causally consistent.

use crate::replica::TextReplica;

/// Result of merging incoming update bytes into base content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The post-merge text projection. On failure this is the base
    /// content, unchanged.
    pub merged_content: String,
    /// Whether the incoming update was applied.
    pub resolved: bool,
}

/// Which side of a version comparison is ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    /// The server holds a strictly newer version.
    Server,
    /// The client holds a strictly newer version.
    Client,
    /// Both sides report the same version.
    Same,
}

/// Merge incoming CRDT update bytes into base content.
///
/// A fresh replica is seeded with `base_content` as an initial insert, the
/// update is applied against it, and the projected text is read back. Any
/// decode or apply failure fails closed: the base content is returned
/// unchanged with `resolved = false`.
pub fn merge_updates(base_content: &str, incoming_update: &[u8]) -> MergeOutcome {
    let mut replica = TextReplica::with_content(base_content);

    match replica.apply_update(incoming_update) {
        Ok(()) => MergeOutcome {
            merged_content: replica.text(),
            resolved: true,
        },
        Err(e) => {
            log::warn!("CRDT merge failed, keeping base content: {}", e);
            MergeOutcome {
                merged_content: base_content.to_string(),
                resolved: false,
            }
        }
    }
}

/// Keep whichever content carries the strictly later timestamp.
///
/// Ties favor the server. Timestamps are millisecond Unix time, matching
/// the document row's `last_modified_at`.
pub fn last_write_wins(
    server_content: &str,
    client_content: &str,
    server_timestamp: i64,
    client_timestamp: i64,
) -> String {
    if client_timestamp > server_timestamp {
        client_content.to_string()
    } else {
        server_content.to_string()
    }
}

/// Compare server and client document versions.
pub fn compare_versions(server_version: u64, client_version: u64) -> VersionOrder {
    if server_version > client_version {
        VersionOrder::Server
    } else if client_version > server_version {
        VersionOrder::Client
    } else {
        VersionOrder::Same
    }
}

/// Encode plain content as canonical CRDT state bytes.
///
/// Round-trips the string through a freshly seeded replica purely to
/// obtain a valid CRDT encoding of it.
pub fn snapshot_bytes(content: &str) -> Vec<u8> {
    TextReplica::with_content(content).encode_state()
}

/// Restore plain content from CRDT state bytes.
///
/// `None` or undecodable bytes yield the empty string rather than an
/// error; a missing or corrupt snapshot must not make restoration fail.
pub fn restore_snapshot(snapshot: Option<&[u8]>) -> String {
    let Some(bytes) = snapshot else {
        return String::new();
    };

    let mut replica = TextReplica::new();
    match replica.apply_update(bytes) {
        Ok(()) => replica.text(),
        Err(e) => {
            log::warn!("Snapshot restore failed, returning empty content: {}", e);
            String::new()
        }
    }
}
