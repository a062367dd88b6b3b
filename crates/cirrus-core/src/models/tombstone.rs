//! Tombstone model

use serde::{Deserialize, Serialize};

/// A record of a remote note id pending deletion.
///
/// Created transactionally when a linked local note is deleted while the
/// remote delete cannot be confirmed immediately. A tombstone is retained
/// until the server no longer reports a note with that id; stale tombstones
/// are pruned during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tombstone {
    /// The id of the remote note that should be deleted.
    pub remote_note_id: i64,
}

impl Tombstone {
    /// Create a new tombstone for a remote note id.
    #[must_use]
    pub const fn new(remote_note_id: i64) -> Self {
        Self { remote_note_id }
    }
}
