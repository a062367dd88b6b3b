//! The synchronization engine for local and remote notes.
//!
//! # Classification
//!
//! The action for every note follows from four criteria: the local note
//! exists or is missing, the remote note exists or is missing, the local
//! note knows its remote counterpart (has a remote id), and a tombstone
//! exists for the remote id.
//!
//! A missing local note can only be told apart from a never-added one with
//! the tombstone set: a tombstone records that the note was deleted locally
//! while the remote delete could not be confirmed yet.
//!
//! ```text
//!  Local | knows  | Tomb-  | Remote | Action
//!  note  | remote | stone  | note   |
//! -------+--------+--------+--------+--------------------------------
//!    x   |   x    |   -    |   x    | resolve by modification time
//!    x   |   x    |   -    |   -    | delete local note
//!    x   |   -    |   -    |   -    | create remote note
//!    -   |   -    |   x    |   x    | delete remote note
//!    -   |   -    |   x    |   -    | prune tombstone
//!    -   |   -    |   -    |   x    | create local note
//! -------+--------+--------+--------+--------------------------------
//!  'x' is present, '-' is missing; other combinations are unreachable.
//! ```
//!
//! When a note exists on both sides the older side is overwritten with the
//! newer one, by modification time; a side without a timestamp loses
//! against a side with one.
//!
//! A note that is deleted locally while the remote copy carries a pending
//! edit is still deleted remotely; the deletion is not conditionally
//! resurrected from the newer remote edit.

mod instant;
mod timer;


pub use instant::InstantSync;
pub use timer::{PeriodicSync, SyncPeriod};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{LocalNote, RemoteNote, Tombstone};
use crate::notify::SyncNotifier;
use crate::remote::NotesApi;
use crate::store::NoteStore;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// When the pass started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the pass finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Remote notes created from unlinked local notes.
    pub remote_created: u32,
    /// Remote notes overwritten from newer local notes.
    pub remote_updated: u32,
    /// Remote notes deleted from tombstones.
    pub remote_deleted: u32,
    /// Local notes created from remote notes.
    pub local_created: u32,
    /// Local notes overwritten from newer remote notes.
    pub local_updated: u32,
    /// Local notes deleted because their remote counterpart vanished.
    pub local_deleted: u32,
    /// Tombstones pruned because the remote note is confirmed gone.
    pub tombstones_pruned: u32,
    /// Per-note failures; the affected notes are retried on the next pass.
    pub errors: Vec<SyncErrorEntry>,
}

/// A per-note failure recorded during a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    /// Identifies the affected note (local id or remote id).
    pub entity: String,
    /// The failure message.
    pub error: String,
    /// When the failure occurred.
    pub timestamp: DateTime<Utc>,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// True if any per-note failure was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total number of local and remote mutations performed.
    #[must_use]
    pub const fn mutation_count(&self) -> u32 {
        self.remote_created
            + self.remote_updated
            + self.remote_deleted
            + self.local_created
            + self.local_updated
            + self.local_deleted
            + self.tombstones_pruned
    }

    fn add_error(&mut self, entity: impl Into<String>, error: impl ToString) {
        self.errors.push(SyncErrorEntry {
            entity: entity.into(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Reconciles the local note store with the remote notes service.
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<NoteStore>,
    api: Arc<dyn NotesApi>,
    notifier: SyncNotifier,
}

impl Synchronizer {
    /// Create a synchronizer over a store and a remote client.
    pub fn new(store: Arc<NoteStore>, api: Arc<dyn NotesApi>, notifier: SyncNotifier) -> Self {
        Self {
            store,
            api,
            notifier,
        }
    }

    /// The store this synchronizer reconciles.
    #[must_use]
    pub fn store(&self) -> &Arc<NoteStore> {
        &self.store
    }

    /// Run one full reconciliation pass.
    ///
    /// Fetches the remote list and the local snapshots, prunes stale
    /// tombstones, then classifies and executes. A failure of the remote
    /// list or of either local snapshot aborts the pass before any
    /// mutation; per-note failures are recorded in the report and retried
    /// on the next pass.
    pub async fn synchronize(&self) -> Result<SyncReport> {
        info!("Synchronize notes");
        let _batch = self.notifier.begin_batch();

        let remote_notes = self.list_remote_notes().await?;
        let local_notes = self.store.fetch_all_notes()?;
        let tombstones = self.store.fetch_all_tombstones()?;

        let mut report = SyncReport::new();
        let tombstones = self.prune_tombstones(&remote_notes, tombstones, &mut report);
        self.reconcile(local_notes, remote_notes, &tombstones, &mut report)
            .await;

        report.complete();
        info!(
            remote_created = report.remote_created,
            remote_updated = report.remote_updated,
            remote_deleted = report.remote_deleted,
            local_created = report.local_created,
            local_updated = report.local_updated,
            local_deleted = report.local_deleted,
            tombstones_pruned = report.tombstones_pruned,
            errors = report.errors.len(),
            "Synchronization finished"
        );
        Ok(report)
    }

    async fn list_remote_notes(&self) -> Result<Vec<RemoteNote>> {
        let guard = self.notifier.begin_request();
        match self.api.list().await {
            Ok(notes) => {
                guard.succeeded();
                debug!(count = notes.len(), "Fetched remote notes");
                Ok(notes)
            }
            Err(error) => {
                warn!(error = %error, "Can't synchronize notes, the remote notes are not available");
                guard.failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Remove tombstones whose remote note is confirmed gone and return the
    /// survivors.
    ///
    /// The absence of the remote id from the list is the confirmation that
    /// the remote deletion already happened.
    fn prune_tombstones(
        &self,
        remote_notes: &[RemoteNote],
        tombstones: Vec<Tombstone>,
        report: &mut SyncReport,
    ) -> Vec<Tombstone> {
        let remote_ids: HashSet<i64> = remote_notes.iter().map(|note| note.id).collect();
        let (live, stale): (Vec<Tombstone>, Vec<Tombstone>) = tombstones
            .into_iter()
            .partition(|tombstone| remote_ids.contains(&tombstone.remote_note_id));

        for tombstone in stale {
            match self.store.delete_tombstone(tombstone.remote_note_id) {
                Ok(()) => {
                    debug!(
                        remote_note_id = tombstone.remote_note_id,
                        "Pruned stale tombstone"
                    );
                    report.tombstones_pruned += 1;
                }
                Err(error) => {
                    warn!(
                        remote_note_id = tombstone.remote_note_id,
                        error = %error,
                        "Can't prune tombstone"
                    );
                    report.add_error(tombstone.remote_note_id.to_string(), &error);
                }
            }
        }

        live
    }

    async fn reconcile(
        &self,
        local_notes: Vec<LocalNote>,
        remote_notes: Vec<RemoteNote>,
        tombstones: &[Tombstone],
        report: &mut SyncReport,
    ) {
        let tombstone_ids: HashSet<i64> = tombstones
            .iter()
            .map(|tombstone| tombstone.remote_note_id)
            .collect();
        let remote_ids: HashSet<i64> = remote_notes.iter().map(|note| note.id).collect();
        let linked: HashMap<i64, &LocalNote> = local_notes
            .iter()
            .filter(|note| note.has_valid_remote_id())
            .filter_map(|note| note.remote_id.map(|id| (id, note)))
            .collect();

        // Local notes that never got a remote counterpart are created
        // remotely.
        for note in local_notes
            .iter()
            .filter(|note| !note.has_valid_remote_id())
        {
            match self.create_remote_note(note).await {
                Ok(()) => report.remote_created += 1,
                Err(error) => report.add_error(note.id.as_str(), &error),
            }
        }

        // Linked local notes whose remote id vanished were deleted on
        // another client; delete them locally too.
        for note in local_notes.iter().filter(|note| {
            note.has_valid_remote_id() && !remote_ids.contains(&note.remote_id.unwrap_or(0))
        }) {
            match self.delete_local_note(note) {
                Ok(()) => report.local_deleted += 1,
                Err(error) => report.add_error(note.id.as_str(), &error),
            }
        }

        for remote in &remote_notes {
            if let Some(local) = linked.get(&remote.id) {
                self.resolve_pair(local, remote, report).await;
            } else if tombstone_ids.contains(&remote.id) {
                // Deleted locally while the server still has it. The
                // tombstone is kept; it is pruned by a later pass once the
                // remote id no longer shows up in the list.
                match self.delete_remote_note(remote.id).await {
                    Ok(()) => report.remote_deleted += 1,
                    Err(error) => report.add_error(remote.id.to_string(), &error),
                }
            } else {
                // New note from another client.
                match self.create_local_note(remote) {
                    Ok(()) => report.local_created += 1,
                    Err(error) => report.add_error(remote.id.to_string(), &error),
                }
            }
        }
    }

    /// Resolve a note present on both sides by modification time.
    async fn resolve_pair(&self, local: &LocalNote, remote: &RemoteNote, report: &mut SyncReport) {
        match local.compare_modification(remote) {
            std::cmp::Ordering::Equal => {
                debug!(
                    local_id = %local.id,
                    remote_id = remote.id,
                    "Skip update, the modification time is equal"
                );
            }
            std::cmp::Ordering::Greater => match self.update_remote_note(local).await {
                Ok(()) => report.remote_updated += 1,
                Err(error) => report.add_error(local.id.as_str(), &error),
            },
            std::cmp::Ordering::Less => match self.overwrite_local_note(local, remote) {
                Ok(()) => report.local_updated += 1,
                Err(error) => report.add_error(local.id.as_str(), &error),
            },
        }
    }

    /// Create a remote note from a local note and fold the response back.
    ///
    /// On success the local note is overwritten with the returned remote
    /// note, which links it (`remote_id`) and stamps `synchronized`. Also
    /// the instant-sync path for inserted notes.
    pub async fn create_remote_note(&self, note: &LocalNote) -> Result<()> {
        info!(local_id = %note.id, "Create remote note from local note");
        let guard = self.notifier.begin_request();
        match self.api.create(note).await {
            Ok(remote) => {
                guard.succeeded();
                let mut updated = note.clone();
                updated.overwrite(&remote);
                self.store.save_synced_note(&updated)?;
                Ok(())
            }
            Err(error) => {
                warn!(local_id = %note.id, error = %error, "Can't create remote note");
                guard.failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Update a remote note from a newer local note and fold the response
    /// back.
    async fn update_remote_note(&self, note: &LocalNote) -> Result<()> {
        info!(local_id = %note.id, "Update remote note with local note");
        let guard = self.notifier.begin_request();
        match self.api.update(note).await {
            Ok(remote) => {
                guard.succeeded();
                let mut updated = note.clone();
                updated.overwrite(&remote);
                self.store.save_synced_note(&updated)?;
                Ok(())
            }
            Err(error) => {
                warn!(local_id = %note.id, error = %error, "Can't update remote note");
                guard.failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Delete a remote note. Also the instant-sync path for deleted notes;
    /// the tombstone recorded by the store stays until a full pass confirms
    /// the remote note is gone.
    pub async fn delete_remote_note(&self, remote_note_id: i64) -> Result<()> {
        info!(remote_note_id, "Delete remote note");
        let guard = self.notifier.begin_request();
        match self.api.delete(remote_note_id).await {
            Ok(()) => {
                guard.succeeded();
                Ok(())
            }
            Err(error) => {
                warn!(remote_note_id, error = %error, "Can't delete remote note");
                guard.failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Overwrite a local note with a newer remote note.
    fn overwrite_local_note(&self, local: &LocalNote, remote: &RemoteNote) -> Result<()> {
        info!(local_id = %local.id, remote_id = remote.id, "Update local note with remote note");
        let mut updated = local.clone();
        updated.overwrite(remote);
        self.store.save_synced_note(&updated)
    }

    /// Create a local note mirroring a remote note.
    fn create_local_note(&self, remote: &RemoteNote) -> Result<()> {
        info!(remote_id = remote.id, "Create local note from remote note");
        self.store.save_synced_note(&LocalNote::from_remote(remote))
    }

    /// Delete a local note whose remote counterpart vanished.
    fn delete_local_note(&self, note: &LocalNote) -> Result<()> {
        info!(local_id = %note.id, "Delete local note, the remote note was removed elsewhere");
        self.store.remove_synced_note(&note.id)
    }
}
