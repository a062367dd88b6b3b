//! Instant synchronization of single local changes.
//!
//! Listens to the store's change stream and pushes individual mutations to
//! the server without waiting for the next full pass:
//!
//! - an inserted note that has changed after its last synchronization is
//!   created remotely right away
//! - a deleted note with a valid remote id gets its remote counterpart
//!   deleted right away; the tombstone the store wrote stays in place until
//!   a full pass confirms the remote note is gone, so a failed delete is
//!   retried later
//! - in-place edits are not pushed instantly; pushing on every keystroke
//!   would flood the server, so edits ride along with the next full pass
//!
//! The `has_changed_after_synchronization` check also keeps the engine's
//! own write-backs from echoing: a note just overwritten from a create
//! response carries a fresh `synchronized` stamp and is skipped.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Synchronizer;
use crate::store::ChangeEvent;

/// Handle for the instant-sync listener task.
pub struct InstantSync {
    task: JoinHandle<()>,
}

impl InstantSync {
    /// Subscribe to the store of the given synchronizer and start pushing
    /// changes.
    #[must_use]
    pub fn spawn(synchronizer: Synchronizer) -> Self {
        let mut changes = synchronizer.store().subscribe();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => handle_change(&synchronizer, event).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Instant sync lagged behind the change stream");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    /// Stop listening for changes.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for InstantSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_change(synchronizer: &Synchronizer, event: ChangeEvent) {
    match event {
        ChangeEvent::Inserted(note) => {
            if !note.has_changed_after_synchronization() {
                return;
            }
            info!(local_id = %note.id, "Instantly create remote note for inserted local note");
            if let Err(error) = synchronizer.create_remote_note(&note).await {
                warn!(
                    local_id = %note.id,
                    error = %error,
                    "Instant create failed, the note is picked up by the next full sync"
                );
            }
        }
        ChangeEvent::Updated(note) => {
            // Deliberately not pushed instantly; the next full sync
            // reconciles edits.
            debug!(local_id = %note.id, "Skip instant sync for updated note");
        }
        ChangeEvent::Deleted(note) => {
            let Some(remote_id) = note.remote_id.filter(|id| *id > 0) else {
                return;
            };
            info!(
                local_id = %note.id,
                remote_id,
                "Instantly delete remote note for deleted local note"
            );
            if let Err(error) = synchronizer.delete_remote_note(remote_id).await {
                warn!(
                    remote_id,
                    error = %error,
                    "Instant delete failed, the tombstone is retried by the next full sync"
                );
            }
        }
    }
}
