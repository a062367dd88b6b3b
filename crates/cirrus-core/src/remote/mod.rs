//! Remote CloudNotes service client

mod http;

pub use http::HttpNotesClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LocalNote, RemoteNote};

/// Operations against the remote notes service.
///
/// Implemented by [`HttpNotesClient`] for the real service and by scripted
/// fakes in tests.
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// Fetch all remote notes.
    async fn list(&self) -> Result<Vec<RemoteNote>>;

    /// Create a remote note from a local note's fields.
    async fn create(&self, note: &LocalNote) -> Result<RemoteNote>;

    /// Update the remote counterpart of a local note.
    ///
    /// Fails with [`crate::Error::MissingRemoteId`] when the note has no
    /// remote link.
    async fn update(&self, note: &LocalNote) -> Result<RemoteNote>;

    /// Delete a remote note. A 404 response is folded into success.
    async fn delete(&self, remote_note_id: i64) -> Result<()>;

    /// Test the connection to the service.
    async fn check(&self) -> Result<()>;
}
