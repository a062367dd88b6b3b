//! Data models for Cirrus

mod note;
mod remote_note;
mod tombstone;

pub use note::{LocalNote, NoteId};
pub use remote_note::RemoteNote;
pub use tombstone::Tombstone;

use chrono::{DateTime, Utc};

/// Read surface shared by local and remote notes.
///
/// `LocalNote` and `RemoteNote` stay distinct concrete types because their
/// persistence and lifecycle differ completely; this trait covers the fields
/// the synchronization engine compares.
pub trait NoteFields {
    /// The title of the note. It should be the first line of the content.
    fn title(&self) -> &str;

    /// The main content of the note.
    fn content(&self) -> &str;

    /// The category of the note.
    fn category(&self) -> &str;

    /// Whether this note is a favorite.
    fn favorite(&self) -> bool;

    /// The last modification time.
    fn modified(&self) -> Option<DateTime<Utc>>;
}
