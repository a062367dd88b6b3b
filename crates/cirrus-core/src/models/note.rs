//! Local note model

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{NoteFields, RemoteNote};
use crate::util::first_line;

/// A unique identifier for a local note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The authoritative local record of a note.
///
/// A note is *linked* when `remote_id` holds the id of its counterpart on
/// the server; an unset or non-positive `remote_id` means "never synced".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNote {
    /// Unique identifier, immutable once created
    pub id: NoteId,
    /// Id of the corresponding remote note, if any
    pub remote_id: Option<i64>,
    /// Title, derived from the first line of the content
    pub title: String,
    /// Plain text content
    pub content: String,
    /// Category name (empty when uncategorized)
    pub category: String,
    /// Favorite flag
    pub favorite: bool,
    /// Creation timestamp
    pub created: DateTime<Utc>,
    /// Last modification timestamp
    pub modified: Option<DateTime<Utc>>,
    /// Timestamp of the last successful reconciliation touching this note
    pub synchronized: Option<DateTime<Utc>>,
}

impl LocalNote {
    /// Create a new note with the given content.
    ///
    /// Sets `created` and `modified` to now and derives the title from the
    /// first line of the content. The note starts unlinked and never
    /// synchronized.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: NoteId::new(),
            remote_id: None,
            title: first_line(&content),
            content,
            category: String::new(),
            favorite: false,
            created: now,
            modified: Some(now),
            synchronized: None,
        }
    }

    /// Replace the content, recomputing the title and refreshing `modified`.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.title = first_line(&self.content);
        self.modified = Some(Utc::now());
    }

    /// Replace the category, refreshing `modified`.
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
        self.modified = Some(Utc::now());
    }

    /// Replace the favorite flag, refreshing `modified`.
    pub fn set_favorite(&mut self, favorite: bool) {
        self.favorite = favorite;
        self.modified = Some(Utc::now());
    }

    /// True if a remote id is set and valid. A valid id is greater than zero.
    #[must_use]
    pub fn has_valid_remote_id(&self) -> bool {
        self.remote_id.unwrap_or(0) > 0
    }

    /// True if changed locally after the last synchronization.
    ///
    /// ```text
    /// modified | synchronized | Result
    /// ---------+--------------+------------------------
    ///   None   |     None     | false
    ///   None   |     Some     | false
    ///   Some   |     None     | true
    ///   Some   |     Some     | synchronized < modified
    /// ```
    #[must_use]
    pub fn has_changed_after_synchronization(&self) -> bool {
        let Some(modified) = self.modified else {
            return false;
        };
        match self.synchronized {
            Some(synchronized) => synchronized < modified,
            None => true,
        }
    }

    /// Compare the modification time of this note with another note.
    ///
    /// A side without a modification time always loses against a side with
    /// one; two missing timestamps compare equal.
    #[must_use]
    pub fn compare_modification(&self, other: &impl NoteFields) -> Ordering {
        match (self.modified, other.modified()) {
            (Some(mine), Some(theirs)) => mine.cmp(&theirs),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    /// Overwrite this note with values from a remote note.
    ///
    /// Copies `remote_id`, `title`, `content`, `category`, `favorite` and
    /// `modified`, then stamps `synchronized` with the current time.
    /// `created` is kept as-is because remote notes don't carry it.
    pub fn overwrite(&mut self, remote: &RemoteNote) {
        self.remote_id = Some(remote.id);
        self.title = remote.title.clone();
        self.content = remote.content.clone();
        self.category = remote.category.clone();
        self.favorite = remote.favorite;
        self.modified = remote.modified;
        self.synchronized = Some(Utc::now());
    }

    /// Create a local note mirroring a remote note.
    #[must_use]
    pub fn from_remote(remote: &RemoteNote) -> Self {
        let mut note = Self::new("");
        note.overwrite(remote);
        note
    }
}

impl NoteFields for LocalNote {
    fn title(&self) -> &str {
        &self.title
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn favorite(&self) -> bool {
        self.favorite
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn timestamp(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn remote_note(id: i64, modified: Option<i64>) -> RemoteNote {
        RemoteNote {
            id,
            title: "Remote".to_string(),
            content: "Remote\nbody".to_string(),
            category: "inbox".to_string(),
            favorite: true,
            modified: modified.map(timestamp),
        }
    }

    #[test]
    fn new_note_derives_title_from_first_line() {
        let note = LocalNote::new("Shopping list\nmilk\neggs");
        assert_eq!(note.title, "Shopping list");
        assert!(note.modified.is_some());
        assert!(note.synchronized.is_none());
        assert!(note.remote_id.is_none());
    }

    #[test]
    fn set_content_recomputes_title_and_modified() {
        let mut note = LocalNote::new("Old title");
        let before = note.modified;
        note.set_content("New title\nrest");
        assert_eq!(note.title, "New title");
        assert!(note.modified >= before);
    }

    #[test]
    fn has_valid_remote_id_requires_positive_value() {
        let mut note = LocalNote::new("x");
        assert!(!note.has_valid_remote_id());
        note.remote_id = Some(0);
        assert!(!note.has_valid_remote_id());
        note.remote_id = Some(-3);
        assert!(!note.has_valid_remote_id());
        note.remote_id = Some(42);
        assert!(note.has_valid_remote_id());
    }

    #[test]
    fn has_changed_after_synchronization_truth_table() {
        let mut note = LocalNote::new("x");

        note.modified = None;
        note.synchronized = None;
        assert!(!note.has_changed_after_synchronization());

        note.synchronized = Some(timestamp(100));
        assert!(!note.has_changed_after_synchronization());

        note.modified = Some(timestamp(200));
        note.synchronized = None;
        assert!(note.has_changed_after_synchronization());

        note.synchronized = Some(timestamp(100));
        assert!(note.has_changed_after_synchronization());

        note.synchronized = Some(timestamp(200));
        assert!(!note.has_changed_after_synchronization());

        note.synchronized = Some(timestamp(300));
        assert!(!note.has_changed_after_synchronization());
    }

    #[test]
    fn compare_modification_orders_by_timestamp() {
        let mut note = LocalNote::new("x");
        note.modified = Some(timestamp(200));

        assert_eq!(
            note.compare_modification(&remote_note(1, Some(100))),
            Ordering::Greater
        );
        assert_eq!(
            note.compare_modification(&remote_note(1, Some(200))),
            Ordering::Equal
        );
        assert_eq!(
            note.compare_modification(&remote_note(1, Some(300))),
            Ordering::Less
        );
    }

    #[test]
    fn compare_modification_missing_timestamp_loses() {
        let mut note = LocalNote::new("x");

        note.modified = Some(timestamp(200));
        assert_eq!(
            note.compare_modification(&remote_note(1, None)),
            Ordering::Greater
        );

        note.modified = None;
        assert_eq!(
            note.compare_modification(&remote_note(1, Some(100))),
            Ordering::Less
        );
        assert_eq!(
            note.compare_modification(&remote_note(1, None)),
            Ordering::Equal
        );
    }

    #[test]
    fn overwrite_copies_remote_fields_and_stamps_synchronized() {
        let mut note = LocalNote::new("Local");
        let remote = remote_note(42, Some(500));

        note.overwrite(&remote);

        assert_eq!(note.remote_id, Some(42));
        assert_eq!(note.title, "Remote");
        assert_eq!(note.content, "Remote\nbody");
        assert_eq!(note.category, "inbox");
        assert!(note.favorite);
        assert_eq!(note.modified, Some(timestamp(500)));
        assert!(note.synchronized.is_some());
    }

    #[test]
    fn from_remote_mirrors_remote_fields() {
        let note = LocalNote::from_remote(&remote_note(7, Some(123)));
        assert_eq!(note.remote_id, Some(7));
        assert_eq!(note.content, "Remote\nbody");
        assert!(note.synchronized.is_some());
    }

    #[test]
    fn note_id_parse_roundtrip() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
