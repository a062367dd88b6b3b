//! Remote note snapshot model

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::NoteFields;

/// An immutable snapshot of a note as reported by the CloudNotes server.
///
/// Constructed fresh from each list/create/update response and discarded
/// after reconciliation. Identity for set membership is the remote `id`.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteNote {
    /// The id of the remote note. A remote note without an id is useless,
    /// so decoding fails when it is absent.
    pub id: i64,
    /// The title of the note. It should be the first line of the content.
    pub title: String,
    /// The main content of the note.
    pub content: String,
    /// The category of the note.
    pub category: String,
    /// Favorite flag; defaults to false when the server omits it.
    pub favorite: bool,
    /// The last modification time, epoch seconds on the wire.
    pub modified: Option<DateTime<Utc>>,
}

impl PartialEq for RemoteNote {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RemoteNote {}

impl Hash for RemoteNote {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl NoteFields for RemoteNote {
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

/// Wire representation; `id` and `modified` are required, everything else
/// falls back to a default.
#[derive(Deserialize)]
struct RemoteNoteWire {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    favorite: Option<bool>,
    modified: f64,
}

impl<'de> Deserialize<'de> for RemoteNote {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = RemoteNoteWire::deserialize(deserializer)?;

        #[allow(clippy::cast_possible_truncation)]
        let modified = DateTime::<Utc>::from_timestamp(wire.modified as i64, 0);

        Ok(Self {
            id: wire.id,
            title: wire.title.unwrap_or_default(),
            content: wire.content.unwrap_or_default(),
            category: wire.category.unwrap_or_default(),
            favorite: wire.favorite.unwrap_or(false),
            modified,
        })
    }
}
