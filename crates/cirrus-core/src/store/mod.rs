//! Local note store
//!
//! SQLite-backed persistence for notes and tombstones. Every user-facing
//! mutation runs in a transaction and publishes a [`ChangeEvent`] after
//! commit; the synchronization engine uses the silent variants so its own
//! writes don't re-trigger instant sync.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::models::{LocalNote, NoteId, Tombstone};

/// Buffer size for the change-event broadcast channel.
const CHANGE_CHANNEL_SIZE: usize = 64;

/// A change to the local note collection, tagged by kind.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A note was inserted by a user action.
    Inserted(LocalNote),
    /// A note was updated by a user action.
    Updated(LocalNote),
    /// A note was deleted by a user action.
    Deleted(LocalNote),
}

/// SQLite-backed store owning notes and tombstones.
pub struct NoteStore {
    conn: Mutex<Connection>,
    events: broadcast::Sender<ChangeEvent>,
}

impl NoteStore {
    /// Open a store at the given path, creating the file and schema if
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Ok(Self {
            conn: Mutex::new(conn),
            events,
        })
    }

    /// Subscribe to the change-event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    // --- Snapshots -------------------------------------------------------

    /// Fetch all notes.
    pub fn fetch_all_notes(&self) -> Result<Vec<LocalNote>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, remote_id, title, content, category, favorite,
                    created, modified, synchronized
             FROM notes
             ORDER BY created, id",
        )?;
        let notes = stmt
            .query_map([], parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Fetch all tombstones.
    pub fn fetch_all_tombstones(&self) -> Result<Vec<Tombstone>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT remote_note_id FROM tombstones")?;
        let tombstones = stmt
            .query_map([], |row| Ok(Tombstone::new(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tombstones)
    }

    /// Fetch a single note by id.
    pub fn fetch_note(&self, id: &NoteId) -> Result<Option<LocalNote>> {
        let conn = self.lock_conn()?;
        let note = conn
            .query_row(
                "SELECT id, remote_id, title, content, category, favorite,
                        created, modified, synchronized
                 FROM notes WHERE id = ?",
                params![id.as_str()],
                parse_note,
            )
            .optional()?;
        Ok(note)
    }

    // --- User mutations (publish change events) --------------------------

    /// Create a new note from content and persist it.
    pub fn create_note(&self, content: &str) -> Result<LocalNote> {
        let note = LocalNote::new(content);
        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            insert_note_row(&tx, &note)?;
            tx.commit()?;
        }
        let _ = self.events.send(ChangeEvent::Inserted(note.clone()));
        Ok(note)
    }

    /// Persist an edited note.
    pub fn update_note(&self, note: &LocalNote) -> Result<()> {
        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            let rows = update_note_row(&tx, note)?;
            if rows == 0 {
                return Err(Error::Store(format!("note not found: {}", note.id)));
            }
            tx.commit()?;
        }
        let _ = self.events.send(ChangeEvent::Updated(note.clone()));
        Ok(())
    }

    /// Delete a note.
    ///
    /// When the note is linked to a remote note, a tombstone for its remote
    /// id is written in the same transaction, so the deletion is never lost
    /// even if the process stops before the remote delete goes through.
    pub fn delete_note(&self, id: &NoteId) -> Result<LocalNote> {
        let note = self
            .fetch_note(id)?
            .ok_or_else(|| Error::Store(format!("note not found: {id}")))?;
        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM notes WHERE id = ?", params![id.as_str()])?;
            if let Some(remote_id) = note.remote_id.filter(|id| *id > 0) {
                tx.execute(
                    "INSERT OR IGNORE INTO tombstones (remote_note_id) VALUES (?)",
                    params![remote_id],
                )?;
            }
            tx.commit()?;
        }
        let _ = self.events.send(ChangeEvent::Deleted(note.clone()));
        Ok(note)
    }

    // --- Reconciler mutations (silent) -----------------------------------

    /// Insert or update a note without publishing a change event.
    ///
    /// Used by the synchronization engine when folding remote state into the
    /// store; instant sync must not react to these writes.
    pub fn save_synced_note(&self, note: &LocalNote) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let rows = update_note_row(&tx, note)?;
        if rows == 0 {
            insert_note_row(&tx, note)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a note without publishing a change event or tombstone.
    ///
    /// Used when the remote counterpart vanished; there is nothing left to
    /// delete on the server.
    pub fn remove_synced_note(&self, id: &NoteId) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notes WHERE id = ?", params![id.as_str()])?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a tombstone for a remote note id.
    pub fn insert_tombstone(&self, remote_note_id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO tombstones (remote_note_id) VALUES (?)",
            params![remote_note_id],
        )?;
        Ok(())
    }

    /// Delete a tombstone.
    pub fn delete_tombstone(&self, remote_note_id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM tombstones WHERE remote_note_id = ?",
            params![remote_note_id],
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notes (
             id            TEXT PRIMARY KEY,
             remote_id     INTEGER,
             title         TEXT NOT NULL,
             content       TEXT NOT NULL,
             category      TEXT NOT NULL,
             favorite      INTEGER NOT NULL,
             created       INTEGER NOT NULL,
             modified      INTEGER,
             synchronized  INTEGER
         );
         CREATE TABLE IF NOT EXISTS tombstones (
             remote_note_id INTEGER PRIMARY KEY
         );",
    )?;
    Ok(())
}

fn insert_note_row(conn: &Connection, note: &LocalNote) -> Result<()> {
    conn.execute(
        "INSERT INTO notes (id, remote_id, title, content, category, favorite,
                            created, modified, synchronized)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            note.id.as_str(),
            note.remote_id,
            note.title,
            note.content,
            note.category,
            i32::from(note.favorite),
            note.created.timestamp(),
            note.modified.map(|t| t.timestamp()),
            note.synchronized.map(|t| t.timestamp()),
        ],
    )?;
    Ok(())
}

fn update_note_row(conn: &Connection, note: &LocalNote) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE notes
         SET remote_id = ?, title = ?, content = ?, category = ?, favorite = ?,
             modified = ?, synchronized = ?
         WHERE id = ?",
        params![
            note.remote_id,
            note.title,
            note.content,
            note.category,
            i32::from(note.favorite),
            note.modified.map(|t| t.timestamp()),
            note.synchronized.map(|t| t.timestamp()),
            note.id.as_str(),
        ],
    )?;
    Ok(rows)
}

fn parse_note(row: &Row<'_>) -> rusqlite::Result<LocalNote> {
    let id: String = row.get(0)?;
    Ok(LocalNote {
        id: id.parse().unwrap_or_default(),
        remote_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        category: row.get(4)?,
        favorite: row.get::<_, i32>(5)? != 0,
        created: from_epoch(row.get(6)?),
        modified: row.get::<_, Option<i64>>(7)?.map(from_epoch),
        synchronized: row.get::<_, Option<i64>>(8)?.map(from_epoch),
    })
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}
