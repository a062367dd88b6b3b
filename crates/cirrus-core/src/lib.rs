//! cirrus-core - Core library for Cirrus
//!
//! This crate contains the note models, the local note store, the remote
//! CloudNotes client, and the synchronization engine that keeps the two
//! sides consistent.

pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{LocalNote, NoteId, RemoteNote, Tombstone};
pub use store::NoteStore;
pub use sync::Synchronizer;
