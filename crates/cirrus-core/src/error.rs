//! Error types for cirrus-core

use thiserror::Error;

/// Result type alias using cirrus-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cirrus-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Server error: {message} ({status})")]
    Api { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An update was attempted on a note that was never linked to a remote note
    #[error("The local note has no remote note id")]
    MissingRemoteId,

    /// The server response did not contain the expected remote note
    #[error("The response contains no remote note")]
    MissingRemoteNoteInResponse,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
