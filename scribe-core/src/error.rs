//! Error types for scribe-core

use thiserror::Error;

/// Main error type for the scribe-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// External pass exited unsuccessfully or produced unusable output
    #[error("{pass} pass failed: {message}")]
    Pass { pass: String, message: String },

    /// External pass exceeded its time budget
    #[error("{pass} pass timed out after {secs}s")]
    PassTimeout { pass: String, secs: u64 },
}

impl Error {
    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type alias for scribe-core
pub type Result<T> = std::result::Result<T, Error>;
