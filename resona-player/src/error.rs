//! Error types for the player core
//!
//! Defines the failure taxonomy using thiserror. The playback engine
//! itself never propagates these across its public API; they resolve to
//! an observable error snapshot instead.

use thiserror::Error;

/// Main error type for the player core
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or fetch failure
    #[error("Network error: {0}")]
    Network(String),

    /// Unsupported or corrupt stream
    #[error("Media decode error: {0}")]
    MediaDecode(String),

    /// Malformed manifest
    #[error("Manifest error: {0}")]
    Manifest(#[from] resona_common::hls::ManifestError),

    /// Blob persistence or quota failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Playback blocked pending a user gesture
    #[error("Playback requires a user interaction")]
    InteractionRequired,

    /// Settings/record persistence errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
