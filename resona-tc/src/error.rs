//! Error types for the transcoder service

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An external encode step exited nonzero or produced no output
    #[error("transcode failed for variant '{variant}': {detail}")]
    Transcode { variant: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// Track id or filename that cannot be used as a path component
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("manifest error: {0}")]
    Manifest(#[from] resona_common::hls::ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
