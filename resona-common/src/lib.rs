//! # Resona Common Library
//!
//! Shared code for the Resona streaming subsystem:
//! - Track source descriptors handed in by the catalog surface
//! - Quality-ladder configuration and the initial-rung heuristic
//! - Playback snapshot and download-progress event types
//! - HLS master/media playlist model (parsed by the player, emitted by
//!   the transcoder)

pub mod events;
pub mod hls;
pub mod ladder;
pub mod track;

pub use events::{DownloadProgress, DownloadStatus, PlaybackSnapshot};
pub use ladder::{AudioFormat, QualityVariant};
pub use track::TrackSource;
