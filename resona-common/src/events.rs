//! Event and snapshot types crossing the core's boundaries
//!
//! UI surfaces consume these as read-only values; only the owning service
//! mutates the underlying state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only playback state snapshot broadcast to subscribers.
///
/// Invariant: `progress == current_time / duration` when `duration` is
/// finite and positive, otherwise `progress == 0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Position in seconds
    pub current_time: f64,
    /// Duration in seconds (0.0 until metadata is known)
    pub duration: f64,
    /// Normalized position in `[0, 1]`
    pub progress: f64,
    /// True while loading metadata or rebuffering
    pub is_loading: bool,
    /// Master volume in `[0, 1]`
    pub volume: f32,
    /// True when playing from the local cache rather than the network
    pub is_playing_offline: bool,
    /// Set after a terminal playback failure; cleared on the next source
    pub error: Option<String>,
}

impl PlaybackSnapshot {
    /// Compute the normalized progress for a position/duration pair
    pub fn progress_for(current_time: f64, duration: f64) -> f64 {
        if duration.is_finite() && duration > 0.0 {
            (current_time / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: 0.0,
            progress: 0.0,
            is_loading: false,
            volume: 1.0,
            is_playing_offline: false,
            error: None,
        }
    }
}

/// Download lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Idle,
    Downloading,
    Completed,
    Error,
}

/// Progress of an in-flight byte transfer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Bytes received so far
    pub loaded: u64,
    /// Declared total (content-length), if the server sent one
    pub total: Option<u64>,
    /// `loaded / total * 100`, or None when the total is unknown
    pub percentage: Option<f32>,
}

impl DownloadProgress {
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        let percentage = total
            .filter(|t| *t > 0)
            .map(|t| (loaded as f64 / t as f64 * 100.0) as f32);
        Self {
            loaded,
            total,
            percentage,
        }
    }
}

/// Events published by the offline download manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// Bytes arrived for an in-flight download
    Progress {
        song_id: String,
        progress: DownloadProgress,
    },
    /// A download record changed state
    StateChanged {
        song_id: String,
        status: DownloadStatus,
        timestamp: DateTime<Utc>,
    },
}
