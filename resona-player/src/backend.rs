//! Audio resource abstraction
//!
//! The engine never talks to a concrete media API. A backend opens one
//! live resource per source and reports readiness, time, buffering, and
//! failure through a typed event channel; the engine owns the handle and
//! is the only component allowed to drive it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Classifies a reported media failure for the recovery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorKind {
    /// Transport failure while loading media data
    Network,
    /// Unsupported or corrupt stream
    Decode,
    /// Playback refused pending a user gesture
    InteractionRequired,
    /// Anything else
    Other,
}

/// Events a live audio resource reports back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Duration became known
    MetadataLoaded { duration: f64 },
    /// Playback position advanced (seconds)
    TimeUpdate { position: f64 },
    /// Playback stalled waiting for data
    Waiting,
    /// Enough data buffered to resume
    CanPlay,
    /// A media segment finished transferring (manifest sources only)
    SegmentLoaded {
        bytes: u64,
        transfer: std::time::Duration,
        media_seconds: f64,
    },
    /// The active quality variant changed (manifest sources only)
    VariantChanged { index: usize },
    /// Playback reached the end of the track
    Ended,
    /// The resource failed
    Error {
        kind: MediaErrorKind,
        message: String,
    },
}

/// Factory for live audio resources
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    /// Open a resource for `url` and report its events on `events`.
    ///
    /// The returned handle is live until [`AudioHandle::detach`] is called
    /// or the handle is dropped; the engine guarantees at most one handle
    /// exists at a time.
    async fn open(
        &self,
        url: &str,
        events: mpsc::Sender<MediaEvent>,
    ) -> Result<Box<dyn AudioHandle>>;
}

/// Control surface of one live audio resource
#[async_trait]
pub trait AudioHandle: Send + Sync {
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Seek to an absolute position in seconds
    async fn seek(&self, position: f64) -> Result<()>;

    /// Apply a volume level in `[0, 1]`
    async fn set_volume(&self, level: f32) -> Result<()>;

    /// Request a quality-variant switch at the next segment boundary
    /// (no-op for non-manifest resources)
    async fn select_variant(&self, index: usize) -> Result<()>;

    /// Attempt in-place recovery after a decode error
    async fn recover(&self) -> Result<()>;

    /// Stop, detach, and release buffers. Idempotent.
    async fn detach(&self) -> Result<()>;
}
