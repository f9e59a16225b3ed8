//! Track descriptors handed to the playback core by the catalog surface

use serde::{Deserialize, Serialize};

/// Source description for a single playable track.
///
/// Immutable once created; a track change swaps the whole value via
/// `PlaybackEngine::set_source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSource {
    /// Catalog track id (opaque, owned by the surrounding service)
    pub id: String,
    /// Direct media URL, or master manifest URL when `is_manifest` is true
    pub media_url: String,
    /// Whether `media_url` points at a segmented master manifest
    pub is_manifest: bool,
    /// Duration in seconds as reported by the catalog, if known
    pub duration_hint: Option<f64>,
    /// Raw media URL to fall back to after a fatal decode error,
    /// only meaningful for manifest sources
    pub fallback_url: Option<String>,
}

impl TrackSource {
    /// Direct-URL source (no adaptive streaming layer)
    pub fn direct(id: impl Into<String>, media_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media_url: media_url.into(),
            is_manifest: false,
            duration_hint: None,
            fallback_url: None,
        }
    }

    /// Segmented-manifest source driven through the adaptive controller
    pub fn manifest(id: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media_url: manifest_url.into(),
            is_manifest: true,
            duration_hint: None,
            fallback_url: None,
        }
    }

    /// Attach a raw-URL fallback for decode-error recovery
    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    /// Attach a catalog duration hint (seconds)
    pub fn with_duration_hint(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }
}

/// Full client-facing track contract (display metadata included).
///
/// The playback core only consumes the `TrackSource` projection; the rest
/// is carried for UI surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub media_url: String,
    pub cover_art: Option<String>,
}

impl TrackDescriptor {
    /// Project the playback-relevant fields into a `TrackSource`.
    ///
    /// Manifest detection follows the URL shape: the transcoder publishes
    /// master manifests as `master.m3u8`.
    pub fn to_source(&self) -> TrackSource {
        let is_manifest = self.media_url.ends_with(".m3u8");
        TrackSource {
            id: self.id.clone(),
            media_url: self.media_url.clone(),
            is_manifest,
            duration_hint: self.duration,
            fallback_url: None,
        }
    }
}
