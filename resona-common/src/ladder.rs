//! Quality-ladder configuration shared by the transcoder and the player
//!
//! The ladder is a fixed, ordered set of bitrate/format rungs. The
//! transcoder encodes one variant per rung; clients use
//! [`select_initial`] to pick a starting rung before adaptive selection
//! takes over.

use serde::{Deserialize, Serialize};

/// Bandwidth below which clients start on the lowest rung (bits/second)
pub const LOW_BANDWIDTH_BPS: u64 = 192_000;

/// Bandwidth below which clients start on the middle rung (bits/second)
pub const MID_BANDWIDTH_BPS: u64 = 768_000;

/// Audio codec used for a quality variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Aac,
    Vorbis,
    Flac,
}

impl AudioFormat {
    /// RFC 6381 codec tag advertised in the master manifest
    pub fn codec_tag(&self) -> &'static str {
        match self {
            AudioFormat::Aac => "mp4a.40.2",
            AudioFormat::Vorbis => "vorbis",
            AudioFormat::Flac => "fLaC",
        }
    }

    /// ffmpeg encoder name for this format
    pub fn encoder_name(&self) -> &'static str {
        match self {
            AudioFormat::Aac => "aac",
            AudioFormat::Vorbis => "libvorbis",
            AudioFormat::Flac => "flac",
        }
    }
}

/// One rung of the quality ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVariant {
    /// Rung name, used in artifact filenames and manual quality selection
    pub name: String,
    /// Encoded bitrate in bits per second
    pub bitrate: u32,
    /// Codec for this rung
    pub format: AudioFormat,
}

impl QualityVariant {
    pub fn new(name: impl Into<String>, bitrate: u32, format: AudioFormat) -> Self {
        Self {
            name: name.into(),
            bitrate,
            format,
        }
    }

    /// Media-manifest filename for this rung
    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.name)
    }
}

/// Default ladder used when the transcoder config does not override it
pub fn default_ladder() -> Vec<QualityVariant> {
    vec![
        QualityVariant::new("64k", 64_000, AudioFormat::Aac),
        QualityVariant::new("128k", 128_000, AudioFormat::Aac),
        QualityVariant::new("320k", 320_000, AudioFormat::Aac),
        QualityVariant::new("1411k", 1_411_000, AudioFormat::Flac),
    ]
}

/// Pick the starting rung for a client before adaptive selection engages.
///
/// Below [`LOW_BANDWIDTH_BPS`] the lowest rung is used; below
/// [`MID_BANDWIDTH_BPS`] or on constrained devices the middle rung;
/// otherwise the highest rung. Returns the index into `ladder`.
pub fn select_initial(
    ladder: &[QualityVariant],
    bandwidth_bps: Option<u64>,
    constrained_device: bool,
) -> usize {
    select_initial_by_count(ladder.len(), bandwidth_bps, constrained_device)
}

/// Same heuristic for callers that only know how many rungs exist
/// (e.g. a ladder parsed from a master manifest)
pub fn select_initial_by_count(
    rungs: usize,
    bandwidth_bps: Option<u64>,
    constrained_device: bool,
) -> usize {
    if rungs == 0 {
        return 0;
    }
    let mid = rungs / 2;
    let highest = rungs - 1;
    match bandwidth_bps {
        Some(bps) if bps < LOW_BANDWIDTH_BPS => 0,
        Some(bps) if bps < MID_BANDWIDTH_BPS => mid,
        _ if constrained_device => mid,
        // No measurement on an unconstrained device: start low and let
        // adaptive selection climb
        None => 0,
        Some(_) => highest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_tags() {
        assert_eq!(AudioFormat::Aac.codec_tag(), "mp4a.40.2");
        assert_eq!(AudioFormat::Flac.codec_tag(), "fLaC");
        assert_eq!(AudioFormat::Vorbis.codec_tag(), "vorbis");
    }

    #[test]
    fn initial_rung_thresholds() {
        let ladder = default_ladder();

        // Below the low threshold: lowest rung
        assert_eq!(select_initial(&ladder, Some(100_000), false), 0);
        // Between thresholds: middle rung
        assert_eq!(select_initial(&ladder, Some(500_000), false), 2);
        // Fast but constrained: middle rung
        assert_eq!(select_initial(&ladder, Some(5_000_000), true), 2);
        // Fast and unconstrained: highest rung
        assert_eq!(select_initial(&ladder, Some(5_000_000), false), 3);
        // Unknown bandwidth: start low
        assert_eq!(select_initial(&ladder, None, false), 0);
    }

    #[test]
    fn empty_ladder_does_not_panic() {
        assert_eq!(select_initial(&[], Some(1_000_000), false), 0);
    }
}
