//! Adaptive streaming controller
//!
//! Layered on the playback engine when a source is a segmented manifest.
//! Owns the quality ladder parsed from the master manifest, a throughput
//! estimator, and the `{Loading, Idle, Buffering, Error}` state machine.
//! The controller only *decides*; attaching and switching variants is the
//! engine's job, and diagnostics are read-only outputs.

use std::collections::VecDeque;
use std::time::Duration;

use resona_common::hls::{MasterPlaylist, VariantRef};
use serde::Serialize;
use tracing::{debug, warn};

/// Streaming phases visible to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    Loading,
    Idle,
    Buffering,
    Error,
}

/// Quality-selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    /// Pick the highest rung the measured bandwidth supports
    Auto,
    /// Pinned to a rung by the user
    Manual(usize),
}

/// What the engine should do after a reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-fetch the master manifest and resume
    ReloadManifest,
    /// Ask the handle to recover in place
    RecoverMedia,
    /// Re-attach using the raw fallback URL
    FallbackToRaw,
    /// Give up; surface the error state
    Fatal,
}

/// Read-only per-session diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamingSession {
    pub current_quality_index: usize,
    pub bandwidth_estimate: Option<u64>,
    pub buffer_seconds: f64,
    pub dropped_segments: u64,
}

/// Tuning knobs for the controller
#[derive(Debug, Clone)]
pub struct AbrOptions {
    /// Manifest reloads attempted before a network error becomes fatal
    pub max_manifest_retries: u32,
    /// Throughput estimate is divided by this before rung comparison
    pub safety_factor: f64,
    /// Device/player cap on the selected bandwidth, if any
    pub max_bandwidth_cap: Option<u64>,
    /// Sliding window length for the throughput estimator
    pub estimator_window: usize,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            max_manifest_retries: 3,
            safety_factor: 1.2,
            max_bandwidth_cap: None,
            estimator_window: 8,
        }
    }
}

/// Sliding-window harmonic-mean throughput estimator
#[derive(Debug, Default)]
pub struct BandwidthEstimator {
    window: usize,
    samples: VecDeque<(u64, Duration)>,
}

impl BandwidthEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn push_sample(&mut self, bytes: u64, transfer: Duration) {
        if transfer.is_zero() {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back((bytes, transfer));
    }

    /// Estimated throughput in bits per second, None until a sample exists
    pub fn estimate_bps(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let bits: f64 = self.samples.iter().map(|(b, _)| *b as f64 * 8.0).sum();
        let secs: f64 = self.samples.iter().map(|(_, d)| d.as_secs_f64()).sum();
        if secs <= 0.0 {
            return None;
        }
        Some((bits / secs) as u64)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Adaptive bitrate controller for one playback session
pub struct AdaptiveController {
    opts: AbrOptions,
    ladder: Vec<VariantRef>,
    phase: StreamPhase,
    mode: QualityMode,
    /// Manual selection waiting for the next segment boundary
    pending: Option<usize>,
    current: usize,
    estimator: BandwidthEstimator,
    buffer_seconds: f64,
    dropped_segments: u64,
    manifest_retries_left: u32,
    decode_recovery_used: bool,
}

impl AdaptiveController {
    /// Build a controller from a parsed master manifest.
    ///
    /// The session starts in `Idle` (the manifest is already parsed) on
    /// the given initial rung.
    pub fn new(master: &MasterPlaylist, initial_index: usize, opts: AbrOptions) -> Self {
        let ladder = master.variants.clone();
        let current = initial_index.min(ladder.len().saturating_sub(1));
        let estimator = BandwidthEstimator::new(opts.estimator_window);
        let manifest_retries_left = opts.max_manifest_retries;
        Self {
            opts,
            ladder,
            phase: StreamPhase::Idle,
            mode: QualityMode::Auto,
            pending: None,
            current,
            estimator,
            buffer_seconds: 0.0,
            dropped_segments: 0,
            manifest_retries_left,
            decode_recovery_used: false,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Rung names in ladder order
    pub fn available_qualities(&self) -> Vec<String> {
        self.ladder.iter().map(|v| v.name().to_string()).collect()
    }

    /// Name of the rung currently playing
    pub fn current_quality(&self) -> &str {
        self.ladder
            .get(self.current)
            .map(VariantRef::name)
            .unwrap_or("")
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// URI of the media manifest for the current rung
    pub fn current_uri(&self) -> Option<&str> {
        self.ladder.get(self.current).map(|v| v.uri.as_str())
    }

    /// Pin quality to the named rung.
    ///
    /// Takes effect at the next segment boundary, never mid-segment.
    pub fn set_quality(&mut self, name: &str) -> bool {
        match self.ladder.iter().position(|v| v.name() == name) {
            Some(index) => {
                self.mode = QualityMode::Manual(index);
                self.pending = Some(index);
                debug!(quality = name, index, "manual quality override queued");
                true
            }
            None => {
                warn!(quality = name, "unknown quality rung");
                false
            }
        }
    }

    /// Return to automatic selection
    pub fn set_auto(&mut self) {
        self.mode = QualityMode::Auto;
        self.pending = None;
    }

    /// A segment finished transferring: feed the estimator and account
    /// the buffered media it contributed.
    pub fn on_segment_loaded(&mut self, bytes: u64, transfer: Duration, media_seconds: f64) {
        self.estimator.push_sample(bytes, transfer);
        self.buffer_seconds += media_seconds;
    }

    /// Playback consumed media from the buffer
    pub fn on_playback_advanced(&mut self, seconds: f64) {
        self.buffer_seconds = (self.buffer_seconds - seconds).max(0.0);
    }

    /// Segment boundary reached: apply pending manual override or the
    /// automatic decision. Returns the target rung index; the engine
    /// switches the handle when it differs from the confirmed rung.
    pub fn on_segment_boundary(&mut self) -> usize {
        if let Some(index) = self.pending.take() {
            return index;
        }
        match self.mode {
            QualityMode::Manual(index) => index,
            QualityMode::Auto => self.auto_target(),
        }
    }

    /// The backend confirmed a variant switch
    pub fn confirm_variant(&mut self, index: usize) {
        if index < self.ladder.len() {
            self.current = index;
        }
    }

    /// Highest rung whose bandwidth the adjusted estimate supports,
    /// bounded by the configured cap; lowest rung without an estimate.
    fn auto_target(&self) -> usize {
        let Some(estimate) = self.estimator.estimate_bps() else {
            return self.current;
        };
        let adjusted = (estimate as f64 / self.opts.safety_factor) as u64;
        let budget = match self.opts.max_bandwidth_cap {
            Some(cap) => adjusted.min(cap),
            None => adjusted,
        };
        let mut target = 0;
        let mut best_bandwidth = 0;
        for (i, v) in self.ladder.iter().enumerate() {
            if v.bandwidth <= budget && v.bandwidth >= best_bandwidth {
                best_bandwidth = v.bandwidth;
                target = i;
            }
        }
        target
    }

    /// Network stall: enter `Buffering` (a transient indicator, not an error)
    pub fn on_stall(&mut self) {
        if self.phase != StreamPhase::Error {
            self.phase = StreamPhase::Buffering;
        }
    }

    /// Buffer replenished: back to `Idle`
    pub fn on_buffer_replenished(&mut self) {
        if self.phase == StreamPhase::Buffering || self.phase == StreamPhase::Loading {
            self.phase = StreamPhase::Idle;
        }
    }

    /// A segment failed to load and was skipped
    pub fn on_segment_dropped(&mut self) {
        self.dropped_segments += 1;
    }

    /// Fatal network error: reload the manifest while retries remain
    pub fn on_network_error(&mut self) -> RecoveryAction {
        if self.manifest_retries_left > 0 {
            self.manifest_retries_left -= 1;
            self.phase = StreamPhase::Loading;
            RecoveryAction::ReloadManifest
        } else {
            self.phase = StreamPhase::Error;
            RecoveryAction::Fatal
        }
    }

    /// Manifest reload completed; retry budget stays spent
    pub fn on_manifest_reloaded(&mut self, master: &MasterPlaylist) {
        self.ladder = master.variants.clone();
        self.current = self.current.min(self.ladder.len().saturating_sub(1));
        self.phase = StreamPhase::Idle;
    }

    /// Fatal decode error: one in-place recovery, then raw fallback when
    /// available, then the error state.
    pub fn on_decode_error(&mut self, raw_fallback_available: bool) -> RecoveryAction {
        if !self.decode_recovery_used {
            self.decode_recovery_used = true;
            RecoveryAction::RecoverMedia
        } else if raw_fallback_available {
            RecoveryAction::FallbackToRaw
        } else {
            self.phase = StreamPhase::Error;
            RecoveryAction::Fatal
        }
    }

    pub fn diagnostics(&self) -> StreamingSession {
        StreamingSession {
            current_quality_index: self.current,
            bandwidth_estimate: self.estimator.estimate_bps(),
            buffer_seconds: self.buffer_seconds,
            dropped_segments: self.dropped_segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterPlaylist {
        MasterPlaylist::parse(
            "#EXTM3U\n\
             #EXT-X-VERSION:3\n\
             #EXT-X-STREAM-INF:BANDWIDTH=128000,CODECS=\"mp4a.40.2\"\n\
             128k.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=320000,CODECS=\"mp4a.40.2\"\n\
             320k.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=1411000,CODECS=\"fLaC\"\n\
             1411k.m3u8\n",
        )
        .unwrap()
    }

    fn controller() -> AdaptiveController {
        AdaptiveController::new(&master(), 0, AbrOptions::default())
    }

    #[test]
    fn exposes_ladder_from_manifest() {
        let c = controller();
        assert_eq!(c.available_qualities(), vec!["128k", "320k", "1411k"]);
        assert_eq!(c.current_quality(), "128k");
        assert_eq!(c.phase(), StreamPhase::Idle);
    }

    #[test]
    fn manual_quality_applies_at_segment_boundary_only() {
        let mut c = controller();
        assert!(c.set_quality("320k"));

        // Still on the old rung until a boundary is reached
        assert_eq!(c.current_quality(), "128k");

        let target = c.on_segment_boundary();
        assert_eq!(target, 1);
        // ...and current only moves once the backend confirms the switch
        assert_eq!(c.current_quality(), "128k");
        c.confirm_variant(target);
        assert_eq!(c.current_quality(), "320k");
    }

    #[test]
    fn unknown_quality_is_rejected() {
        let mut c = controller();
        assert!(!c.set_quality("999k"));
        assert_eq!(c.on_segment_boundary(), 0);
    }

    #[test]
    fn auto_picks_highest_supported_rung() {
        let mut c = controller();

        // ~2 Mbps measured: even adjusted by the safety factor, the top
        // rung (1411k) fits
        c.on_segment_loaded(250_000, Duration::from_secs(1), 10.0);
        let target = c.on_segment_boundary();
        assert_eq!(target, 2);

        // ~400 kbps measured: only 128k and 320k fit after adjustment
        let mut slow = controller();
        slow.on_segment_loaded(50_000, Duration::from_secs(1), 10.0);
        assert_eq!(slow.on_segment_boundary(), 1);
    }

    #[test]
    fn bandwidth_cap_limits_auto_selection() {
        let opts = AbrOptions {
            max_bandwidth_cap: Some(200_000),
            ..AbrOptions::default()
        };
        let mut c = AdaptiveController::new(&master(), 0, opts);
        c.on_segment_loaded(2_000_000, Duration::from_secs(1), 10.0);
        assert_eq!(c.on_segment_boundary(), 0);
    }

    #[test]
    fn no_estimate_keeps_current_rung() {
        let mut c = controller();
        assert_eq!(c.on_segment_boundary(), 0);
    }

    #[test]
    fn stall_and_replenish_transitions() {
        let mut c = controller();
        c.on_stall();
        assert_eq!(c.phase(), StreamPhase::Buffering);
        c.on_buffer_replenished();
        assert_eq!(c.phase(), StreamPhase::Idle);
    }

    #[test]
    fn network_errors_reload_until_retries_exhausted() {
        let mut c = controller();
        let m = master();

        for _ in 0..3 {
            assert_eq!(c.on_network_error(), RecoveryAction::ReloadManifest);
            assert_eq!(c.phase(), StreamPhase::Loading);
            c.on_manifest_reloaded(&m);
            assert_eq!(c.phase(), StreamPhase::Idle);
        }

        assert_eq!(c.on_network_error(), RecoveryAction::Fatal);
        assert_eq!(c.phase(), StreamPhase::Error);
    }

    #[test]
    fn decode_error_recovers_once_then_falls_back() {
        let mut c = controller();
        assert_eq!(c.on_decode_error(true), RecoveryAction::RecoverMedia);
        assert_eq!(c.on_decode_error(true), RecoveryAction::FallbackToRaw);

        let mut no_fallback = controller();
        assert_eq!(
            no_fallback.on_decode_error(false),
            RecoveryAction::RecoverMedia
        );
        assert_eq!(no_fallback.on_decode_error(false), RecoveryAction::Fatal);
        assert_eq!(no_fallback.phase(), StreamPhase::Error);
    }

    #[test]
    fn diagnostics_track_buffer_and_drops() {
        let mut c = controller();
        c.on_segment_loaded(125_000, Duration::from_secs(1), 10.0);
        c.on_segment_loaded(125_000, Duration::from_secs(1), 10.0);
        c.on_playback_advanced(4.0);
        c.on_segment_dropped();

        let d = c.diagnostics();
        assert_eq!(d.buffer_seconds, 16.0);
        assert_eq!(d.dropped_segments, 1);
        // 125 kB over 1 s is 1 Mbps
        assert_eq!(d.bandwidth_estimate, Some(1_000_000));
    }

    #[test]
    fn estimator_window_slides() {
        let mut e = BandwidthEstimator::new(2);
        e.push_sample(1_000, Duration::from_secs(1));
        e.push_sample(1_000, Duration::from_secs(1));
        e.push_sample(100_000, Duration::from_secs(1));
        // Oldest sample evicted; estimate reflects the last two
        let est = e.estimate_bps().unwrap();
        assert_eq!(est, (1_000 + 100_000) * 8 / 2);

        e.reset();
        assert_eq!(e.estimate_bps(), None);
    }
}
