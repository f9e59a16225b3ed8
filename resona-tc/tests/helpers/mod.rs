//! Test helper modules for transcoder integration tests
//!
//! Provides a FakeEncoder that writes a plausible media manifest and
//! segment files without invoking ffmpeg, with hooks for failure
//! injection and concurrency observation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use resona_common::hls::{MediaPlaylist, SegmentRef};
use resona_tc::encoder::{EncodeJob, SegmentEncoder};
use resona_tc::error::{Error, Result};

/// Encoder fake producing a fixed-duration segment layout
pub struct FakeEncoder {
    /// Media duration every variant reports
    pub source_seconds: f64,
    /// Variants that fail instead of producing output
    pub fail_variants: Vec<String>,
    /// Artificial encode latency, for concurrency observation
    pub delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeEncoder {
    pub fn new(source_seconds: f64) -> Arc<Self> {
        Arc::new(Self {
            source_seconds,
            fail_variants: Vec::new(),
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn failing(source_seconds: f64, fail_variants: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            source_seconds,
            fail_variants: fail_variants.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn with_delay(source_seconds: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            source_seconds,
            fail_variants: Vec::new(),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    /// Highest number of encodes observed running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Segment layout for a source: full segments plus a shorter tail
pub fn segment_durations(source_seconds: f64, segment_seconds: u32) -> Vec<f64> {
    let full = segment_seconds as f64;
    let mut remaining = source_seconds;
    let mut out = Vec::new();
    while remaining > full {
        out.push(full);
        remaining -= full;
    }
    if remaining > 0.0 {
        out.push(remaining);
    }
    out
}

#[async_trait]
impl SegmentEncoder for FakeEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.run(job).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeEncoder {
    async fn run(&self, job: &EncodeJob) -> Result<()> {
        if self.fail_variants.contains(&job.variant.name) {
            return Err(Error::Transcode {
                variant: job.variant.name.clone(),
                detail: "injected failure".to_string(),
            });
        }

        let mut segments = Vec::new();
        for (i, duration) in segment_durations(self.source_seconds, job.segment_seconds)
            .into_iter()
            .enumerate()
        {
            let uri = format!("{}_{i:03}.ts", job.variant.name);
            tokio::fs::write(job.out_dir.join(&uri), vec![0u8; 188]).await?;
            segments.push(SegmentRef { duration, uri });
        }

        let playlist = MediaPlaylist {
            target_duration: job.segment_seconds,
            segments,
            end_list: true,
        };
        tokio::fs::write(job.playlist_path(), playlist.to_m3u8()).await?;
        Ok(())
    }
}
