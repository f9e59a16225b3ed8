//! External segment encoder
//!
//! One encode step per quality variant: input file in, per-variant media
//! manifest plus segment files out. The pipeline talks to the trait so
//! tests run without ffmpeg installed.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use resona_common::ladder::QualityVariant;

use crate::error::{Error, Result};

/// One variant encode request
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Source audio file
    pub source: PathBuf,
    /// Song artifact directory the outputs land in
    pub out_dir: PathBuf,
    /// Rung to encode
    pub variant: QualityVariant,
    /// Segment duration in seconds
    pub segment_seconds: u32,
}

impl EncodeJob {
    /// Path of the media manifest this job produces
    pub fn playlist_path(&self) -> PathBuf {
        self.out_dir.join(self.variant.playlist_name())
    }

    /// Segment filename pattern (`320k_%03d.ts`)
    pub fn segment_pattern(&self) -> PathBuf {
        self.out_dir.join(format!("{}_%03d.ts", self.variant.name))
    }
}

/// Encode-and-segment step for one quality variant
#[async_trait]
pub trait SegmentEncoder: Send + Sync + 'static {
    /// Run the encode. On success the job's media manifest and segments
    /// exist under `job.out_dir`.
    async fn encode(&self, job: &EncodeJob) -> Result<()>;
}

/// ffmpeg-backed encoder
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl SegmentEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<()> {
        let playlist = job.playlist_path();
        debug!(
            variant = %job.variant.name,
            source = %job.source.display(),
            "spawning ffmpeg"
        );

        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(&job.source)
            .arg("-vn")
            .arg("-c:a")
            .arg(job.variant.format.encoder_name())
            .arg("-b:a")
            .arg(job.variant.bitrate.to_string())
            .arg("-f")
            .arg("hls")
            .arg("-hls_time")
            .arg(job.segment_seconds.to_string())
            .arg("-hls_list_size")
            .arg("0")
            .arg("-hls_playlist_type")
            .arg("vod")
            .arg("-hls_segment_filename")
            .arg(job.segment_pattern())
            .arg(&playlist)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Transcode {
                variant: job.variant.name.clone(),
                detail: format!("failed to spawn {}: {e}", self.binary),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // The interesting part of ffmpeg's stderr is the tail
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Transcode {
                variant: job.variant.name.clone(),
                detail: format!("ffmpeg exited with {}: {tail}", output.status),
            });
        }

        if !playlist.exists() {
            return Err(Error::Transcode {
                variant: job.variant.name.clone(),
                detail: "ffmpeg succeeded but wrote no media manifest".to_string(),
            });
        }
        Ok(())
    }
}
