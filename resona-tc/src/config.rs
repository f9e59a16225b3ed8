//! Transcoder service configuration
//!
//! Bootstrap settings come from a TOML file; every field has a built-in
//! default so an empty file (or no file) yields a working development
//! setup. CLI flags override the file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use resona_common::ladder::{default_ladder, QualityVariant};

use crate::error::{Error, Result};

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory for HLS artifacts (`{hls_root}/{song_id}/...`)
    #[serde(default = "default_hls_root")]
    pub hls_root: PathBuf,

    /// Root directory for DASH artifacts
    #[serde(default = "default_dash_root")]
    pub dash_root: PathBuf,

    /// Whether to emit a DASH manifest alongside the HLS ladder
    #[serde(default = "default_true")]
    pub emit_dash: bool,

    /// Segment duration in seconds
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: u32,

    /// Cap on concurrently running encode processes across all jobs
    #[serde(default = "default_max_concurrent_encodes")]
    pub max_concurrent_encodes: usize,

    /// Artifact retention window in hours; older artifacts are swept
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Minutes between cleanup sweeps
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,

    /// ffmpeg binary to invoke
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,

    /// Quality ladder, encoded in configuration order
    #[serde(default = "default_ladder")]
    pub ladder: Vec<QualityVariant>,
}

fn default_port() -> u16 {
    5750
}

fn default_hls_root() -> PathBuf {
    PathBuf::from("data/streaming/hls")
}

fn default_dash_root() -> PathBuf {
    PathBuf::from("data/streaming/dash")
}

fn default_true() -> bool {
    true
}

fn default_segment_seconds() -> u32 {
    10
}

fn default_max_concurrent_encodes() -> usize {
    4
}

fn default_retention_hours() -> u64 {
    24 * 30
}

fn default_cleanup_interval_minutes() -> u64 {
    60
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("default config must deserialize")
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: &PathBuf) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let config: Config =
            toml::from_str(&text).map_err(|e| Error::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ladder.is_empty() {
            return Err(Error::Config("quality ladder is empty".to_string()));
        }
        if self.segment_seconds == 0 {
            return Err(Error::Config("segment_seconds must be positive".to_string()));
        }
        if self.max_concurrent_encodes == 0 {
            return Err(Error::Config(
                "max_concurrent_encodes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes * 60)
    }
}
