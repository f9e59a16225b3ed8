//! Transcoding pipeline
//!
//! Converts one source audio file into the configured quality ladder:
//! every rung is encoded concurrently under a global process cap, and the
//! master manifest is written only after all rungs succeeded, so a
//! half-transcoded song never becomes visible to clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use resona_common::hls::{MasterPlaylist, MediaPlaylist, VariantRef};

use crate::config::Config;
use crate::encoder::{EncodeJob, SegmentEncoder};
use crate::error::{Error, Result};

/// Per-variant outcome of a finished transcode job
#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub name: String,
    pub bitrate: u32,
    pub segment_count: usize,
    pub media_seconds: f64,
    pub output_bytes: u64,
}

/// Outcome of one whole-song transcode
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeReport {
    pub song_id: String,
    pub variants: Vec<VariantReport>,
}

impl TranscodeReport {
    /// Media duration of the song, taken from the first rung
    pub fn media_seconds(&self) -> f64 {
        self.variants.first().map(|v| v.media_seconds).unwrap_or(0.0)
    }
}

/// Song ids and filenames become path components; refuse anything that
/// could escape the artifact roots.
pub fn validate_component(value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0')
    {
        return Err(Error::InvalidPath(value.to_string()));
    }
    Ok(())
}

/// Whole-song transcoding service
pub struct TranscodePipeline {
    encoder: Arc<dyn SegmentEncoder>,
    config: Arc<Config>,
    /// Global cap on concurrent encode processes across all jobs
    encode_permits: Arc<Semaphore>,
}

impl TranscodePipeline {
    pub fn new(encoder: Arc<dyn SegmentEncoder>, config: Arc<Config>) -> Self {
        let encode_permits = Arc::new(Semaphore::new(config.max_concurrent_encodes));
        Self {
            encoder,
            config,
            encode_permits,
        }
    }

    /// Transcode `source` into the full ladder for `song_id`.
    ///
    /// Replaces any previously published artifacts for the song. On any
    /// variant failure the song's artifact directory is removed and the
    /// first failure is returned; nothing partial stays published.
    pub async fn transcode_song(&self, song_id: &str, source: &Path) -> Result<TranscodeReport> {
        validate_component(song_id)?;
        let out_dir = self.config.hls_root.join(song_id);

        remove_dir_if_present(&out_dir).await?;
        tokio::fs::create_dir_all(&out_dir).await?;
        info!(song_id, source = %source.display(), rungs = self.config.ladder.len(), "transcode started");

        let mut tasks = JoinSet::new();
        for variant in &self.config.ladder {
            let job = EncodeJob {
                source: source.to_path_buf(),
                out_dir: out_dir.clone(),
                variant: variant.clone(),
                segment_seconds: self.config.segment_seconds,
            };
            let encoder = Arc::clone(&self.encoder);
            let permits = Arc::clone(&self.encode_permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|_| Error::Transcode {
                    variant: job.variant.name.clone(),
                    detail: "encode pool closed".to_string(),
                })?;
                encoder.encode(&job).await
            });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(Error::Transcode {
                    variant: "unknown".to_string(),
                    detail: format!("encode task panicked: {e}"),
                })
            });
            if let Err(e) = result {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            warn!(song_id, error = %e, "transcode aborted, removing partial artifacts");
            remove_dir_if_present(&out_dir).await?;
            return Err(e);
        }

        let report = self.collect_report(song_id, &out_dir).await?;

        // Master manifest is the publication marker: written last, after
        // every variant is complete on disk
        let master = self.master_playlist();
        tokio::fs::write(out_dir.join("master.m3u8"), master.to_m3u8()).await?;

        if self.config.emit_dash {
            self.publish_dash(song_id, &report).await?;
        }

        info!(
            song_id,
            media_seconds = report.media_seconds(),
            "transcode completed"
        );
        Ok(report)
    }

    /// Master playlist over the configured ladder, in configuration order
    pub fn master_playlist(&self) -> MasterPlaylist {
        MasterPlaylist {
            variants: self
                .config
                .ladder
                .iter()
                .map(|v| VariantRef {
                    bandwidth: v.bitrate as u64,
                    codecs: v.format.codec_tag().to_string(),
                    uri: v.playlist_name(),
                })
                .collect(),
        }
    }

    /// Read back each rung's media manifest and account its artifacts
    async fn collect_report(&self, song_id: &str, out_dir: &Path) -> Result<TranscodeReport> {
        let mut variants = Vec::with_capacity(self.config.ladder.len());
        for variant in &self.config.ladder {
            let playlist_path = out_dir.join(variant.playlist_name());
            let text = tokio::fs::read_to_string(&playlist_path).await?;
            let media = MediaPlaylist::parse(&text)?;

            let mut output_bytes = tokio::fs::metadata(&playlist_path).await?.len();
            for segment in &media.segments {
                validate_component(&segment.uri)?;
                output_bytes += tokio::fs::metadata(out_dir.join(&segment.uri)).await?.len();
            }

            variants.push(VariantReport {
                name: variant.name.clone(),
                bitrate: variant.bitrate,
                segment_count: media.segments.len(),
                media_seconds: media.total_duration(),
                output_bytes,
            });
        }
        Ok(TranscodeReport {
            song_id: song_id.to_string(),
            variants,
        })
    }

    async fn publish_dash(&self, song_id: &str, report: &TranscodeReport) -> Result<()> {
        let dash_dir = self.config.dash_root.join(song_id);
        tokio::fs::create_dir_all(&dash_dir).await?;
        let mpd = crate::dash::build_mpd(
            &self.config.ladder,
            report.media_seconds(),
            self.config.segment_seconds,
        );
        tokio::fs::write(dash_dir.join("manifest.mpd"), mpd).await?;
        Ok(())
    }

    /// Whether a completed ladder is published for the song
    pub async fn is_published(&self, song_id: &str) -> bool {
        validate_component(song_id).is_ok()
            && self
                .config
                .hls_root
                .join(song_id)
                .join("master.m3u8")
                .exists()
    }
}

async fn remove_dir_if_present(dir: &PathBuf) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
