//! Offline download manager
//!
//! Fetches a track's bytes with progress reporting, stores the finished
//! blob in the local cache store keyed by track id, and tracks per-track
//! download state. Multiple different tracks may download concurrently;
//! two concurrent downloads of the same track id collapse into one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::{Pool, Sqlite};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use resona_common::events::{DownloadEvent, DownloadProgress, DownloadStatus};
use resona_common::TrackSource;

use crate::cache::{BlobHandle, CacheStore};
use crate::db::settings as db_settings;
use crate::error::Result;
use crate::fetch::Fetcher;

/// Per-track download state
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub song_id: String,
    pub status: DownloadStatus,
    /// Percent complete while downloading, 0.0 when indeterminate
    pub progress: f32,
    pub blob: Option<BlobHandle>,
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl DownloadRecord {
    fn idle(song_id: &str) -> Self {
        Self {
            song_id: song_id.to_string(),
            status: DownloadStatus::Idle,
            progress: 0.0,
            blob: None,
            downloaded_at: None,
        }
    }
}

/// Offline download manager
pub struct DownloadManager {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn CacheStore>,
    db: Pool<Sqlite>,
    records: RwLock<HashMap<String, DownloadRecord>>,
    /// In-flight downloads; guarded check-and-insert is what makes
    /// `download_song` deduplicate
    inflight: Mutex<HashMap<String, CancellationToken>>,
    event_tx: broadcast::Sender<DownloadEvent>,
}

impl DownloadManager {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<dyn CacheStore>, db: Pool<Sqlite>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            fetcher,
            cache,
            db,
            records: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    /// Restore completed-download records from the database, dropping rows
    /// whose blob has disappeared from the cache store.
    pub async fn restore(&self) -> Result<()> {
        let rows = db_settings::list_downloads(&self.db).await?;
        let mut records = self.records.write().await;
        for row in rows {
            if self.cache.contains(&row.song_id).await {
                records.insert(
                    row.song_id.clone(),
                    DownloadRecord {
                        song_id: row.song_id,
                        status: DownloadStatus::Completed,
                        progress: 100.0,
                        blob: None,
                        downloaded_at: Some(row.downloaded_at),
                    },
                );
            } else {
                warn!(song_id = %row.song_id, "download record without blob, dropping");
                db_settings::remove_download(&self.db, &row.song_id).await?;
            }
        }
        Ok(())
    }

    /// Subscribe to progress and state-change events
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.event_tx.subscribe()
    }

    /// Download a track into the offline cache.
    ///
    /// No-op if the track is already completed or currently downloading.
    /// On transport error the record moves to `Error` and any blob from an
    /// earlier successful download is left untouched.
    pub async fn download_song(&self, track: &TrackSource) -> Result<DownloadStatus> {
        let song_id = track.id.clone();

        let token = {
            let mut inflight = self.inflight.lock().await;
            if inflight.contains_key(&song_id) {
                debug!(song_id, "download already in flight");
                return Ok(DownloadStatus::Downloading);
            }
            if self.status(&song_id).await == DownloadStatus::Completed {
                debug!(song_id, "already downloaded");
                return Ok(DownloadStatus::Completed);
            }
            let token = CancellationToken::new();
            inflight.insert(song_id.clone(), token.clone());
            token
        };

        self.set_record(DownloadRecord {
            song_id: song_id.clone(),
            status: DownloadStatus::Downloading,
            progress: 0.0,
            blob: None,
            downloaded_at: None,
        })
        .await;

        let result = self.run_download(track, &token).await;
        let outcome = self.commit_outcome(&song_id, result).await;
        // Only now may a second caller re-enter; the final record is visible
        self.inflight.lock().await.remove(&song_id);
        outcome
    }

    /// Write the terminal record for a finished download attempt
    async fn commit_outcome(
        &self,
        song_id: &str,
        result: Result<Option<BlobHandle>>,
    ) -> Result<DownloadStatus> {
        let blob = match result {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                // Cancelled: partial bytes discarded, record back to idle
                self.set_record(DownloadRecord::idle(song_id)).await;
                info!(song_id, "download cancelled");
                return Ok(DownloadStatus::Idle);
            }
            Err(e) => {
                warn!(song_id, error = %e, "download failed");
                self.set_record(DownloadRecord {
                    song_id: song_id.to_string(),
                    status: DownloadStatus::Error,
                    progress: 0.0,
                    blob: None,
                    downloaded_at: None,
                })
                .await;
                return Err(e);
            }
        };

        let now = Utc::now();
        if let Err(e) = db_settings::record_download(&self.db, song_id, blob.len, now).await {
            warn!(song_id, error = %e, "could not persist download record");
            self.set_record(DownloadRecord {
                song_id: song_id.to_string(),
                status: DownloadStatus::Error,
                progress: 0.0,
                blob: None,
                downloaded_at: None,
            })
            .await;
            return Err(e);
        }
        self.set_record(DownloadRecord {
            song_id: song_id.to_string(),
            status: DownloadStatus::Completed,
            progress: 100.0,
            blob: Some(blob),
            downloaded_at: Some(now),
        })
        .await;
        info!(song_id, "download completed");
        Ok(DownloadStatus::Completed)
    }

    /// Streamed fetch; Ok(None) means the download was cancelled
    async fn run_download(
        &self,
        track: &TrackSource,
        token: &CancellationToken,
    ) -> Result<Option<BlobHandle>> {
        let body = self.fetcher.fetch_stream(&track.media_url).await?;
        let total = body.content_length;
        let mut stream = body.stream;
        let mut buf: Vec<u8> = Vec::with_capacity(total.unwrap_or(0) as usize);

        while let Some(chunk) = stream.next().await {
            if token.is_cancelled() {
                return Ok(None);
            }
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);

            let progress = DownloadProgress::new(buf.len() as u64, total);
            self.update_progress(&track.id, progress).await;
        }

        if token.is_cancelled() {
            return Ok(None);
        }
        let blob = self.cache.put(&track.id, buf.into()).await?;
        Ok(Some(blob))
    }

    /// Abort an in-flight download; the record returns to `Idle`
    pub async fn cancel_download(&self, song_id: &str) {
        if let Some(token) = self.inflight.lock().await.get(song_id) {
            token.cancel();
        }
    }

    /// Remove the blob and the record for a track
    pub async fn delete_song(&self, song_id: &str) -> Result<()> {
        // A concurrent download of the same track keeps its own state;
        // cancel it rather than racing it.
        self.cancel_download(song_id).await;
        self.cache.delete(song_id).await?;
        db_settings::remove_download(&self.db, song_id).await?;
        self.records.write().await.remove(song_id);
        let _ = self.event_tx.send(DownloadEvent::StateChanged {
            song_id: song_id.to_string(),
            status: DownloadStatus::Idle,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Whether a completed blob exists for the track
    pub async fn is_downloaded(&self, song_id: &str) -> bool {
        self.status(song_id).await == DownloadStatus::Completed
            && self.cache.contains(song_id).await
    }

    /// Total bytes held by the offline cache
    pub async fn storage_size(&self) -> Result<u64> {
        self.cache.size().await
    }

    /// Current status for a track (`Idle` when unknown)
    pub async fn status(&self, song_id: &str) -> DownloadStatus {
        self.records
            .read()
            .await
            .get(song_id)
            .map(|r| r.status)
            .unwrap_or(DownloadStatus::Idle)
    }

    /// Copy of the full record for a track
    pub async fn record(&self, song_id: &str) -> Option<DownloadRecord> {
        self.records.read().await.get(song_id).cloned()
    }

    /// One-shot "download to local disk" path.
    ///
    /// Streams the same bytes to `dest`, reporting progress through the
    /// callback. Does not touch the offline cache or the records.
    pub async fn save_to_disk<F>(
        &self,
        track: &TrackSource,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<u64>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let body = self.fetcher.fetch_stream(&track.media_url).await?;
        let total = body.content_length;
        let mut stream = body.stream;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            on_progress(DownloadProgress::new(written, total));
        }
        file.flush().await?;
        Ok(written)
    }

    async fn set_record(&self, record: DownloadRecord) {
        let song_id = record.song_id.clone();
        let status = record.status;
        self.records.write().await.insert(song_id.clone(), record);
        let _ = self.event_tx.send(DownloadEvent::StateChanged {
            song_id,
            status,
            timestamp: Utc::now(),
        });
    }

    async fn update_progress(&self, song_id: &str, progress: DownloadProgress) {
        if let Some(record) = self.records.write().await.get_mut(song_id) {
            record.progress = progress.percentage.unwrap_or(0.0);
        }
        let _ = self.event_tx.send(DownloadEvent::Progress {
            song_id: song_id.to_string(),
            progress,
        });
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager").finish_non_exhaustive()
    }
}
