//! Settings and record access for the player database
//!
//! Read/write settings from the settings table (key-value store) plus the
//! resume-position and download-record tables.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Get last-used volume (0.0-1.0)
pub async fn get_volume(db: &Pool<Sqlite>) -> Result<f32> {
    match get_setting::<f32>(db, "volume_level").await? {
        Some(vol) => Ok(vol.clamp(0.0, 1.0)),
        None => {
            // Default volume is 1.0 (full scale)
            set_volume(db, 1.0).await?;
            Ok(1.0)
        }
    }
}

/// Set last-used volume (0.0-1.0)
pub async fn set_volume(db: &Pool<Sqlite>, volume: f32) -> Result<()> {
    let clamped = volume.clamp(0.0, 1.0);
    set_setting(db, "volume_level", clamped).await
}

/// Save the resume position for a track (seconds)
pub async fn save_resume_position(db: &Pool<Sqlite>, song_id: &str, position: f64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO resume_positions (song_id, position_secs, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(song_id) DO UPDATE SET
            position_secs = excluded.position_secs,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(song_id)
    .bind(position)
    .execute(db)
    .await?;
    Ok(())
}

/// Load the saved resume position for a track, if any
pub async fn load_resume_position(db: &Pool<Sqlite>, song_id: &str) -> Result<Option<f64>> {
    let position: Option<f64> =
        sqlx::query_scalar("SELECT position_secs FROM resume_positions WHERE song_id = ?")
            .bind(song_id)
            .fetch_optional(db)
            .await?;
    Ok(position)
}

/// Forget the saved resume position for a track
pub async fn clear_resume_position(db: &Pool<Sqlite>, song_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM resume_positions WHERE song_id = ?")
        .bind(song_id)
        .execute(db)
        .await?;
    Ok(())
}

/// A completed offline download on record
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRow {
    pub song_id: String,
    pub size_bytes: u64,
    pub downloaded_at: DateTime<Utc>,
}

/// Record a completed download
pub async fn record_download(
    db: &Pool<Sqlite>,
    song_id: &str,
    size_bytes: u64,
    downloaded_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO downloads (song_id, size_bytes, downloaded_at)
        VALUES (?, ?, ?)
        ON CONFLICT(song_id) DO UPDATE SET
            size_bytes = excluded.size_bytes,
            downloaded_at = excluded.downloaded_at
        "#,
    )
    .bind(song_id)
    .bind(size_bytes as i64)
    .bind(downloaded_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Remove a download record after the blob is deleted
pub async fn remove_download(db: &Pool<Sqlite>, song_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM downloads WHERE song_id = ?")
        .bind(song_id)
        .execute(db)
        .await?;
    Ok(())
}

/// List all recorded downloads
pub async fn list_downloads(db: &Pool<Sqlite>) -> Result<Vec<DownloadRow>> {
    let rows: Vec<(String, i64, DateTime<Utc>)> =
        sqlx::query_as("SELECT song_id, size_bytes, downloaded_at FROM downloads ORDER BY song_id")
            .fetch_all(db)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(song_id, size_bytes, downloaded_at)| DownloadRow {
            song_id,
            size_bytes: size_bytes as u64,
            downloaded_at,
        })
        .collect())
}

/// Generic setting getter
///
/// Returns None if the key does not exist. Parses the stored string via
/// FromStr.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::InvalidState(format!(
                "failed to parse setting '{key}' value: {s}"
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (UPSERT)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[tokio::test]
    async fn volume_defaults_and_clamps() {
        let db = open_in_memory().await.unwrap();

        // Default volume is 1.0
        assert_eq!(get_volume(&db).await.unwrap(), 1.0);

        set_volume(&db, 0.3).await.unwrap();
        assert_eq!(get_volume(&db).await.unwrap(), 0.3);

        set_volume(&db, 1.5).await.unwrap();
        assert_eq!(get_volume(&db).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn resume_position_round_trip() {
        let db = open_in_memory().await.unwrap();

        assert_eq!(load_resume_position(&db, "t1").await.unwrap(), None);

        save_resume_position(&db, "t1", 150.0).await.unwrap();
        assert_eq!(load_resume_position(&db, "t1").await.unwrap(), Some(150.0));

        // Per-track keying
        save_resume_position(&db, "t2", 12.5).await.unwrap();
        assert_eq!(load_resume_position(&db, "t1").await.unwrap(), Some(150.0));

        clear_resume_position(&db, "t1").await.unwrap();
        assert_eq!(load_resume_position(&db, "t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn download_records() {
        let db = open_in_memory().await.unwrap();
        let now = Utc::now();

        record_download(&db, "song-a", 1_000_000, now).await.unwrap();
        record_download(&db, "song-b", 500, now).await.unwrap();

        let rows = list_downloads(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].song_id, "song-a");
        assert_eq!(rows[0].size_bytes, 1_000_000);

        remove_download(&db, "song-a").await.unwrap();
        let rows = list_downloads(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].song_id, "song-b");
    }
}
