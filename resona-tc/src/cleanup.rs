//! Artifact retention cleanup
//!
//! A maintenance sweep deletes artifacts older than the retention window
//! and prunes directories left empty afterwards. Each delivery-protocol
//! root is swept independently, so HLS and DASH retention never interact.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Outcome of one sweep over one protocol root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub files_removed: u64,
    pub dirs_removed: u64,
}

/// Sweep one protocol root on a blocking thread
pub async fn sweep_root(root: PathBuf, retention: Duration) -> Result<CleanupStats> {
    tokio::task::spawn_blocking(move || sweep_blocking(&root, retention))
        .await
        .map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("cleanup task failed: {e}"))
        })?
}

fn sweep_blocking(root: &Path, retention: Duration) -> Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    if !root.exists() {
        return Ok(stats);
    }
    let cutoff = SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let expired = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(|modified| modified < cutoff)
            .unwrap_or(false);
        if !expired {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "removed expired artifact");
                stats.files_removed += 1;
            }
            Err(e) => warn!(path = %entry.path().display(), error = %e, "could not remove artifact"),
        }
    }

    // Deepest directories first so a whole empty subtree collapses in one pass
    for entry in WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() || entry.path() == root {
            continue;
        }
        let empty = std::fs::read_dir(entry.path())
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if empty && std::fs::remove_dir(entry.path()).is_ok() {
            stats.dirs_removed += 1;
        }
    }

    Ok(stats)
}
