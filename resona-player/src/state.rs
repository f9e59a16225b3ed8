//! Shared playback state
//!
//! Thread-safe snapshot storage plus the subscription channel. Only the
//! playback engine mutates the snapshot; everything else reads copies.

use resona_common::PlaybackSnapshot;
use tokio::sync::{broadcast, RwLock};

/// Shared state between the engine and its subscribers
pub struct SharedState {
    snapshot: RwLock<PlaybackSnapshot>,
    event_tx: broadcast::Sender<PlaybackSnapshot>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100); // Buffer up to 100 snapshots
        Self {
            snapshot: RwLock::new(PlaybackSnapshot::default()),
            event_tx,
        }
    }

    /// Current snapshot copy
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Apply a mutation and broadcast the resulting snapshot
    pub async fn update<F>(&self, mutate: F) -> PlaybackSnapshot
    where
        F: FnOnce(&mut PlaybackSnapshot),
    {
        let mut guard = self.snapshot.write().await;
        mutate(&mut guard);
        // Keep the progress invariant regardless of what the mutation set
        guard.progress = PlaybackSnapshot::progress_for(guard.current_time, guard.duration);
        let snapshot = guard.clone();
        drop(guard);
        // Ignore send errors (no subscribers is OK)
        let _ = self.event_tx.send(snapshot.clone());
        snapshot
    }

    /// Subscribe to snapshot broadcasts
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackSnapshot> {
        self.event_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
