//! Playback engine
//!
//! Owns the single live audio resource. `set_source` fully detaches the
//! previous resource before attaching the next one, so subscribers never
//! observe interleaved events from a stale source. All public mutators
//! resolve failures to an observable error snapshot; nothing here panics
//! or propagates an error across the playback API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use sqlx::{Pool, Sqlite};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use resona_common::hls::MasterPlaylist;
use resona_common::ladder::select_initial_by_count;
use resona_common::{PlaybackSnapshot, TrackSource};

use crate::abr::{AbrOptions, AdaptiveController, RecoveryAction, StreamingSession};
use crate::backend::{AudioBackend, AudioHandle, MediaErrorKind, MediaEvent};
use crate::cache::CacheStore;
use crate::db::settings as db_settings;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::state::SharedState;

/// Seconds of playback after which the position starts being persisted
const RESUME_SAVE_THRESHOLD: f64 = 5.0;

/// Restored positions are clamped to `duration - RESUME_TAIL_GUARD` so a
/// restore never lands on the end-of-track edge
const RESUME_TAIL_GUARD: f64 = 5.0;

/// Engine construction options
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// ABR controller tuning
    pub abr: AbrOptions,
    /// Last known bandwidth, used to pick the starting rung
    pub initial_bandwidth: Option<u64>,
    /// Constrained device (small player): cap the starting rung
    pub constrained_device: bool,
}

type SharedHandle = Arc<RwLock<Arc<dyn AudioHandle>>>;
type SharedAbr = Arc<StdMutex<AdaptiveController>>;

struct Session {
    track: TrackSource,
    handle: SharedHandle,
    abr: Option<SharedAbr>,
    pump: JoinHandle<()>,
}

struct EngineInner {
    backend: Arc<dyn AudioBackend>,
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn CacheStore>,
    db: Pool<Sqlite>,
    state: SharedState,
    opts: EngineOptions,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
}

/// Shared playback engine; cheap to clone, explicit lifecycle
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Construct the engine and restore the persisted volume
    pub async fn new(
        backend: Arc<dyn AudioBackend>,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn CacheStore>,
        db: Pool<Sqlite>,
        opts: EngineOptions,
    ) -> Result<Self> {
        let volume = db_settings::get_volume(&db).await?;
        let state = SharedState::new();
        state.update(|s| s.volume = volume).await;
        Ok(Self {
            inner: Arc::new(EngineInner {
                backend,
                fetcher,
                cache,
                db,
                state,
                opts,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Subscribe to state snapshots.
    ///
    /// Returns the current snapshot immediately plus a receiver for every
    /// later transition. Dropping the receiver unsubscribes.
    pub async fn subscribe(&self) -> (PlaybackSnapshot, broadcast::Receiver<PlaybackSnapshot>) {
        let rx = self.inner.state.subscribe();
        let snapshot = self.inner.state.snapshot().await;
        (snapshot, rx)
    }

    /// Current snapshot copy
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.state.snapshot().await
    }

    /// Swap the active source.
    ///
    /// Tears the previous resource down completely (stop, detach, release)
    /// before attaching the new one. Failures resolve to an error
    /// snapshot; the engine stays usable for the next call.
    pub async fn set_source(&self, track: TrackSource) {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;

        // From this point no event of the old source reaches subscribers
        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(old) = session.take() {
            old.pump.abort();
            let handle = old.handle.read().await.clone();
            if let Err(e) = handle.detach().await {
                warn!(song_id = %old.track.id, error = %e, "detach of previous source failed");
            }
        }

        let offline = inner.cache.contains(&track.id).await;
        inner
            .state
            .update(|s| {
                s.current_time = 0.0;
                s.duration = track.duration_hint.unwrap_or(0.0);
                s.is_loading = true;
                s.is_playing_offline = offline;
                s.error = None;
            })
            .await;

        let new_session = match inner.build_session(generation, &track, offline).await {
            Ok(s) => s,
            Err(e) => {
                warn!(song_id = %track.id, error = %e, "failed to attach source");
                inner
                    .state
                    .update(|s| {
                        s.is_loading = false;
                        s.error = Some(e.to_string());
                    })
                    .await;
                return;
            }
        };

        // Carry the persisted volume onto the fresh resource
        let volume = inner.state.snapshot().await.volume;
        let handle = new_session.handle.read().await.clone();
        if let Err(e) = handle.set_volume(volume).await {
            warn!(error = %e, "could not apply volume to new source");
        }

        info!(song_id = %track.id, offline, manifest = track.is_manifest, "source attached");
        *session = Some(new_session);
    }

    /// Start playback. Idempotent.
    pub async fn play(&self) {
        self.with_handle("play", |h| async move { h.play().await })
            .await;
    }

    /// Pause playback. Idempotent.
    pub async fn pause(&self) {
        self.with_handle("pause", |h| async move { h.pause().await })
            .await;
    }

    /// Seek to a normalized position in `[0, 1]`.
    ///
    /// No-op while the duration is unknown.
    pub async fn seek(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let snapshot = self.inner.state.snapshot().await;
        if !(snapshot.duration.is_finite() && snapshot.duration > 0.0) {
            debug!("seek ignored: duration unknown");
            return;
        }
        let position = fraction * snapshot.duration;
        self.with_handle("seek", |h| async move { h.seek(position).await })
            .await;
        self.inner
            .state
            .update(|s| s.current_time = position)
            .await;
    }

    /// Set master volume, clamped to `[0, 1]` and persisted for future
    /// sessions.
    pub async fn set_volume(&self, level: f32) {
        let level = level.clamp(0.0, 1.0);
        if let Err(e) = db_settings::set_volume(&self.inner.db, level).await {
            warn!(error = %e, "volume persistence failed");
        }
        self.with_handle("set_volume", |h| async move { h.set_volume(level).await })
            .await;
        self.inner.state.update(|s| s.volume = level).await;
    }

    /// Manual quality override; applied at the next segment boundary.
    ///
    /// Returns false when no adaptive session is active or the rung name
    /// is unknown.
    pub async fn set_quality(&self, name: &str) -> bool {
        let session = self.inner.session.lock().await;
        match session.as_ref().and_then(|s| s.abr.clone()) {
            Some(abr) => abr.lock().expect("abr lock poisoned").set_quality(name),
            None => false,
        }
    }

    /// Return quality selection to automatic mode
    pub async fn set_auto_quality(&self) {
        let session = self.inner.session.lock().await;
        if let Some(abr) = session.as_ref().and_then(|s| s.abr.clone()) {
            abr.lock().expect("abr lock poisoned").set_auto();
        }
    }

    /// Rung names of the active adaptive session, ladder order
    pub async fn available_qualities(&self) -> Vec<String> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|s| s.abr.clone())
            .map(|abr| abr.lock().expect("abr lock poisoned").available_qualities())
            .unwrap_or_default()
    }

    /// Name of the rung currently playing, when adaptive
    pub async fn current_quality(&self) -> Option<String> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|s| s.abr.clone())
            .map(|abr| abr.lock().expect("abr lock poisoned").current_quality().to_string())
    }

    /// Read-only streaming diagnostics for the active session
    pub async fn streaming_diagnostics(&self) -> Option<StreamingSession> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|s| s.abr.clone())
            .map(|abr| abr.lock().expect("abr lock poisoned").diagnostics())
    }

    /// Detach the current resource and stop the event pump.
    ///
    /// The engine remains usable; `set_source` starts a new session.
    pub async fn close(&self) {
        let mut session = self.inner.session.lock().await;
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(old) = session.take() {
            old.pump.abort();
            let handle = old.handle.read().await.clone();
            let _ = handle.detach().await;
        }
    }

    async fn with_handle<F, Fut>(&self, op: &str, f: F)
    where
        F: FnOnce(Arc<dyn AudioHandle>) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let handle = {
            let session = self.inner.session.lock().await;
            match session.as_ref() {
                Some(s) => s.handle.read().await.clone(),
                None => {
                    debug!(op, "ignored: no active source");
                    return;
                }
            }
        };
        if let Err(e) = f(handle).await {
            match e {
                Error::InteractionRequired => {
                    self.inner
                        .state
                        .update(|s| s.error = Some(Error::InteractionRequired.to_string()))
                        .await;
                }
                e => {
                    warn!(op, error = %e, "playback operation failed");
                    self.inner
                        .state
                        .update(|s| s.error = Some(e.to_string()))
                        .await;
                }
            }
        }
    }
}

impl EngineInner {
    /// Attach a resource for the track and spawn its event pump
    async fn build_session(
        self: &Arc<Self>,
        generation: u64,
        track: &TrackSource,
        offline: bool,
    ) -> Result<Session> {
        let mut abr = None;
        let url = if offline {
            // Backends wired to the same cache store resolve this scheme
            // to the local blob
            format!("cache://{}", track.id)
        } else if track.is_manifest {
            let text = self.fetcher.fetch_text(&track.media_url).await?;
            let master = MasterPlaylist::parse(&text)?;
            let initial = select_initial_by_count(
                master.variants.len(),
                self.opts.initial_bandwidth,
                self.opts.constrained_device,
            );
            abr = Some(Arc::new(StdMutex::new(AdaptiveController::new(
                &master,
                initial,
                self.opts.abr.clone(),
            ))));
            track.media_url.clone()
        } else {
            track.media_url.clone()
        };

        let (tx, rx) = mpsc::channel(64);
        let boxed = self.backend.open(&url, tx).await?;
        let handle: SharedHandle = Arc::new(RwLock::new(Arc::from(boxed)));

        let pump = tokio::spawn(pump_events(
            Arc::clone(self),
            generation,
            track.clone(),
            Arc::clone(&handle),
            abr.clone(),
            rx,
        ));

        Ok(Session {
            track: track.clone(),
            handle,
            abr,
            pump,
        })
    }
}

/// Per-session event pump: translates media events into snapshot
/// transitions, resume persistence, and ABR decisions.
async fn pump_events(
    inner: Arc<EngineInner>,
    generation: u64,
    track: TrackSource,
    handle: SharedHandle,
    abr: Option<SharedAbr>,
    mut rx: mpsc::Receiver<MediaEvent>,
) {
    let mut last_saved_position = f64::NEG_INFINITY;
    let mut last_position = 0.0f64;

    while let Some(event) = rx.recv().await {
        if inner.generation.load(Ordering::Acquire) != generation {
            // A newer source owns the subscribers now
            break;
        }

        match event {
            MediaEvent::MetadataLoaded { duration } => {
                inner
                    .state
                    .update(|s| {
                        s.duration = duration;
                        s.is_loading = false;
                    })
                    .await;
                restore_position(&inner, &track, &handle, duration).await;
            }
            MediaEvent::TimeUpdate { position } => {
                if let Some(abr) = &abr {
                    let advanced = (position - last_position).max(0.0);
                    abr.lock().expect("abr lock poisoned").on_playback_advanced(advanced);
                }
                last_position = position;
                inner.state.update(|s| s.current_time = position).await;

                if position > RESUME_SAVE_THRESHOLD
                    && (position - last_saved_position).abs() >= 1.0
                {
                    last_saved_position = position;
                    if let Err(e) =
                        db_settings::save_resume_position(&inner.db, &track.id, position).await
                    {
                        warn!(error = %e, "resume position save failed");
                    }
                }
            }
            MediaEvent::Waiting => {
                if let Some(abr) = &abr {
                    abr.lock().expect("abr lock poisoned").on_stall();
                }
                inner.state.update(|s| s.is_loading = true).await;
            }
            MediaEvent::CanPlay => {
                if let Some(abr) = &abr {
                    abr.lock().expect("abr lock poisoned").on_buffer_replenished();
                }
                inner.state.update(|s| s.is_loading = false).await;
            }
            MediaEvent::SegmentLoaded {
                bytes,
                transfer,
                media_seconds,
            } => {
                if let Some(abr) = &abr {
                    let (target, confirmed) = {
                        let mut c = abr.lock().expect("abr lock poisoned");
                        c.on_segment_loaded(bytes, transfer, media_seconds);
                        (c.on_segment_boundary(), c.current_index())
                    };
                    if target != confirmed {
                        let h = handle.read().await.clone();
                        if let Err(e) = h.select_variant(target).await {
                            warn!(target, error = %e, "variant switch request failed");
                        }
                    }
                }
            }
            MediaEvent::VariantChanged { index } => {
                if let Some(abr) = &abr {
                    abr.lock().expect("abr lock poisoned").confirm_variant(index);
                    debug!(index, "variant switch confirmed");
                }
            }
            MediaEvent::Ended => {
                if let Err(e) = db_settings::clear_resume_position(&inner.db, &track.id).await {
                    warn!(error = %e, "resume position clear failed");
                }
                inner
                    .state
                    .update(|s| {
                        s.current_time = s.duration;
                        s.is_loading = false;
                    })
                    .await;
            }
            MediaEvent::Error { kind, message } => {
                if handle_media_error(&inner, &track, &handle, abr.as_ref(), kind, &message).await {
                    break;
                }
            }
        }
    }
}

/// Restore a saved position once the duration is known, clamped away
/// from the end of the track.
async fn restore_position(
    inner: &Arc<EngineInner>,
    track: &TrackSource,
    handle: &SharedHandle,
    duration: f64,
) {
    if !(duration.is_finite() && duration > 0.0) {
        return;
    }
    let saved = match db_settings::load_resume_position(&inner.db, &track.id).await {
        Ok(Some(saved)) => saved,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "resume position load failed");
            return;
        }
    };
    let target = saved.min((duration - RESUME_TAIL_GUARD).max(0.0));
    if target <= 0.0 {
        return;
    }
    debug!(song_id = %track.id, saved, target, "restoring saved position");
    let h = handle.read().await.clone();
    if let Err(e) = h.seek(target).await {
        warn!(error = %e, "resume seek failed");
    } else {
        inner.state.update(|s| s.current_time = target).await;
    }
}

/// Apply the recovery policy for a media error. Returns true when the
/// pump should stop (terminal failure).
async fn handle_media_error(
    inner: &Arc<EngineInner>,
    track: &TrackSource,
    handle: &SharedHandle,
    abr: Option<&SharedAbr>,
    kind: MediaErrorKind,
    message: &str,
) -> bool {
    match (kind, abr) {
        (MediaErrorKind::InteractionRequired, _) => {
            inner
                .state
                .update(|s| {
                    s.is_loading = false;
                    s.error = Some(Error::InteractionRequired.to_string());
                })
                .await;
            false
        }
        (MediaErrorKind::Network, Some(abr)) => {
            // Transient network trouble shows as buffering; only an
            // exhausted retry budget surfaces an error
            loop {
                let action = abr.lock().expect("abr lock poisoned").on_network_error();
                match action {
                    RecoveryAction::ReloadManifest => {
                        inner.state.update(|s| s.is_loading = true).await;
                        match reload_manifest(inner, track).await {
                            Ok(master) => {
                                abr.lock()
                                    .expect("abr lock poisoned")
                                    .on_manifest_reloaded(&master);
                                inner.state.update(|s| s.is_loading = false).await;
                                debug!(song_id = %track.id, "manifest reloaded after network error");
                                return false;
                            }
                            Err(e) => {
                                warn!(error = %e, "manifest reload failed");
                                continue;
                            }
                        }
                    }
                    _ => {
                        surface_error(inner, message).await;
                        return true;
                    }
                }
            }
        }
        (MediaErrorKind::Decode, Some(abr)) => {
            let action = abr
                .lock()
                .expect("abr lock poisoned")
                .on_decode_error(track.fallback_url.is_some());
            match action {
                RecoveryAction::RecoverMedia => {
                    let h = handle.read().await.clone();
                    if h.recover().await.is_ok() {
                        debug!(song_id = %track.id, "media recovery succeeded");
                        return false;
                    }
                    // Recovery burned; take the next action on the spot
                    let next = abr
                        .lock()
                        .expect("abr lock poisoned")
                        .on_decode_error(track.fallback_url.is_some());
                    if next == RecoveryAction::FallbackToRaw {
                        return fallback_to_raw(inner, track, handle).await;
                    }
                    surface_error(inner, message).await;
                    true
                }
                RecoveryAction::FallbackToRaw => fallback_to_raw(inner, track, handle).await,
                _ => {
                    surface_error(inner, message).await;
                    true
                }
            }
        }
        _ => {
            surface_error(inner, message).await;
            true
        }
    }
}

async fn reload_manifest(
    inner: &Arc<EngineInner>,
    track: &TrackSource,
) -> Result<MasterPlaylist> {
    let text = inner.fetcher.fetch_text(&track.media_url).await?;
    Ok(MasterPlaylist::parse(&text)?)
}

/// Swap the live resource to the raw fallback URL in place. Returns true
/// (stop the pump) only when the fallback attach itself fails.
async fn fallback_to_raw(
    inner: &Arc<EngineInner>,
    track: &TrackSource,
    handle: &SharedHandle,
) -> bool {
    let Some(url) = track.fallback_url.as_deref() else {
        surface_error(inner, "decode error without raw fallback").await;
        return true;
    };
    info!(song_id = %track.id, "falling back to raw media URL");

    let old = handle.read().await.clone();
    let _ = old.detach().await;

    // The new resource reports into the same pump channel; the session's
    // receiver keeps draining it
    let (tx, rx) = mpsc::channel(64);
    match inner.backend.open(url, tx).await {
        Ok(boxed) => {
            *handle.write().await = Arc::from(boxed);
            tokio::spawn(forward_events(
                rx,
                inner.clone(),
                track.clone(),
                handle.clone(),
            ));
            inner.state.update(|s| s.is_loading = true).await;
            false
        }
        Err(e) => {
            surface_error(inner, &format!("raw fallback failed: {e}")).await;
            true
        }
    }
}

/// Pump for the fallback resource: no ABR, but resume persistence keeps
/// working across the swap
async fn forward_events(
    mut rx: mpsc::Receiver<MediaEvent>,
    inner: Arc<EngineInner>,
    track: TrackSource,
    handle: SharedHandle,
) {
    let generation = inner.generation.load(Ordering::Acquire);
    let mut last_saved_position = f64::NEG_INFINITY;
    while let Some(event) = rx.recv().await {
        if inner.generation.load(Ordering::Acquire) != generation {
            break;
        }
        match event {
            MediaEvent::MetadataLoaded { duration } => {
                inner
                    .state
                    .update(|s| {
                        s.duration = duration;
                        s.is_loading = false;
                    })
                    .await;
                restore_position(&inner, &track, &handle, duration).await;
            }
            MediaEvent::TimeUpdate { position } => {
                inner.state.update(|s| s.current_time = position).await;

                if position > RESUME_SAVE_THRESHOLD
                    && (position - last_saved_position).abs() >= 1.0
                {
                    last_saved_position = position;
                    if let Err(e) =
                        db_settings::save_resume_position(&inner.db, &track.id, position).await
                    {
                        warn!(error = %e, "resume position save failed");
                    }
                }
            }
            MediaEvent::Waiting => {
                inner.state.update(|s| s.is_loading = true).await;
            }
            MediaEvent::CanPlay => {
                inner.state.update(|s| s.is_loading = false).await;
            }
            MediaEvent::Ended => {
                if let Err(e) = db_settings::clear_resume_position(&inner.db, &track.id).await {
                    warn!(error = %e, "resume position clear failed");
                }
                inner
                    .state
                    .update(|s| {
                        s.current_time = s.duration;
                        s.is_loading = false;
                    })
                    .await;
            }
            MediaEvent::Error { message, .. } => {
                surface_error(&inner, &message).await;
                break;
            }
            _ => {}
        }
    }
}

async fn surface_error(inner: &Arc<EngineInner>, message: &str) {
    inner
        .state
        .update(|s| {
            s.is_loading = false;
            s.error = Some(message.to_string());
        })
        .await;
}
