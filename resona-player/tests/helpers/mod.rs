//! Test helper modules for player integration tests
//!
//! Provides reusable fakes for the engine and download manager:
//! - FakeBackend/FakeHandle: scriptable audio resources with an event feed
//! - FakeFetcher: canned manifest text and chunked byte streams

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use resona_player::backend::{AudioBackend, AudioHandle, MediaEvent};
use resona_player::error::{Error, Result};
use resona_player::fetch::{FetchBody, Fetcher};

/// Record of every command a fake handle received
#[derive(Debug, Clone, PartialEq)]
pub enum HandleCall {
    Play,
    Pause,
    Seek(f64),
    SetVolume(f32),
    SelectVariant(usize),
    Recover,
    Detach,
}

/// One live fake resource
pub struct FakeHandle {
    pub url: String,
    pub calls: Arc<Mutex<Vec<HandleCall>>>,
    pub detached: Arc<AtomicBool>,
    events: mpsc::Sender<MediaEvent>,
}

impl FakeHandle {
    /// Push an event to the engine as the media resource would
    pub async fn emit(&self, event: MediaEvent) {
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl AudioHandle for FakeHandle {
    async fn play(&self) -> Result<()> {
        self.calls.lock().unwrap().push(HandleCall::Play);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.calls.lock().unwrap().push(HandleCall::Pause);
        Ok(())
    }

    async fn seek(&self, position: f64) -> Result<()> {
        self.calls.lock().unwrap().push(HandleCall::Seek(position));
        Ok(())
    }

    async fn set_volume(&self, level: f32) -> Result<()> {
        self.calls.lock().unwrap().push(HandleCall::SetVolume(level));
        Ok(())
    }

    async fn select_variant(&self, index: usize) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(HandleCall::SelectVariant(index));
        // Mirror a real adaptive client: confirm at the next boundary
        let _ = self.events.send(MediaEvent::VariantChanged { index }).await;
        Ok(())
    }

    async fn recover(&self) -> Result<()> {
        self.calls.lock().unwrap().push(HandleCall::Recover);
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        self.calls.lock().unwrap().push(HandleCall::Detach);
        self.detached.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared view of an opened fake resource, kept by the test
#[derive(Clone)]
pub struct OpenedResource {
    pub url: String,
    pub calls: Arc<Mutex<Vec<HandleCall>>>,
    pub detached: Arc<AtomicBool>,
    pub events: mpsc::Sender<MediaEvent>,
}

impl OpenedResource {
    pub async fn emit(&self, event: MediaEvent) {
        let _ = self.events.send(event).await;
    }

    pub fn calls(&self) -> Vec<HandleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Backend that records every opened resource
#[derive(Default)]
pub struct FakeBackend {
    opened: Mutex<Vec<OpenedResource>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<OpenedResource> {
        self.opened.lock().unwrap().clone()
    }

    /// The most recently opened resource
    pub fn last(&self) -> OpenedResource {
        self.opened
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no resource opened")
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn open(
        &self,
        url: &str,
        events: mpsc::Sender<MediaEvent>,
    ) -> Result<Box<dyn AudioHandle>> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let detached = Arc::new(AtomicBool::new(false));
        let handle = FakeHandle {
            url: url.to_string(),
            calls: Arc::clone(&calls),
            detached: Arc::clone(&detached),
            events: events.clone(),
        };
        self.opened.lock().unwrap().push(OpenedResource {
            url: url.to_string(),
            calls,
            detached,
            events,
        });
        Ok(Box::new(handle))
    }
}

/// Fetcher with canned text bodies and chunked streams
#[derive(Default)]
pub struct FakeFetcher {
    texts: Mutex<HashMap<String, String>>,
    streams: AsyncMutex<HashMap<String, StreamScript>>,
    pub fetch_count: AtomicUsize,
}

/// Script for one streamed response
pub struct StreamScript {
    pub content_length: Option<u64>,
    /// Chunks delivered in order; an Err aborts the transfer at that point
    pub chunks: Vec<std::result::Result<Bytes, String>>,
    /// Pause before each chunk, so a test can act mid-transfer
    pub chunk_delay: Option<std::time::Duration>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_text(&self, url: &str, body: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub async fn set_stream(&self, url: &str, script: StreamScript) {
        self.streams.lock().await.insert(url.to_string(), script);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.texts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Network(format!("no canned text for {url}")))
    }

    async fn fetch_stream(&self, url: &str) -> Result<FetchBody> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let script = self
            .streams
            .lock()
            .await
            .remove(url)
            .ok_or_else(|| Error::Network(format!("no canned stream for {url}")))?;
        let chunks: Vec<Result<Bytes>> = script
            .chunks
            .into_iter()
            .map(|c| c.map_err(Error::Network))
            .collect();
        let delay = script.chunk_delay;
        let stream = futures::stream::iter(chunks)
            .then(move |chunk| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                chunk
            })
            .boxed();
        Ok(FetchBody {
            content_length: script.content_length,
            stream,
        })
    }
}

/// Wait until `predicate` holds on the latest broadcast snapshot, with a
/// deadline so a broken invariant fails fast instead of hanging.
pub async fn wait_for_snapshot<F>(
    rx: &mut tokio::sync::broadcast::Receiver<resona_common::PlaybackSnapshot>,
    mut predicate: F,
) -> resona_common::PlaybackSnapshot
where
    F: FnMut(&resona_common::PlaybackSnapshot) -> bool,
{
    let deadline = tokio::time::Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            let snap = rx.recv().await.expect("snapshot channel closed");
            if predicate(&snap) {
                return snap;
            }
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}
