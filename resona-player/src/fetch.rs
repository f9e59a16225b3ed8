//! Network fetch seam
//!
//! All network access in the player goes through [`Fetcher`] so the
//! download manager and manifest reload paths can be exercised without a
//! live server.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{Error, Result};

/// A streamed response body with its declared length, if any
pub struct FetchBody {
    /// Content-Length header value, when the server sent one
    pub content_length: Option<u64>,
    /// Chunked body stream
    pub stream: BoxStream<'static, Result<Bytes>>,
}

/// Abstract network client
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a small text resource (manifests)
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Open a streamed byte fetch (media downloads)
    async fn fetch_stream(&self, url: &str) -> Result<FetchBody>;
}

/// Production fetcher over a shared reqwest client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_stream(&self, url: &str) -> Result<FetchBody> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed();
        Ok(FetchBody {
            content_length,
            stream,
        })
    }
}
