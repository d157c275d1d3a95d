//! Stream Source: opens the live audio endpoint
//!
//! [`StreamClient::open`] returns an [`AudioStream`]: the response body as a
//! `Stream` of byte chunks, plus the in-band metadata interval when the
//! server agreed to interleave `StreamTitle` blocks with the audio.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::fmt;
use std::time::Duration;

/// Default audio endpoint
pub const DEFAULT_STREAM_URL: &str = "https://stream.r-a-d.io/main.mp3";

/// Default connect timeout for the audio endpoint
///
/// Only connection establishment is bounded: a live stream never ends on
/// its own, so a whole-request timeout would cut every recording short.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Request header asking the server for in-band metadata
pub const ICY_METADATA_HEADER: &str = "Icy-MetaData";

/// Response header carrying the metadata interval
pub const ICY_METAINT_HEADER: &str = "icy-metaint";

/// Anything able to open the live audio stream
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open a fresh connection, asking for in-band metadata when `request_metadata` is set
    async fn open(&self, request_metadata: bool) -> Result<AudioStream>;
}

/// One connection to the audio endpoint
pub struct AudioStream {
    metaint: Option<usize>,
    body: BoxStream<'static, Result<Bytes>>,
}

impl AudioStream {
    pub fn new(
        metaint: Option<usize>,
        body: impl Stream<Item = Result<Bytes>> + Send + 'static,
    ) -> Self {
        Self {
            metaint: metaint.filter(|&n| n > 0),
            body: body.boxed(),
        }
    }

    /// A stream that yields `chunks` and then ends
    pub fn from_chunks(metaint: Option<usize>, chunks: Vec<Bytes>) -> Self {
        Self::new(metaint, stream::iter(chunks.into_iter().map(Ok)))
    }

    /// Bytes of audio between two metadata blocks, if in-band metadata was granted
    pub fn metaint(&self) -> Option<usize> {
        self.metaint
    }

    /// Next chunk of the body; `None` once the server closed the connection
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        self.body.next().await
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("metaint", &self.metaint)
            .finish_non_exhaustive()
    }
}

/// HTTP client for the audio endpoint
#[derive(Debug, Clone)]
pub struct StreamClient {
    client: Client,
    url: String,
}

impl StreamClient {
    /// Create a client for `url` with default settings
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(
            url,
            crate::status::DEFAULT_USER_AGENT,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Create a client with a custom User-Agent and connect timeout
    pub fn with_options(
        url: impl Into<String>,
        user_agent: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Create a client with a custom reqwest::Client
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Audio endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamSource for StreamClient {
    async fn open(&self, request_metadata: bool) -> Result<AudioStream> {
        let mut request = self.client.get(&self.url);
        if request_metadata {
            request = request.header(ICY_METADATA_HEADER, "1");
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(Error::Stream(format!(
                "{} returned status {}",
                self.url,
                response.status()
            )));
        }

        let metaint = if request_metadata {
            parse_metaint(response.headers())
        } else {
            None
        };

        tracing::debug!(url = %self.url, ?metaint, "Audio stream opened");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from));

        Ok(AudioStream::new(metaint, body))
    }
}

/// Parse the `icy-metaint` header; absent, invalid or zero means not granted
pub fn parse_metaint(headers: &HeaderMap) -> Option<usize> {
    let raw = headers.get(ICY_METAINT_HEADER)?;
    match raw.to_str().ok().and_then(|v| v.trim().parse::<usize>().ok()) {
        Some(0) => None,
        Some(n) => Some(n),
        None => {
            tracing::warn!("Ignoring unparsable {} header: {:?}", ICY_METAINT_HEADER, raw);
            None
        }
    }
}
