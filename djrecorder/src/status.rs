//! Status Source: polls the station status endpoint
//!
//! The [`StatusSource`] trait is the seam the recorder depends on;
//! [`StatusClient`] is the HTTP implementation and
//! [`spawn_status_poller`] turns any source into a steady stream of
//! [`Status`] values delivered to a single consumer.
//!
//! # Example
//!
//! ```no_run
//! use djrecorder::StatusClient;
//! use djrecorder::status::StatusSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StatusClient::builder()
//!         .url("https://r-a-d.io/api")
//!         .idle_dj("Hanyuu-sama")
//!         .build()
//!         .await?;
//!
//!     let status = client.fetch_status().await?;
//!     println!("{} live={} playing {}", status.dj, status.live, status.now_playing);
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::models::{Status, StatusResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default status endpoint
pub const DEFAULT_STATUS_URL: &str = "https://r-a-d.io/api";

/// Default DJ identity sentinel
pub const DEFAULT_IDLE_DJ: &str = "Hanyuu-sama";

/// Default timeout for status requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default cadence between two status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "djrec/0.1.0";

/// Anything able to produce the current station status
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<Status>;
}

/// HTTP client for the status endpoint
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: Client,
    url: String,
    idle_dj: String,
    timeout: Duration,
}

impl StatusClient {
    /// Create a new client with default settings
    pub async fn new() -> Result<Self> {
        Self::builder().build().await
    }

    /// Create a builder for configuring the client
    pub fn builder() -> StatusClientBuilder {
        StatusClientBuilder::default()
    }

    /// Status endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// DJ identity sentinel used for liveness derivation
    pub fn idle_dj(&self) -> &str {
        &self.idle_dj
    }
}

#[async_trait]
impl StatusSource for StatusClient {
    async fn fetch_status(&self) -> Result<Status> {
        let url = Url::parse(&self.url)?;

        tracing::trace!("Fetching status: {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;

        if !response.status().is_success() {
            return Err(Error::Status(format!(
                "{} returned status {}",
                self.url,
                response.status()
            )));
        }

        let body: StatusResponse = response.json().await?;
        Ok(Status::from_response(body, &self.idle_dj))
    }
}

/// Builder for configuring a StatusClient
#[derive(Debug)]
pub struct StatusClientBuilder {
    client: Option<Client>,
    url: String,
    idle_dj: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for StatusClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            url: DEFAULT_STATUS_URL.to_string(),
            idle_dj: DEFAULT_IDLE_DJ.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl StatusClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the status endpoint URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the DJ identity sentinel
    pub fn idle_dj(mut self, idle_dj: impl Into<String>) -> Self {
        self.idle_dj = idle_dj.into();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client
    pub async fn build(self) -> Result<StatusClient> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(StatusClient {
            client,
            url: self.url,
            idle_dj: self.idle_dj,
            timeout: self.timeout,
        })
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Poll `source` once per `period` and deliver statuses on the returned channel
///
/// The channel holds at most one pending status. When the consumer is still
/// busy with the previous one, the poller waits at most one period before
/// dropping the new status, so it never falls more than a tick behind.
/// A failed fetch is logged and delivers nothing: the consumer keeps acting
/// on the last status it saw.
///
/// The task stops when `cancel` fires or the receiver is dropped.
pub fn spawn_status_poller<S>(
    source: Arc<S>,
    period: Duration,
    cancel: CancellationToken,
) -> (mpsc::Receiver<Status>, JoinHandle<()>)
where
    S: StatusSource + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = source.fetch_status() => fetched,
            };

            let status = match fetched {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Status fetch failed: {}", e);
                    continue;
                }
            };

            match tx.send_timeout(status, period).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(status)) => {
                    tracing::warn!(dj = %status.dj, "Status consumer is busy, dropping status");
                }
                Err(SendTimeoutError::Closed(_)) => break,
            }
        }

        tracing::debug!("Status poller stopped");
    });

    (rx, handle)
}
