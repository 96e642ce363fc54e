//! GET with unbounded fixed-delay retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{FetchError, RetryDecision, RetryPolicy, build_http_client};
use crate::config::CrawlConfig;

/// Fetches catalog documents, retrying failed attempts until one succeeds.
///
/// Non-2xx statuses and transport errors are never returned from
/// [`fetch`](Self::fetch): the call sleeps for the policy delay and tries the
/// same URL again. The only ways out are success or the cancellation token.
///
/// Cloning is cheap and clones share the connection pool and the retry counter.
#[derive(Debug, Clone)]
pub struct ResilientFetcher {
    client: Client,
    policy: RetryPolicy,
    retry_events: Arc<AtomicU64>,
}

impl ResilientFetcher {
    /// Creates a fetcher with the configured headers, timeout and retry delay.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        Self::with_policy(config, RetryPolicy::unbounded(config.retry_delay))
    }

    /// Creates a fetcher with an explicit retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn with_policy(config: &CrawlConfig, policy: RetryPolicy) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(config)?,
            policy,
            retry_events: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Returns the underlying HTTP client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Total retries performed by this fetcher and its clones.
    #[must_use]
    pub fn retry_events(&self) -> u64 {
        self.retry_events.load(Ordering::SeqCst)
    }

    /// Performs exactly one GET and returns the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`], [`FetchError::Timeout`] or
    /// [`FetchError::HttpStatus`] describing the failed attempt.
    pub async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        response.text().await.map_err(|e| FetchError::transport(url, e))
    }

    /// Fetches `url`, retrying every failure after the policy delay.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cancelled`] once `cancel` fires; the token is checked
    /// before each attempt and while sleeping between attempts. With a bounded
    /// policy the last attempt's error is returned when attempts run out.
    #[instrument(skip(self, cancel))]
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<String, FetchError> {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::cancelled(url));
            }
            attempt = attempt.saturating_add(1);

            let error = match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(attempt, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(error) => error,
            };

            match self.policy.should_retry(attempt) {
                RetryDecision::Retry { delay, .. } => {
                    self.retry_events.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        error = %error,
                        retry = attempt,
                        delay_ms = delay.as_millis(),
                        "fetch failed; retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(FetchError::cancelled(url)),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying fetch");
                    return Err(error);
                }
            }
        }
    }
}
