//! Rate limiting and retry logic for external API calls
//!
//! Metadata providers throttle aggressively and fail intermittently. Every
//! provider call goes through a [RateLimitedClient] and is wrapped in
//! [retry_async], which retries with a linearly growing delay.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response};
use tracing::{debug, warn};

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            burst_size: 1,
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    /// Create a new rate-limited client
    pub fn new(name: &str, config: RateLimitConfig) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name: name.to_string(),
        })
    }

    /// Create a client for the MusicBrainz API
    pub fn for_musicbrainz() -> Result<Self> {
        // MusicBrainz requires max 1 request per second
        Self::new(
            "musicbrainz",
            RateLimitConfig {
                requests_per_second: 1,
                burst_size: 1,
            },
        )
    }

    /// Create a client for the Discogs API
    pub fn for_discogs() -> Result<Self> {
        // Authenticated Discogs clients get 60 requests per minute
        Self::new(
            "discogs",
            RateLimitConfig {
                requests_per_second: 1,
                burst_size: 2,
            },
        )
    }

    /// Wait for rate limit and make a GET request with headers and query parameters
    pub async fn get_with_headers_and_query<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request");

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay unit; the n-th retry waits `n * delay`
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 20,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryConfig {
    /// Create a LinearBackoff from this config
    pub fn to_backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.delay)
    }
}

/// Backoff that grows by a fixed step per attempt: `step`, `2 * step`, ...
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step: Duration,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(step: Duration) -> Self {
        Self { step, attempt: 0 }
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        self.step.checked_mul(self.attempt)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Execute an async operation with retry logic
///
/// The first attempt runs immediately. After the n-th transient failure the
/// wrapper sleeps `n * config.delay` and tries again, up to
/// `config.max_retries` retries; the last error is returned once they are
/// exhausted. A [permanent](backoff::Error::Permanent) failure is returned
/// right away.
pub async fn retry_async<T, E, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, backoff::Error<E>>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(backoff::Error::Permanent(e)) => {
                warn!(
                    operation = %operation_name,
                    attempt = attempts,
                    error = %e,
                    "Operation failed, not retrying"
                );
                return Err(e);
            }
            Err(backoff::Error::Transient { err, .. }) => err,
        };

        if attempts > config.max_retries {
            warn!(
                operation = %operation_name,
                attempts = attempts,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        let Some(duration) = backoff.next_backoff() else {
            return Err(e);
        };
        let retry_ms: u128 = duration.as_millis();
        warn!(
            operation = %operation_name,
            attempt = attempts,
            error = %e,
            retry_in_ms = retry_ms,
            "Operation failed, retrying"
        );
        tokio::time::sleep(duration).await;
    }
}

/// Helper trait for HTTP responses that might indicate rate limiting
pub trait ResponseExt {
    /// Check if the response indicates rate limiting (429 or MusicBrainz' 503)
    fn is_rate_limited(&self) -> bool;

    /// Check if the response indicates a transient error that should be retried
    fn is_transient_error(&self) -> bool;

    /// Classify a failed response for [retry_async]
    fn into_retry_error(self, provider: &str) -> backoff::Error<anyhow::Error>;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        matches!(self.status().as_u16(), 429 | 503)
    }

    fn is_transient_error(&self) -> bool {
        let status = self.status().as_u16();
        // 429 (rate limit), 500-599 (server errors), 408 (timeout)
        status == 429 || status == 408 || (500..600).contains(&status)
    }

    fn into_retry_error(self, provider: &str) -> backoff::Error<anyhow::Error> {
        let err = if self.is_rate_limited() {
            anyhow::anyhow!("{} rate limited ({})", provider, self.status())
        } else {
            anyhow::anyhow!(
                "{} request {} failed with status: {}",
                provider,
                self.url(),
                self.status()
            )
        };

        if self.is_transient_error() {
            backoff::Error::transient(err)
        } else {
            backoff::Error::permanent(err)
        }
    }
}
