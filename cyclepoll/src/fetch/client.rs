//! Resilient fetch client.
//!
//! Executes one logical request with bounded retries:
//!
//! ```text
//! 2xx                  ──► success
//! 500/502/503/504      ──► sleep retry delay, try again
//! 429                  ──► sleep until rate-limit reset + margin, try again
//! 401                  ──► Unauthorized (never retried)
//! anything else        ──► UnexpectedStatus (never retried)
//! body > ceiling       ──► BodyTooLarge (never retried)
//! attempts exhausted   ──► NoAttemptsLeft
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{FetchError, FetchResult};
use super::policy::RetryPolicy;
use super::request::ApiRequest;
use super::transport::{ReqwestTransport, Transport, DEFAULT_TIMEOUT_SECS};

/// Default response size ceiling (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Default extra wait after a rate-limit reset time.
pub const DEFAULT_RATE_LIMIT_MARGIN: Duration = Duration::from_millis(500);

/// Default header carrying the rate-limit reset time as Unix seconds.
pub const DEFAULT_RATE_LIMIT_RESET_HEADER: &str = "ratelimit-reset";

/// Upper bound on a single rate-limit wait, whatever the header says.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);

/// Configuration for a [`FetchClient`].
#[derive(Clone, Debug, PartialEq)]
pub struct FetchConfig {
    /// Attempt budget and delay after server errors.
    pub retry: RetryPolicy,

    /// Added to the wait computed from a rate-limit reset header.
    pub rate_limit_margin: Duration,

    /// Responses larger than this fail without retry.
    pub max_body_bytes: usize,

    /// Per-request timeout for the HTTP transport.
    pub timeout: Duration,

    /// Name of the rate-limit reset header.
    pub rate_limit_reset_header: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rate_limit_margin: DEFAULT_RATE_LIMIT_MARGIN,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rate_limit_reset_header: DEFAULT_RATE_LIMIT_RESET_HEADER.to_string(),
        }
    }
}

impl FetchConfig {
    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the rate-limit margin.
    pub fn with_rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    /// Set the response size ceiling.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Set the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a status code is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    ServerError,
    RateLimited,
    Unauthorized,
    Unexpected,
}

fn classify(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Success,
        500 | 502 | 503 | 504 => Outcome::ServerError,
        429 => Outcome::RateLimited,
        401 => Outcome::Unauthorized,
        _ => Outcome::Unexpected,
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Success status code.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
    /// Attempts spent, including the successful one.
    pub attempts: u32,
}

impl FetchResponse {
    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> FetchResult<T> {
        if self.body.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Executes requests with retries through a [`Transport`].
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    config: FetchConfig,
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FetchClient {
    /// Creates a client over `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    /// Creates a client over a [`ReqwestTransport`] using the configured timeout.
    pub fn with_reqwest(config: FetchConfig) -> FetchResult<Self> {
        let transport = ReqwestTransport::with_timeout(config.timeout)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Client configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Executes `request`, retrying server errors and rate limits.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Unauthorized`] on 401
    /// - [`FetchError::UnexpectedStatus`] on any non-retryable status
    /// - [`FetchError::BodyTooLarge`] if the body passes the ceiling
    /// - [`FetchError::NoAttemptsLeft`] once every attempt was retryable
    /// - [`FetchError::Transport`] on connection failures
    pub async fn execute(&self, request: &ApiRequest) -> FetchResult<FetchResponse> {
        let max_attempts = self.config.retry.max_attempts();
        let max_body = self.config.max_body_bytes;
        let mut last = String::from("no response");

        for attempt in 1..=max_attempts {
            let response = self.transport.send(request, max_body).await?;
            if response.body.len() > max_body {
                return Err(FetchError::BodyTooLarge { limit: max_body });
            }

            let status = response.status;
            debug!(url = request.url(), status, attempt, "Fetch attempt");

            let wait = match classify(status) {
                Outcome::Success => {
                    return Ok(FetchResponse {
                        status,
                        body: response.body,
                        attempts: attempt,
                    });
                }
                Outcome::Unauthorized => return Err(FetchError::Unauthorized),
                Outcome::Unexpected => return Err(FetchError::UnexpectedStatus { status }),
                Outcome::ServerError => self.config.retry.delay_for_attempt(attempt),
                Outcome::RateLimited => self
                    .config
                    .retry
                    .delay_for_attempt(attempt)
                    .map(|fallback| {
                        let reset = response.header(&self.config.rate_limit_reset_header);
                        self.rate_limit_wait(reset, fallback)
                    }),
            };

            last = format!("HTTP {}", status);
            let Some(wait) = wait else {
                break;
            };

            warn!(
                url = request.url(),
                status,
                attempt,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                "Retryable response, waiting before next attempt"
            );
            tokio::time::sleep(wait).await;
        }

        Err(FetchError::NoAttemptsLeft {
            attempts: max_attempts,
            last,
        })
    }

    /// Wait until the reset time in `reset` plus the margin.
    ///
    /// A missing or unparsable header falls back to `fallback`; a reset
    /// already in the past waits only the margin.
    fn rate_limit_wait(&self, reset: Option<&str>, fallback: Duration) -> Duration {
        let reset_at = reset
            .and_then(|value| value.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let Some(reset_at) = reset_at else {
            debug!(header = ?reset, "Rate limited without usable reset header");
            return fallback;
        };

        let until_reset = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        (until_reset + self.config.rate_limit_margin).min(MAX_RATE_LIMIT_WAIT)
    }
}
