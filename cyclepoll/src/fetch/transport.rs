//! HTTP transport abstraction for testability.
//!
//! The fetch client sends every attempt through a [`Transport`], so tests can
//! script responses without a network and production code uses
//! [`ReqwestTransport`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::BytesMut;

use super::error::{FetchError, FetchResult};
use super::request::{ApiRequest, ApiResponse};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = FetchResult<ApiResponse>> + Send + 'a>>;

/// Performs a single HTTP exchange.
///
/// Implementations return any status as `Ok`; classifying it is the fetch
/// client's job. They should stop reading once the body passes
/// `max_body_bytes` and return [`FetchError::BodyTooLarge`].
pub trait Transport: Send + Sync {
    /// Sends `request` once.
    fn send<'a>(&'a self, request: &'a ApiRequest, max_body_bytes: usize) -> TransportFuture<'a>;
}

/// Transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> FetchResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest, max_body_bytes: usize) -> TransportFuture<'a> {
        Box::pin(async move {
            let url = request.to_url()?;
            let mut builder = self.client.get(url);
            for (name, value) in request.headers() {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let mut response = builder
                .send()
                .await
                .map_err(|e| FetchError::Transport(format!("Request failed: {}", e)))?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            if response
                .content_length()
                .is_some_and(|len| len > max_body_bytes as u64)
            {
                return Err(FetchError::BodyTooLarge {
                    limit: max_body_bytes,
                });
            }

            let mut body = BytesMut::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| FetchError::Transport(format!("Failed to read response: {}", e)))?
            {
                if body.len() + chunk.len() > max_body_bytes {
                    return Err(FetchError::BodyTooLarge {
                        limit: max_body_bytes,
                    });
                }
                body.extend_from_slice(&chunk);
            }

            Ok(ApiResponse {
                status,
                headers,
                body: body.freeze(),
            })
        })
    }
}
