//! Resilient access to a rate-limited, cursor-paginated content API.
//!
//! # Layers
//!
//! ```text
//! AdaptiveFetcher   time windows, bisection while dense
//!       │
//! fetch_paginated   cursor loop, stop predicate
//!       │
//! FetchClient       retries: 5xx delay, 429 reset wait, size ceiling
//!       │
//! Transport         one HTTP exchange (reqwest, or scripted in tests)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cyclepoll::fetch::{AdaptiveConfig, AdaptiveFetcher, ApiRequest, FetchClient, FetchConfig, TimeWindow};
//!
//! let client = FetchClient::with_reqwest(FetchConfig::default())?;
//! let fetcher = AdaptiveFetcher::new(client, AdaptiveConfig::default());
//!
//! let base = ApiRequest::get("https://api.twitch.tv/helix/clips")
//!     .with_param("broadcaster_id", "141981764")
//!     .with_param("first", "100")
//!     .with_bearer(&token)
//!     .with_client_id(&client_id);
//! let clips: Vec<Clip> = fetcher.fetch(&base, TimeWindow::new(start, end)).await?;
//! ```

mod adaptive;
mod client;
mod error;
mod paginate;
mod policy;
mod request;
mod transport;

pub use adaptive::{
    dedup_by_id, AdaptiveConfig, AdaptiveFetcher, TimeWindow, WindowItem, DEFAULT_MAX_DEPTH,
    DEFAULT_VIEW_THRESHOLD, DEFAULT_WINDOW_SIZE, ENDED_AT_PARAM, MIN_SPLIT_MILLIS, STARTED_AT_PARAM,
};
pub use client::{
    FetchClient, FetchConfig, FetchResponse, DEFAULT_MAX_BODY_BYTES, DEFAULT_RATE_LIMIT_MARGIN,
    DEFAULT_RATE_LIMIT_RESET_HEADER,
};
pub use error::{FetchError, FetchResult};
pub use paginate::{Page, Paginated, Pagination, AFTER_PARAM};
pub use policy::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
pub use request::{ApiRequest, ApiResponse};
pub use transport::{ReqwestTransport, Transport, TransportFuture, DEFAULT_TIMEOUT_SECS};
