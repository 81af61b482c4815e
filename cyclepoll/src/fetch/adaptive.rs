//! Adaptive time-window fetching.
//!
//! List endpoints cap how many items a single time window can return. When a
//! window is denser than that cap, the only way to see everything is to ask
//! for smaller windows. The [`AdaptiveFetcher`] decides when to do so:
//!
//! ```text
//! fetch(window, depth)
//!   │
//!   ├─ paginate; each item's magnitude feeds a WindowedAverage
//!   │    └─ stop once the rolling average drops below the threshold
//!   │
//!   ├─ stopped by the threshold ──────────────► long tail reached, done
//!   ├─ pages ran out above threshold, depth < max
//!   │    └─ bisect: fetch(left, depth+1) ++ fetch(right, depth+1)
//!   └─ depth == max, or window too short ─────► accept what we have
//! ```
//!
//! Window bounds go on the wire with as much sub-second precision as they
//! carry, so every half is exactly half of its parent.
//!
//! Sub-window items are concatenated earlier half first. Items sitting on a
//! boundary timestamp can appear in both halves;
//! [`AdaptiveFetcher::fetch_deduplicated`] drops such repeats.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::client::FetchClient;
use super::error::{FetchError, FetchResult};
use super::request::ApiRequest;
use crate::stats::WindowedAverage;

/// Query parameter for the window start.
pub const STARTED_AT_PARAM: &str = "started_at";

/// Query parameter for the window end.
pub const ENDED_AT_PARAM: &str = "ended_at";

/// Default rolling-average threshold below which a scan stops.
pub const DEFAULT_VIEW_THRESHOLD: f64 = 5.0;

/// Default number of items in the rolling average.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default maximum bisection depth.
pub const DEFAULT_MAX_DEPTH: u32 = 4;

/// Shortest half a window may be split into, in milliseconds.
pub const MIN_SPLIT_MILLIS: i64 = 1;

/// An item returned by a windowed list endpoint.
pub trait WindowItem {
    /// Stable identity, used for deduplication.
    fn id(&self) -> &str;

    /// Density signal, e.g. a view count.
    fn magnitude(&self) -> f64;
}

/// Half-open time interval `[start, end)` with its bisection depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Number of bisections that produced this window.
    pub depth: u32,
}

impl TimeWindow {
    /// Top-level window at depth 0.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            depth: 0,
        }
    }

    /// Window length.
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether both halves would still span at least [`MIN_SPLIT_MILLIS`].
    pub fn can_bisect(&self) -> bool {
        self.duration() >= TimeDelta::milliseconds(2 * MIN_SPLIT_MILLIS)
    }

    /// Splits at the midpoint into two windows one level deeper.
    pub fn bisect(&self) -> (TimeWindow, TimeWindow) {
        let mid = self.start + self.duration() / 2;
        (
            TimeWindow {
                start: self.start,
                end: mid,
                depth: self.depth + 1,
            },
            TimeWindow {
                start: mid,
                end: self.end,
                depth: self.depth + 1,
            },
        )
    }

    /// Writes the window bounds onto `request` as RFC 3339 parameters.
    pub fn apply(&self, request: &ApiRequest) -> ApiRequest {
        request
            .clone()
            .with_param(
                STARTED_AT_PARAM,
                self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )
            .with_param(
                ENDED_AT_PARAM,
                self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )
    }
}

/// Configuration for an [`AdaptiveFetcher`].
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveConfig {
    /// Rolling average below which the scan stops.
    pub view_threshold: f64,

    /// Items in the rolling average.
    pub window_size: usize,

    /// Maximum bisection depth.
    pub max_depth: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            view_threshold: DEFAULT_VIEW_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AdaptiveConfig {
    /// Set the view threshold.
    pub fn with_view_threshold(mut self, threshold: f64) -> Self {
        self.view_threshold = threshold;
        self
    }

    /// Set the rolling window size.
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the maximum bisection depth.
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }
}

type WindowFuture<'a, T> = Pin<Box<dyn Future<Output = FetchResult<Vec<T>>> + Send + 'a>>;

/// Fetches a time window, bisecting it while it looks too dense.
#[derive(Debug, Clone)]
pub struct AdaptiveFetcher {
    client: FetchClient,
    config: AdaptiveConfig,
}

impl AdaptiveFetcher {
    /// Creates a fetcher over `client`.
    pub fn new(client: FetchClient, config: AdaptiveConfig) -> Self {
        Self { client, config }
    }

    /// Fetcher configuration.
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Fetches every item of `window` using `base` as the request template.
    ///
    /// # Errors
    ///
    /// [`FetchError::ItemsEmpty`] if `window` itself has no items. Any error
    /// from a sub-window aborts the whole fetch.
    pub async fn fetch<T>(&self, base: &ApiRequest, window: TimeWindow) -> FetchResult<Vec<T>>
    where
        T: DeserializeOwned + WindowItem + Send,
    {
        self.fetch_window(base, window, true).await
    }

    /// Like [`fetch`](Self::fetch), keeping only the first item per id.
    pub async fn fetch_deduplicated<T>(
        &self,
        base: &ApiRequest,
        window: TimeWindow,
    ) -> FetchResult<Vec<T>>
    where
        T: DeserializeOwned + WindowItem + Send,
    {
        let items = self.fetch(base, window).await?;
        Ok(dedup_by_id(items))
    }

    fn fetch_window<'a, T>(
        &'a self,
        base: &'a ApiRequest,
        window: TimeWindow,
        widest: bool,
    ) -> WindowFuture<'a, T>
    where
        T: DeserializeOwned + WindowItem + Send + 'a,
    {
        Box::pin(async move {
            let request = window.apply(base);
            let threshold = self.config.view_threshold;
            let mut average = WindowedAverage::new(self.config.window_size);

            let scan = self
                .client
                .fetch_paginated(&request, |item: &T, _: &[T]| {
                    average.put(item.magnitude());
                    average.average() < threshold
                })
                .await;

            let scan = match scan {
                Ok(scan) => scan,
                Err(FetchError::ItemsEmpty) if !widest => {
                    debug!(
                        start = %window.start,
                        end = %window.end,
                        depth = window.depth,
                        "Sub-window empty"
                    );
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };

            let likely_incomplete = !scan.stopped;
            if likely_incomplete && window.depth < self.config.max_depth && window.can_bisect() {
                let (left, right) = window.bisect();
                info!(
                    start = %window.start,
                    end = %window.end,
                    depth = window.depth,
                    items = scan.items.len(),
                    "Window still dense, bisecting"
                );
                let mut items = self.fetch_window(base, left, false).await?;
                items.extend(self.fetch_window(base, right, false).await?);
                return Ok(items);
            }

            debug!(
                start = %window.start,
                end = %window.end,
                depth = window.depth,
                items = scan.items.len(),
                pages = scan.pages,
                reached_tail = scan.stopped,
                "Window fetched"
            );
            Ok(scan.items)
        })
    }
}

/// Keeps the first item for each id, preserving order.
pub fn dedup_by_id<T: WindowItem>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.id().to_string()))
        .collect()
}
