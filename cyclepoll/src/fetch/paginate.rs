//! Cursor pagination over list endpoints.
//!
//! List responses look like:
//!
//! ```json
//! { "data": [ ... ], "pagination": { "cursor": "eyJiIjpudWxs..." } }
//! ```
//!
//! The cursor is passed back in the `after` query parameter until the server
//! stops returning one or the caller's stop predicate fires.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::client::FetchClient;
use super::error::{FetchError, FetchResult};
use super::request::ApiRequest;

/// Query parameter carrying the continuation cursor.
pub const AFTER_PARAM: &str = "after";

/// One page of a list response.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,

    /// Continuation info.
    #[serde(default)]
    pub pagination: Pagination,
}

/// Continuation info of a page.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    /// Opaque cursor for the next page, absent or empty on the last page.
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Items gathered across pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    /// Every item seen, in page order, up to and including the one that
    /// stopped the scan.
    pub items: Vec<T>,

    /// Whether the stop predicate ended the scan.
    pub stopped: bool,

    /// Pages requested.
    pub pages: u32,
}

impl FetchClient {
    /// Fetches pages until `stop` returns true or the cursor runs out.
    ///
    /// `stop` is called for every item with the item and all items so far
    /// (including it). When it returns true the scan ends immediately, even
    /// mid-page, and no further request is made.
    ///
    /// # Errors
    ///
    /// [`FetchError::ItemsEmpty`] when the first page has no items, plus any
    /// error from [`FetchClient::execute`] or decoding.
    pub async fn fetch_paginated<T, P>(
        &self,
        request: &ApiRequest,
        mut stop: P,
    ) -> FetchResult<Paginated<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&T, &[T]) -> bool,
    {
        let mut request = request.clone();
        let mut items: Vec<T> = Vec::new();
        let mut pages = 0u32;
        let mut previous_cursor: Option<String> = None;

        loop {
            let response = self.execute(&request).await?;
            let page: Page<T> = response.json()?;
            pages += 1;

            if pages == 1 && page.data.is_empty() {
                return Err(FetchError::ItemsEmpty);
            }

            for item in page.data {
                items.push(item);
                let halt = items.last().is_some_and(|last| stop(last, &items));
                if halt {
                    debug!(url = request.url(), pages, items = items.len(), "Pagination stopped by predicate");
                    return Ok(Paginated {
                        items,
                        stopped: true,
                        pages,
                    });
                }
            }

            match page.pagination.cursor.filter(|c| !c.is_empty()) {
                Some(cursor) if previous_cursor.as_deref() != Some(cursor.as_str()) => {
                    request.set_param(AFTER_PARAM, cursor.as_str());
                    previous_cursor = Some(cursor);
                }
                Some(_) => {
                    debug!(url = request.url(), pages, "Server repeated cursor, ending pagination");
                    break;
                }
                None => break,
            }
        }

        debug!(url = request.url(), pages, items = items.len(), "Pagination complete");
        Ok(Paginated {
            items,
            stopped: false,
            pages,
        })
    }
}
