//! Request and response values exchanged with a [`Transport`](super::Transport).

use std::collections::HashMap;

use bytes::Bytes;
use reqwest::Url;

use super::error::{FetchError, FetchResult};

/// A GET request against the content API.
///
/// Query parameters are kept separately from the base URL so the paginator
/// can substitute the cursor without reparsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    url: String,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    /// GET request to `url` with no parameters.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Sets a query parameter, replacing any existing value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Sets a query parameter in place, replacing any existing value.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }

    /// Appends a query parameter, allowing repeats (e.g. `id=1&id=2`).
    pub fn append_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds an `Authorization: Bearer` header.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    /// Adds a `Client-Id` header.
    pub fn with_client_id(self, client_id: &str) -> Self {
        self.with_header("Client-Id", client_id)
    }

    /// First value of parameter `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Base URL without query parameters.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query parameters in insertion order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Request headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Full URL with encoded query parameters.
    pub fn to_url(&self) -> FetchResult<Url> {
        Url::parse_with_params(&self.url, &self.params)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", self.url, e)))
    }
}

/// A raw response: status, lowercased headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Headers keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Response with `status` and `body` and no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header; the name is stored lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
