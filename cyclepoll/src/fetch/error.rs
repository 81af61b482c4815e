//! Fetch error taxonomy.

use thiserror::Error;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors surfaced by the fetch client, paginator and adaptive fetcher.
///
/// Retryable responses (5xx, 429) never appear here directly: they are
/// retried internally and only surface as [`FetchError::NoAttemptsLeft`]
/// once the attempt budget is spent.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 401 from the API. Credentials are invalid; never retried.
    #[error("unauthorized")]
    Unauthorized,

    /// A status that is neither success nor retryable.
    #[error("unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    /// Every attempt got a retryable response.
    #[error("no attempts left after {attempts} attempts (last: {last})")]
    NoAttemptsLeft { attempts: u32, last: String },

    /// Response body exceeded the configured ceiling.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Successful status with no body.
    #[error("empty response body")]
    EmptyBody,

    /// The first page of a listing had no items.
    #[error("items empty")]
    ItemsEmpty,

    /// Body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Connection, timeout or other transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// True for responses that arrived but could not be used.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            FetchError::BodyTooLarge { .. }
                | FetchError::EmptyBody
                | FetchError::ItemsEmpty
                | FetchError::Decode(_)
        )
    }

    /// True when the attempt budget was spent on retryable responses.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchError::NoAttemptsLeft { .. })
    }

    /// True for a 401.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(FetchError::Unauthorized.is_unauthorized());
        assert!(FetchError::ItemsEmpty.is_malformed());
        assert!(FetchError::BodyTooLarge { limit: 1 }.is_malformed());
        assert!(!FetchError::UnexpectedStatus { status: 404 }.is_malformed());
        assert!(FetchError::NoAttemptsLeft {
            attempts: 3,
            last: "HTTP 503".to_string()
        }
        .is_exhausted());
    }

    #[test]
    fn test_display() {
        let err = FetchError::NoAttemptsLeft {
            attempts: 3,
            last: "HTTP 429".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no attempts left after 3 attempts (last: HTTP 429)"
        );
        assert_eq!(
            FetchError::UnexpectedStatus { status: 404 }.to_string(),
            "unexpected status 404"
        );
    }
}
