// src/error.rs

use std::time::Duration;

/// Error types for external provider calls (search, extract, reasoning).
///
/// Every variant is recoverable from the orchestrator's point of view:
/// a failed call is recorded against its activity item and the loop
/// continues while budget remains.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Errors surfaced at session construction, before any loop iteration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("query too long: {got} chars (max {max})")]
    QueryTooLong { got: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Api("502 from upstream".into());
        assert!(err.to_string().contains("502"));

        let err = RequestError::QueryTooLong { got: 700, max: 500 };
        assert!(err.to_string().contains("700"));
    }
}
