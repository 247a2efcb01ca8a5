//! Error types for the search module.

use thiserror::Error;

/// Errors that can occur while querying a search provider.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Provider answered with a non-success status.
    #[error("{provider} returned status: {status}")]
    HttpStatus {
        /// Provider display name.
        provider: &'static str,
        /// Returned status code.
        status: u16,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Provider returned no results.
    #[error("No results found for query: {0}")]
    NoResults(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    /// Access denied or key rejected.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// API key required but not configured.
    #[error("API key required for {0}")]
    ApiKeyRequired(String),

    /// Query was empty after trimming.
    #[error("Search query is empty")]
    EmptyQuery,
}

impl SearchError {
    /// Whether the error comes from local configuration rather than the provider.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::ApiKeyRequired(_) | Self::HttpClient(_))
    }
}

/// Convenience result alias for search operations.
pub type SearchResult<T> = Result<T, SearchError>;
