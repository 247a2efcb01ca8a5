//! Configuration for the search module.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engines::SearchProvider;

/// Default keyword search endpoint (Jina reader search).
pub const DEFAULT_KEYWORD_BASE_URL: &str = "https://s.jina.ai";
/// Default semantic search endpoint (Exa).
pub const DEFAULT_SEMANTIC_BASE_URL: &str = "https://api.exa.ai";

/// Configuration for the search service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Provider used by the `/search` endpoint when none is requested.
    pub default_provider: SearchProvider,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Keyword search base URL.
    pub keyword_base_url: String,
    /// Semantic search base URL.
    pub semantic_base_url: String,
    /// Number of results requested from the semantic provider.
    pub semantic_num_results: usize,
    /// Cache configuration.
    pub cache_config: CacheConfig,
    /// API keys for the providers.
    pub api_keys: ApiKeys,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_provider: SearchProvider::Keyword,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            keyword_base_url: DEFAULT_KEYWORD_BASE_URL.to_string(),
            semantic_base_url: DEFAULT_SEMANTIC_BASE_URL.to_string(),
            semantic_num_results: 10,
            cache_config: CacheConfig::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

impl SearchConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default provider.
    #[must_use]
    pub const fn with_provider(mut self, provider: SearchProvider) -> Self {
        self.default_provider = provider;
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the keyword search API key.
    #[must_use]
    pub fn with_keyword_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_keys.keyword = Some(key.into());
        self
    }

    /// Set the semantic search API key.
    #[must_use]
    pub fn with_semantic_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_keys.semantic = Some(key.into());
        self
    }

    /// Point the keyword provider at another base URL.
    #[must_use]
    pub fn with_keyword_base_url(mut self, url: impl Into<String>) -> Self {
        self.keyword_base_url = url.into();
        self
    }

    /// Point the semantic provider at another base URL.
    #[must_use]
    pub fn with_semantic_base_url(mut self, url: impl Into<String>) -> Self {
        self.semantic_base_url = url.into();
        self
    }

    /// Replace the cache configuration.
    #[must_use]
    pub const fn with_cache(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }
}

/// Cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// TTL for search results (seconds).
    pub ttl_seconds: u64,
    /// Maximum cache size (number of entries).
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600, // 1 hour
            max_entries: 500,
        }
    }
}

impl CacheConfig {
    /// A cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// API keys for the search providers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Keyword search (Jina) API key.
    pub keyword: Option<String>,
    /// Semantic search (Exa) API key.
    pub semantic: Option<String>,
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
