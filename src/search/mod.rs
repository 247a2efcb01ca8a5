//! Web search for the assistant's tool calls.
//!
//! Two providers:
//! - keyword web search (Jina), answered with the best page text
//! - semantic search (Exa), answered with every hit rendered as text
//!
//! Results are cached with a TTL.

pub mod cache;
pub mod config;
pub mod engines;
pub mod error;
pub mod types;

pub use cache::SearchCache;
pub use config::{ApiKeys, CacheConfig, SearchConfig};
pub use engines::SearchProvider;
pub use error::{SearchError, SearchResult};
pub use types::{SearchHit, render_hits};

use std::sync::Arc;

use tracing::{debug, warn};

/// Main search service that coordinates providers and the cache.
pub struct SearchService {
    config: SearchConfig,
    cache: Arc<SearchCache>,
    client: reqwest::Client,
}

impl SearchService {
    /// Create a new search service with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: SearchConfig) -> SearchResult<Self> {
        let client = Self::build_client(&config)?;
        let cache = Arc::new(SearchCache::new(config.cache_config.clone()));

        Ok(Self {
            config,
            cache,
            client,
        })
    }

    /// Create a new search service with default configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> SearchResult<Self> {
        Self::new(SearchConfig::default())
    }

    fn build_client(config: &SearchConfig) -> SearchResult<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("covers-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| SearchError::HttpClient(e.to_string()))
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run `query` against `provider`, consulting the cache first.
    ///
    /// # Errors
    /// Returns an error if the query is empty or the provider fails.
    pub async fn search(
        &self,
        provider: SearchProvider,
        query: &str,
    ) -> SearchResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let cache_key = format!("{}:{query}", provider.cache_prefix());
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(%query, provider = provider.name(), "Cache hit for search");
            return Ok(cached);
        }

        let hits = match provider {
            SearchProvider::Keyword => engines::keyword::search(&self.client, query, &self.config).await?,
            SearchProvider::Semantic => {
                engines::semantic::search(&self.client, query, &self.config).await?
            }
        };

        self.cache.set(&cache_key, &hits);
        Ok(hits)
    }

    /// Keyword search rendered for the assistant.
    ///
    /// Provider failures are reported in the text (`Error searching for: …`)
    /// and an empty answer becomes `No results found for: …`; only local
    /// configuration problems are returned as errors.
    ///
    /// # Errors
    /// Returns an error if the query is empty or the provider is not configured.
    pub async fn web_search_text(&self, query: &str) -> SearchResult<String> {
        match self.search(SearchProvider::Keyword, query).await {
            Ok(hits) => Ok(hits
                .iter()
                .map(SearchHit::best_text)
                .find(|text| !text.trim().is_empty())
                .map_or_else(|| format!("No results found for: {query}"), str::to_string)),
            Err(err) if err.is_configuration() || matches!(err, SearchError::EmptyQuery) => Err(err),
            Err(err) => {
                warn!(%query, %err, "Keyword search failed");
                Ok(format!("Error searching for: {query}"))
            }
        }
    }

    /// Semantic search rendered as one text block.
    ///
    /// # Errors
    /// Returns an error if the provider fails or finds nothing.
    pub async fn semantic_text(&self, query: &str) -> SearchResult<String> {
        let hits = self.search(SearchProvider::Semantic, query).await?;
        Ok(render_hits(&hits))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::{get, post};

    use super::*;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    fn config_for(addr: SocketAddr) -> SearchConfig {
        SearchConfig::new()
            .with_keyword_api_key("jina-key")
            .with_semantic_api_key("exa-key")
            .with_keyword_base_url(format!("http://{addr}"))
            .with_semantic_base_url(format!("http://{addr}"))
    }

    #[test]
    fn test_service_creation() {
        let service = SearchService::with_defaults();
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn test_keyword_http_500_becomes_placeholder() {
        let addr = serve(Router::new().route(
            "/{query}",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let service = SearchService::new(config_for(addr)).unwrap();

        let text = service.web_search_text("AI reporters TechCrunch").await.unwrap();
        assert_eq!(text, "Error searching for: AI reporters TechCrunch");
    }

    #[tokio::test]
    async fn test_keyword_picks_first_content() {
        let addr = serve(Router::new().route(
            "/{query}",
            get(|| async {
                axum::Json(serde_json::json!({
                    "data": [
                        {"title": "Empty", "url": "https://a.example", "content": ""},
                        {"title": "TechCrunch AI", "url": "https://techcrunch.com/category/ai/", "content": "Kyle Wiggers covers AI."}
                    ]
                }))
            }),
        ))
        .await;
        let service = SearchService::new(config_for(addr)).unwrap();

        let text = service.web_search_text("AI at TechCrunch").await.unwrap();
        assert_eq!(text, "Kyle Wiggers covers AI.");
    }

    #[tokio::test]
    async fn test_keyword_empty_data_is_no_results() {
        let addr = serve(Router::new().route(
            "/{query}",
            get(|| async { axum::Json(serde_json::json!({ "data": [] })) }),
        ))
        .await;
        let service = SearchService::new(config_for(addr)).unwrap();

        let text = service.web_search_text("nobody").await.unwrap();
        assert_eq!(text, "No results found for: nobody");
    }

    #[tokio::test]
    async fn test_missing_key_is_an_error() {
        let service = SearchService::with_defaults().unwrap();
        let err = service.web_search_text("anything").await;
        assert!(matches!(err, Err(SearchError::ApiKeyRequired(_))));
    }

    #[tokio::test]
    async fn test_semantic_renders_and_caches() {
        let addr = serve(Router::new().route(
            "/search",
            post(|| async {
                axum::Json(serde_json::json!({
                    "results": [
                        {"title": "Mark Gurman", "url": "https://bloomberg.com/mg", "text": "Apple reporter"}
                    ]
                }))
            }),
        ))
        .await;
        let service = SearchService::new(config_for(addr)).unwrap();

        let text = service.semantic_text("who covers apple").await.unwrap();
        assert_eq!(text, "Mark Gurman\nhttps://bloomberg.com/mg\nApple reporter");
        assert_eq!(service.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_semantic_empty_is_explicit_error() {
        let addr = serve(Router::new().route(
            "/search",
            post(|| async { axum::Json(serde_json::json!({ "results": [] })) }),
        ))
        .await;
        let service = SearchService::new(config_for(addr)).unwrap();

        let err = service.semantic_text("nothing here").await;
        assert!(matches!(err, Err(SearchError::NoResults(_))));
    }
}
