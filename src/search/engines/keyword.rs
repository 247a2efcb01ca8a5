//! Keyword web search through the Jina reader search API.
//!
//! `GET {base}/{query}` with a bearer key, answering
//! `{ "data": [{ "title", "url", "content", "description" }] }`.

use serde::Deserialize;

use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use crate::search::types::SearchHit;

use super::SearchProvider;

/// Perform a keyword search.
///
/// # Errors
/// Returns an error if the API key is missing, the request fails or the
/// body cannot be parsed.
pub async fn search(
    client: &reqwest::Client,
    query: &str,
    config: &SearchConfig,
) -> SearchResult<Vec<SearchHit>> {
    let api_key = config
        .api_keys
        .keyword
        .as_ref()
        .ok_or_else(|| SearchError::ApiKeyRequired(SearchProvider::Keyword.name().to_string()))?;

    let url = build_url(&config.keyword_base_url, query)?;
    tracing::debug!(%url, "Sending keyword search request");

    let response = client
        .get(url)
        .header("Accept", "application/json")
        .bearer_auth(api_key)
        .send()
        .await?;

    let status = response.status();
    tracing::debug!(status = status.as_u16(), "Keyword search response");

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SearchError::RateLimited(60));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(SearchError::AccessDenied("Invalid Jina API key".to_string()));
    }

    if !status.is_success() {
        return Err(SearchError::HttpStatus {
            provider: SearchProvider::Keyword.name(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    parse_response(&body)
}

/// Build the request URL: the whole query is one encoded path segment.
fn build_url(base_url: &str, query: &str) -> SearchResult<url::Url> {
    let encoded = urlencoding::encode(query);
    let base = base_url.trim_end_matches('/');
    Ok(url::Url::parse(&format!("{base}/{encoded}"))?)
}

/// Parse the API response body.
fn parse_response(body: &str) -> SearchResult<Vec<SearchHit>> {
    let response: JinaResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|item| SearchHit {
            title: item.title.unwrap_or_default(),
            url: item.url.unwrap_or_default(),
            content: item.content.unwrap_or_default(),
            description: item.description.unwrap_or_default(),
        })
        .collect())
}

// Jina API response structures

#[derive(Debug, Deserialize)]
struct JinaResponse {
    data: Option<Vec<JinaItem>>,
}

#[derive(Debug, Deserialize)]
struct JinaItem {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
    description: Option<String>,
}
