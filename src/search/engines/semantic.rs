//! Semantic search through the Exa API.

use serde::{Deserialize, Serialize};

use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use crate::search::types::SearchHit;

use super::SearchProvider;

/// Perform a semantic search.
///
/// An empty result list is reported as [`SearchError::NoResults`].
///
/// # Errors
/// Returns an error if the API key is missing, the request fails, the body
/// cannot be parsed or nothing was found.
pub async fn search(
    client: &reqwest::Client,
    query: &str,
    config: &SearchConfig,
) -> SearchResult<Vec<SearchHit>> {
    let api_key = config
        .api_keys
        .semantic
        .as_ref()
        .ok_or_else(|| SearchError::ApiKeyRequired(SearchProvider::Semantic.name().to_string()))?;

    let url = build_url(&config.semantic_base_url)?;
    let request = ExaRequest {
        query,
        num_results: config.semantic_num_results,
        contents: ExaContents { text: true },
    };

    let response = client
        .post(url)
        .header("x-api-key", api_key)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SearchError::RateLimited(60));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SearchError::AccessDenied("Invalid Exa API key".to_string()));
    }

    if !status.is_success() {
        return Err(SearchError::HttpStatus {
            provider: SearchProvider::Semantic.name(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    let hits = parse_response(&body)?;
    if hits.is_empty() {
        return Err(SearchError::NoResults(query.to_string()));
    }
    Ok(hits)
}

fn build_url(base_url: &str) -> SearchResult<url::Url> {
    let base = base_url.trim_end_matches('/');
    Ok(url::Url::parse(&format!("{base}/search"))?)
}

fn parse_response(body: &str) -> SearchResult<Vec<SearchHit>> {
    let response: ExaResponse = serde_json::from_str(body)?;
    Ok(response
        .results
        .into_iter()
        .map(|result| SearchHit {
            title: result.title.unwrap_or_default(),
            url: result.url,
            content: result.text.unwrap_or_default(),
            description: String::new(),
        })
        .collect())
}

// Exa API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    contents: ExaContents,
}

#[derive(Debug, Serialize)]
struct ExaContents {
    text: bool,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    title: Option<String>,
    url: String,
    text: Option<String>,
}
