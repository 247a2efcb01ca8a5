//! HTTP route handlers for the covers agent API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::conversation::types::{StreamEvent, ToolOutput};
use crate::execution::EventStream;
use crate::search::{SearchHit, SearchProvider};

use super::state::AppState;

const NDJSON: &str = "application/x-ndjson";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/threads", post(create_thread))
        .route("/threads/{thread_id}/messages", post(send_message))
        .route("/threads/{thread_id}/actions", post(submit_actions))
        .route("/search", post(search))
        .route("/files/{file_id}", get(file_content))
        .with_state(state)
}

/// Error body returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

/// Handler error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "covers-agent",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Created thread.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResponse {
    /// New thread id.
    pub thread_id: String,
}

async fn create_thread(State(state): State<Arc<AppState>>) -> Result<Json<ThreadResponse>, ApiError> {
    let thread_id = state.session.create_thread().await.map_err(|e| {
        error!(%e, "Failed to create thread");
        ApiError::internal(e.to_string())
    })?;
    Ok(Json(ThreadResponse { thread_id }))
}

/// New user message.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    /// Message text.
    #[serde(default)]
    pub content: Option<String>,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let content = request
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("content is required"))?;

    let events = state
        .session
        .submit_message(&thread_id, &content)
        .await
        .map_err(|e| {
            error!(%thread_id, %e, "Failed to send message");
            ApiError::internal(e.to_string())
        })?;
    Ok(ndjson(events))
}

/// Tool outputs for a paused run.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionsRequest {
    /// Paused run.
    #[serde(default)]
    pub run_id: String,
    /// Outputs, one per tool call.
    #[serde(default)]
    pub tool_call_outputs: Vec<ToolOutput>,
}

async fn submit_actions(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    payload: Result<Json<ActionsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    if request.run_id.trim().is_empty() {
        return Err(ApiError::bad_request("runId is required"));
    }

    let events = state
        .session
        .submit_tool_outputs(&thread_id, &request.run_id, &request.tool_call_outputs)
        .await
        .map_err(|e| {
            error!(%thread_id, run_id = %request.run_id, %e, "Failed to submit tool outputs");
            ApiError::internal(e.to_string())
        })?;
    Ok(ndjson(events))
}

/// Search request.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// The search query.
    #[serde(default)]
    pub search_query: Option<String>,
    /// Provider; the configured default when absent.
    #[serde(default)]
    pub provider: Option<SearchProvider>,
}

/// Keyword search answer.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Best page text, or a placeholder.
    pub result: String,
}

async fn search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let query = request
        .search_query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("search_query is required"))?;
    let provider = request
        .provider
        .unwrap_or(state.search.config().default_provider);

    match provider {
        SearchProvider::Keyword => {
            let result = state.search.web_search_text(&query).await.map_err(|e| {
                error!(%query, %e, "Keyword search failed");
                ApiError::internal("Failed to perform web search")
            })?;
            Ok(Json(SearchResponse { result }).into_response())
        }
        SearchProvider::Semantic => {
            let hits = state.search.search(provider, &query).await.map_err(|e| {
                warn!(%query, %e, "Semantic search failed");
                ApiError::internal(e.to_string())
            })?;
            Ok(text_stream(hits))
        }
    }
}

async fn file_content(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state
        .session
        .service()
        .file_content(&file_id)
        .await
        .map_err(|e| {
            error!(%file_id, %e, "Failed to fetch file");
            ApiError::internal(e.to_string())
        })?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

/// Relay run events as newline-delimited JSON; transport errors become `stream_error` lines.
fn ndjson(events: EventStream) -> Response {
    let lines = events.map(|item| {
        let event = item.unwrap_or_else(|err| StreamEvent::StreamError {
            message: err.to_string(),
        });
        let mut line = serde_json::to_vec(&event).unwrap_or_default();
        line.push(b'\n');
        Ok::<Bytes, Infallible>(Bytes::from(line))
    });

    let mut response = Body::from_stream(lines).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    response
}

/// Stream rendered hits as plain text, one chunk per hit.
fn text_stream(hits: Vec<SearchHit>) -> Response {
    let chunks = stream::iter(hits.into_iter().enumerate().map(|(i, hit)| {
        let chunk = if i == 0 {
            hit.render()
        } else {
            format!("\n\n{}", hit.render())
        };
        Ok::<Bytes, Infallible>(Bytes::from(chunk))
    }));

    let mut response = Body::from_stream(chunks).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::conversation::SessionManager;
    use crate::conversation::session::testing::{Call, FakeService, ManualClock};
    use crate::conversation::types::{RunStatus, ToolCall};
    use crate::execution::ExecutionService;
    use crate::search::SearchService;

    fn app(service: Arc<FakeService>) -> Router {
        let service: Arc<dyn ExecutionService> = service;
        let session = SessionManager::new(service, "asst_1").with_clock(Arc::new(ManualClock::new()));
        let search = Arc::new(SearchService::with_defaults().unwrap());
        create_router(AppState::new(session, search))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::new(FakeService::new()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_thread() {
        let response = app(Arc::new(FakeService::new()))
            .oneshot(post_json("/threads", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"threadId":"thread_1"}"#);
    }

    #[tokio::test]
    async fn test_message_streams_ndjson() {
        let service = Arc::new(FakeService::new());
        service.push_stream(vec![
            StreamEvent::TextCreated,
            StreamEvent::text("Hi"),
            StreamEvent::RunCompleted {
                run_id: "run_1".to_string(),
            },
        ]);
        let response = app(Arc::clone(&service))
            .oneshot(post_json(
                "/threads/thread_1/messages",
                serde_json::json!({"content": "Who covers AI?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/x-ndjson"
        );
        let body = body_string(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"event":"text_created"}"#);
        assert_eq!(lines[1], r#"{"event":"text_delta","value":"Hi"}"#);
        assert!(service.calls().contains(&Call::CreateMessage(
            "thread_1".to_string(),
            "Who covers AI?".to_string()
        )));
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected_before_any_call() {
        let service = Arc::new(FakeService::new());
        let response = app(Arc::clone(&service))
            .oneshot(post_json("/threads/thread_1/messages", serde_json::json!({"content": "  "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("content is required"));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let service = Arc::new(FakeService::new());
        let request = Request::builder()
            .method("POST")
            .uri("/threads/thread_1/messages")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app(Arc::clone(&service)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
        assert!(service.calls().is_empty());

        let request = Request::builder()
            .method("POST")
            .uri("/search")
            .body(Body::from(r#"{"search_query": "AI"}"#))
            .unwrap();
        let response = app(Arc::new(FakeService::new())).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.starts_with(r#"{"error":"#));
    }

    #[tokio::test]
    async fn test_busy_thread_is_a_server_error() {
        let service = Arc::new(FakeService::new().with_active_run("run_0", RunStatus::InProgress));
        let response = app(service)
            .oneshot(post_json("/threads/thread_1/messages", serde_json::json!({"content": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("error"));
    }

    #[tokio::test]
    async fn test_actions_submit_one_batch() {
        let service = Arc::new(FakeService::new());
        let call = ToolCall::function("call_1", "search_web", "{}");
        let response = app(Arc::clone(&service))
            .oneshot(post_json(
                "/threads/thread_1/actions",
                serde_json::json!({
                    "runId": "run_1",
                    "toolCallOutputs": [{"tool_call_id": call.id, "output": "Kyle Wiggers"}]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            service.calls(),
            vec![Call::SubmitToolOutputs(
                "run_1".to_string(),
                vec![ToolOutput {
                    tool_call_id: "call_1".to_string(),
                    output: "Kyle Wiggers".to_string()
                }]
            )]
        );
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let response = app(Arc::new(FakeService::new()))
            .oneshot(post_json("/search", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_without_key_fails() {
        let response = app(Arc::new(FakeService::new()))
            .oneshot(post_json("/search", serde_json::json!({"search_query": "AI at TechCrunch"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(response).await,
            r#"{"error":"Failed to perform web search"}"#
        );
    }

    #[tokio::test]
    async fn test_file_content() {
        let response = app(Arc::new(FakeService::new()))
            .oneshot(Request::builder().uri("/files/file_1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "contents of file_1");
    }
}
