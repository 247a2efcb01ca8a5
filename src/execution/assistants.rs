//! Assistants-v2 HTTP client.
//!
//! Behaviour:
//! - Every request carries the bearer key and the `OpenAI-Beta: assistants=v2` header.
//! - Streaming endpoints are read on a background task: bytes go through
//!   [`SseParser`] and [`AssistantsDecoder`] and arrive on an unbounded channel.
//! - A read that stalls past `stream_read_timeout` ends the stream with an error.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::conversation::types::{Role, Run, StreamEvent, ToolOutput};

use super::decode::AssistantsDecoder;
use super::sse::{SseEvent, SseParser};
use super::{EventStream, ExecutionError, ExecutionResult, ExecutionService};

/// Default API base.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct AssistantsConfig {
    /// API base, without trailing slash.
    pub base_url: String,
    /// Bearer key.
    pub api_key: Option<String>,
    /// Timeout for non-streaming requests.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Longest gap tolerated between two stream chunks.
    pub stream_read_timeout: Duration,
}

impl Default for AssistantsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            stream_read_timeout: Duration::from_secs(120),
        }
    }
}

impl AssistantsConfig {
    /// Set the API base.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the bearer key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the stream read timeout.
    #[must_use]
    pub const fn with_stream_read_timeout(mut self, timeout: Duration) -> Self {
        self.stream_read_timeout = timeout;
        self
    }
}

/// [`ExecutionService`] backed by the Assistants-v2 REST API.
#[derive(Debug, Clone)]
pub struct AssistantsClient {
    config: AssistantsConfig,
    client: reqwest::Client,
}

impl AssistantsClient {
    /// Build a client.
    ///
    /// # Errors
    /// Returns [`ExecutionError::Config`] if no API key is set or the HTTP
    /// client cannot be created.
    pub fn new(config: AssistantsConfig) -> ExecutionResult<Self> {
        if config.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ExecutionError::Config("API key is required".to_string()));
        }

        // Per-request timeout is applied on non-streaming calls only.
        let client = reqwest::Client::builder()
            .user_agent(concat!("covers-agent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .build()
            .map_err(|e| ExecutionError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &AssistantsConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header(BETA_HEADER, BETA_VALUE);
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> ExecutionResult<T> {
        let response = builder.timeout(self.config.request_timeout).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn open_stream(&self, builder: reqwest::RequestBuilder) -> ExecutionResult<EventStream> {
        let response = builder.header("Accept", "text/event-stream").send().await?;
        let response = check_status(response).await?;

        let mut byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::unbounded::<ExecutionResult<StreamEvent>>();
        let read_timeout = self.config.stream_read_timeout;

        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut decoder = AssistantsDecoder::new();

            loop {
                let next = match tokio::time::timeout(read_timeout, byte_stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let _ = tx.unbounded_send(Err(ExecutionError::Stream(
                            "stream read timed out".to_string(),
                        )));
                        return;
                    }
                };
                let Some(item) = next else {
                    break;
                };
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let _ = tx.unbounded_send(Err(ExecutionError::Stream(err.to_string())));
                        return;
                    }
                };
                let frames = parser.push(&bytes);
                if forward(&frames, &mut decoder, &tx).is_err() {
                    return;
                }
                if decoder.is_finished() {
                    return;
                }
            }

            if let Some(frame) = parser.finish() {
                let _ = forward(&[frame], &mut decoder, &tx);
            }
            if !decoder.is_finished() {
                debug!("Run stream closed without a done frame");
            }
        });

        Ok(Box::pin(rx))
    }
}

/// Decode frames and push their events; `Err` means the receiver is gone.
fn forward(
    frames: &[SseEvent],
    decoder: &mut AssistantsDecoder,
    tx: &mpsc::UnboundedSender<ExecutionResult<StreamEvent>>,
) -> Result<(), ()> {
    for frame in frames {
        match decoder.decode(frame) {
            Ok(events) => {
                for event in events {
                    tx.unbounded_send(Ok(event)).map_err(|_| ())?;
                }
            }
            Err(err) => {
                warn!(event = ?frame.event, %err, "Undecodable stream frame");
                tx.unbounded_send(Err(err)).map_err(|_| ())?;
            }
        }
    }
    Ok(())
}

async fn check_status(response: reqwest::Response) -> ExecutionResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    Err(ExecutionError::HttpStatus {
        status: status.as_u16(),
        message: error_body_message(&raw),
    })
}

fn error_body_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| raw.to_string())
}

// Request/response structures

#[derive(Debug, Deserialize)]
struct ObjectId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    data: Vec<Run>,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRun<'a> {
    assistant_id: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputs<'a> {
    tool_outputs: &'a [ToolOutput],
    stream: bool,
}

#[async_trait]
impl ExecutionService for AssistantsClient {
    async fn create_thread(&self) -> ExecutionResult<String> {
        let created: ObjectId = self
            .send_json(self.request(reqwest::Method::POST, "/threads").json(&serde_json::json!({})))
            .await?;
        debug!(thread_id = %created.id, "Thread created");
        Ok(created.id)
    }

    async fn list_runs(&self, thread_id: &str) -> ExecutionResult<Vec<Run>> {
        let path = format!("/threads/{thread_id}/runs");
        let runs: RunList = self.send_json(self.request(reqwest::Method::GET, &path)).await?;
        Ok(runs.data)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> ExecutionResult<Run> {
        let path = format!("/threads/{thread_id}/runs/{run_id}");
        self.send_json(self.request(reqwest::Method::GET, &path)).await
    }

    async fn create_message(&self, thread_id: &str, role: Role, content: &str) -> ExecutionResult<()> {
        if role == Role::Code {
            return Err(ExecutionError::InvalidRequest(
                "code messages cannot be posted to a thread".to_string(),
            ));
        }
        let path = format!("/threads/{thread_id}/messages");
        let body = CreateMessage {
            role: role.as_str(),
            content,
        };
        let _: ObjectId = self
            .send_json(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn stream_run(&self, thread_id: &str, assistant_id: &str) -> ExecutionResult<EventStream> {
        let path = format!("/threads/{thread_id}/runs");
        let body = CreateRun {
            assistant_id,
            stream: true,
        };
        self.open_stream(self.request(reqwest::Method::POST, &path).json(&body))
            .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> ExecutionResult<EventStream> {
        let path = format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs");
        let body = SubmitToolOutputs {
            tool_outputs: outputs,
            stream: true,
        };
        self.open_stream(self.request(reqwest::Method::POST, &path).json(&body))
            .await
    }

    async fn file_content(&self, file_id: &str) -> ExecutionResult<Vec<u8>> {
        let path = format!("/files/{file_id}/content");
        let response = self
            .request(reqwest::Method::GET, &path)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use futures::StreamExt;

    use super::*;
    use crate::conversation::types::RunStatus;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> AssistantsClient {
        AssistantsClient::new(
            AssistantsConfig::default()
                .with_base_url(format!("http://{addr}/"))
                .with_api_key("sk-test"),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = AssistantsClient::new(AssistantsConfig::default());
        assert!(matches!(err, Err(ExecutionError::Config(_))));
    }

    #[tokio::test]
    async fn test_create_thread_sends_beta_header() {
        let addr = serve(Router::new().route(
            "/threads",
            post(|headers: HeaderMap| async move {
                let beta = headers.get("OpenAI-Beta").and_then(|v| v.to_str().ok());
                let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
                if beta == Some("assistants=v2") && auth == Some("Bearer sk-test") {
                    (StatusCode::OK, axum::Json(serde_json::json!({"id": "thread_abc"})))
                } else {
                    (StatusCode::BAD_REQUEST, axum::Json(serde_json::json!({"error": {"message": "missing headers"}})))
                }
            }),
        ))
        .await;

        let thread_id = client_for(addr).create_thread().await.unwrap();
        assert_eq!(thread_id, "thread_abc");
    }

    #[tokio::test]
    async fn test_list_runs_and_error_body() {
        let addr = serve(
            Router::new()
                .route(
                    "/threads/{thread_id}/runs",
                    get(|Path(thread_id): Path<String>| async move {
                        axum::Json(serde_json::json!({
                            "data": [{"id": "run_1", "status": "in_progress", "thread_id": thread_id}]
                        }))
                    }),
                )
                .route(
                    "/threads/{thread_id}/runs/{run_id}",
                    get(|| async {
                        (
                            StatusCode::NOT_FOUND,
                            axum::Json(serde_json::json!({"error": {"message": "No run found"}})),
                        )
                    }),
                ),
        )
        .await;
        let client = client_for(addr);

        let runs = client.list_runs("thread_1").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::InProgress);

        let err = client.get_run("thread_1", "run_x").await.unwrap_err();
        match err {
            ExecutionError::HttpStatus { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No run found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_code_role_is_rejected_locally() {
        let client = client_for("127.0.0.1:9".parse().unwrap());
        let err = client.create_message("thread_1", Role::Code, "print(1)").await;
        assert!(matches!(err, Err(ExecutionError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stream_run_decodes_events() {
        let body = concat!(
            "event: thread.run.created\n",
            "data: {\"id\":\"run_1\",\"status\":\"queued\"}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Hello\"}}]}}\n\n",
            "event: thread.run.completed\n",
            "data: {\"id\":\"run_1\",\"status\":\"completed\"}\n\n",
            "event: done\n",
            "data: [DONE]\n\n",
        );
        let addr = serve(Router::new().route(
            "/threads/{thread_id}/runs",
            post(move || async move { ([("content-type", "text/event-stream")], body) }),
        ))
        .await;

        let stream = client_for(addr).stream_run("thread_1", "asst_1").await.unwrap();
        let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextCreated,
                StreamEvent::text("Hello"),
                StreamEvent::RunCompleted {
                    run_id: "run_1".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_file_content_bytes() {
        let addr = serve(Router::new().route(
            "/files/{file_id}/content",
            get(|Path(file_id): Path<String>| async move { format!("bytes of {file_id}") }),
        ))
        .await;

        let bytes = client_for(addr).file_content("file_1").await.unwrap();
        assert_eq!(bytes, b"bytes of file_1");
    }
}
