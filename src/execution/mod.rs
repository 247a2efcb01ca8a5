//! Boundary to the assistant execution service.
//!
//! The service owns threads, runs and tool calls; the client observes a run
//! through an ordered [`EventStream`] of [`StreamEvent`]s.

pub mod assistants;
pub mod decode;
pub mod sse;

pub use assistants::{AssistantsClient, AssistantsConfig};

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::conversation::types::{Role, Run, StreamEvent, ToolOutput};

/// Execution service error.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    /// Service answered with a non-success status.
    #[error("execution service returned status {status}: {message}")]
    HttpStatus {
        /// Returned status code.
        status: u16,
        /// Error message from the body, or the raw body.
        message: String,
    },
    /// Response or stream payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Client configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// The event stream broke mid-way.
    #[error("stream error: {0}")]
    Stream(String),
}

impl From<serde_json::Error> for ExecutionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Convenience result alias for execution service operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Ordered events of one run.
pub type EventStream = BoxStream<'static, ExecutionResult<StreamEvent>>;

/// Assistant execution service.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Create a new conversation thread.
    async fn create_thread(&self) -> ExecutionResult<String>;

    /// List the runs of a thread, most recent first.
    async fn list_runs(&self, thread_id: &str) -> ExecutionResult<Vec<Run>>;

    /// Fetch one run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> ExecutionResult<Run>;

    /// Add a message to a thread.
    async fn create_message(&self, thread_id: &str, role: Role, content: &str)
    -> ExecutionResult<()>;

    /// Start a run of `assistant_id` on the thread and stream its events.
    async fn stream_run(&self, thread_id: &str, assistant_id: &str)
    -> ExecutionResult<EventStream>;

    /// Submit one batch of tool outputs and stream the resumed run.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> ExecutionResult<EventStream>;

    /// Download a generated file.
    async fn file_content(&self, file_id: &str) -> ExecutionResult<Vec<u8>>;
}
