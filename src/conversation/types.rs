//! Core conversation model: transcript messages, runs, tool calls and stream events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a transcript message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant response text.
    Assistant,
    /// Code interpreter input, hidden when rendered.
    Code,
}

impl Role {
    /// Stable string form for storage and the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Code => "code",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "code" => Ok(Self::Code),
            _ => Err(value.to_string()),
        }
    }
}

/// One transcript entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message.
    pub role: Role,
    /// Accumulated text; grows while the message is streaming.
    pub text: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl Message {
    /// Build a message stamped with the given time.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: created_at.timestamp_millis(),
        }
    }
}

/// Lifecycle status of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting to start.
    Queued,
    /// Currently generating.
    InProgress,
    /// Paused until tool outputs are submitted.
    RequiresAction,
    /// Cancellation requested.
    Cancelling,
    /// Cancelled.
    Cancelled,
    /// Failed.
    Failed,
    /// Finished successfully.
    Completed,
    /// Ended before finishing.
    Incomplete,
    /// Expired before tool outputs arrived.
    Expired,
    /// A status this client does not know; never treated as in progress.
    #[serde(other)]
    Unknown,
}

/// Function invocation requested by the assistant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name, e.g. `search_web`.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// A tool call the client must resolve before the run can proceed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier echoed back with the output.
    pub id: String,
    /// The requested function.
    pub function: FunctionCall,
}

impl ToolCall {
    /// Build a function tool call.
    #[must_use]
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Tool calls awaiting outputs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubmitToolOutputs {
    /// Calls to resolve, all in one batch.
    pub tool_calls: Vec<ToolCall>,
}

/// Action a paused run is waiting for.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequiredAction {
    /// Pending tool outputs.
    pub submit_tool_outputs: SubmitToolOutputs,
}

/// Error details attached to a failed run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Provider error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
}

/// One execution attempt of the assistant against a thread.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: String,
    /// Current status.
    pub status: RunStatus,
    /// Present when `status` is `requires_action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_action: Option<RequiredAction>,
    /// Present when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RunError>,
}

impl Run {
    /// Build a run with no pending action.
    #[must_use]
    pub fn new(id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            status,
            required_action: None,
            last_error: None,
        }
    }

    /// Build a paused run carrying tool calls.
    #[must_use]
    pub fn requiring(id: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            id: id.into(),
            status: RunStatus::RequiresAction,
            required_action: Some(RequiredAction {
                submit_tool_outputs: SubmitToolOutputs { tool_calls },
            }),
            last_error: None,
        }
    }

    /// Tool calls awaiting outputs, empty if none.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.required_action
            .as_ref()
            .map_or(&[], |action| action.submit_tool_outputs.tool_calls.as_slice())
    }
}

/// Result of one resolved tool call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The call this output answers.
    pub tool_call_id: String,
    /// Output text handed back to the assistant.
    pub output: String,
}

/// Reference to a generated file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    /// File identifier.
    pub file_id: String,
}

/// Inline marker in streamed text.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// Sandbox path to a generated file, rewritten to a download link.
    FilePath {
        /// Marker text as it appears in the message.
        text: String,
        /// Referenced file.
        file_path: FileRef,
    },
    /// Citation of a retrieved file; left as is.
    FileCitation {
        /// Marker text as it appears in the message.
        text: String,
    },
    /// Any other annotation kind.
    #[serde(other)]
    Other,
}

/// Kind of tool a run step is using.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Long-running code execution.
    CodeInterpreter,
    /// Retrieval over uploaded files.
    FileSearch,
    /// Client-side function.
    Function,
    /// Unrecognised kind.
    #[serde(other)]
    Other,
}

/// A typed event from the execution service, in emission order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A new text segment started.
    TextCreated,
    /// Incremental text, optionally with annotations to resolve.
    TextDelta {
        /// Text to append.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        /// Markers to rewrite once the text has landed.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annotations: Vec<Annotation>,
    },
    /// An image file was produced.
    ImageFileDone {
        /// Produced file.
        file_id: String,
    },
    /// A tool invocation started.
    ToolCallCreated {
        /// Tool kind.
        kind: ToolKind,
    },
    /// Incremental tool invocation payload.
    ToolCallDelta {
        /// Tool kind.
        kind: ToolKind,
        /// Incremental code input, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
    /// The run paused for tool outputs.
    RequiresAction {
        /// The paused run with its tool calls.
        run: Run,
    },
    /// The run completed.
    RunCompleted {
        /// Completed run.
        run_id: String,
    },
    /// The run ended without completing.
    RunFailed {
        /// Failed run.
        run_id: String,
        /// Reason reported by the service.
        message: String,
    },
    /// The stream itself failed.
    StreamError {
        /// Error description.
        message: String,
    },
}

impl StreamEvent {
    /// Build a plain text delta.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::TextDelta {
            value: Some(value.into()),
            annotations: Vec::new(),
        }
    }
}
