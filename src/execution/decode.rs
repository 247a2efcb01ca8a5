//! Translates Assistants-v2 stream frames into [`StreamEvent`]s.
//!
//! The wire protocol reports message and run-step deltas keyed by content
//! index; the first delta seen for an index is what marks a new text
//! segment or tool invocation.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::conversation::types::{Annotation, Run, StreamEvent, ToolKind};

use super::sse::SseEvent;
use super::{ExecutionError, ExecutionResult};

/// Stateful decoder for one run stream.
#[derive(Debug, Default)]
pub struct AssistantsDecoder {
    seen_content: HashSet<(String, u32)>,
    seen_tool_calls: HashSet<(String, u32)>,
    finished: bool,
}

impl AssistantsDecoder {
    /// Create a decoder for a fresh stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `done` frame has been seen.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode one frame into zero or more events.
    ///
    /// # Errors
    /// Returns [`ExecutionError::Decode`] if a known frame carries malformed data.
    pub fn decode(&mut self, frame: &SseEvent) -> ExecutionResult<Vec<StreamEvent>> {
        let Some(name) = frame.event.as_deref() else {
            return Ok(Vec::new());
        };

        match name {
            "thread.message.delta" => self.message_delta(&frame.data),
            "thread.run.step.delta" => self.step_delta(&frame.data),
            "thread.run.requires_action" => {
                let run: Run = parse(&frame.data)?;
                Ok(vec![StreamEvent::RequiresAction { run }])
            }
            "thread.run.completed" => {
                let run: Run = parse(&frame.data)?;
                Ok(vec![StreamEvent::RunCompleted { run_id: run.id }])
            }
            "thread.run.failed"
            | "thread.run.cancelled"
            | "thread.run.expired"
            | "thread.run.incomplete" => {
                let run: Run = parse(&frame.data)?;
                let message = run
                    .last_error
                    .map_or_else(|| format!("run ended as {name}"), |err| err.message);
                Ok(vec![StreamEvent::RunFailed {
                    run_id: run.id,
                    message,
                }])
            }
            "error" => Ok(vec![StreamEvent::StreamError {
                message: error_message(&frame.data),
            }]),
            "done" => {
                self.finished = true;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn message_delta(&mut self, data: &str) -> ExecutionResult<Vec<StreamEvent>> {
        let delta: MessageDeltaFrame = parse(data)?;
        let mut events = Vec::new();

        for part in delta.delta.content {
            let first_seen = self.seen_content.insert((delta.id.clone(), part.index));
            match part.kind.as_str() {
                "text" => {
                    if first_seen {
                        events.push(StreamEvent::TextCreated);
                    }
                    let text = part.text.unwrap_or_default();
                    if text.value.is_some() || !text.annotations.is_empty() {
                        events.push(StreamEvent::TextDelta {
                            value: text.value,
                            annotations: text.annotations,
                        });
                    }
                }
                "image_file" => {
                    if first_seen && let Some(image) = part.image_file {
                        events.push(StreamEvent::ImageFileDone {
                            file_id: image.file_id,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(events)
    }

    fn step_delta(&mut self, data: &str) -> ExecutionResult<Vec<StreamEvent>> {
        let delta: StepDeltaFrame = parse(data)?;
        let Some(details) = delta.delta.step_details else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for call in details.tool_calls {
            if self.seen_tool_calls.insert((delta.id.clone(), call.index)) {
                events.push(StreamEvent::ToolCallCreated { kind: call.kind });
            }
            let input = call.code_interpreter.and_then(|code| code.input);
            events.push(StreamEvent::ToolCallDelta {
                kind: call.kind,
                input,
            });
        }
        Ok(events)
    }
}

fn parse<T: for<'de> Deserialize<'de>>(data: &str) -> ExecutionResult<T> {
    serde_json::from_str(data).map_err(|err| ExecutionError::Decode(err.to_string()))
}

/// Pull a readable message out of an `error` frame, whatever its shape.
fn error_message(data: &str) -> String {
    let value: Value = serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()));
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map_or_else(
            || match &value {
                Value::String(raw) if !raw.is_empty() => raw.clone(),
                _ => "stream error".to_string(),
            },
            str::to_string,
        )
}

// Wire structures

#[derive(Debug, Deserialize)]
struct MessageDeltaFrame {
    id: String,
    delta: MessageDelta,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    content: Vec<ContentDelta>,
}

#[derive(Debug, Deserialize)]
struct ContentDelta {
    index: u32,
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextDelta>,
    image_file: Option<ImageFile>,
}

#[derive(Debug, Default, Deserialize)]
struct TextDelta {
    value: Option<String>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
struct ImageFile {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct StepDeltaFrame {
    id: String,
    delta: StepDelta,
}

#[derive(Debug, Deserialize)]
struct StepDelta {
    step_details: Option<StepDetails>,
}

#[derive(Debug, Deserialize)]
struct StepDetails {
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    #[serde(rename = "type")]
    kind: ToolKind,
    code_interpreter: Option<CodeInterpreterDelta>,
}

#[derive(Debug, Deserialize)]
struct CodeInterpreterDelta {
    input: Option<String>,
}
