//! Folds execution-service stream events into transcript mutations.

use tracing::{debug, warn};

use super::errors::TranscriptResult;
use super::transcript::TranscriptStore;
use super::types::{Annotation, Role, StreamEvent, ToolCall, ToolKind};

/// Shown when the stream fails or an event cannot be applied.
pub const STREAM_ERROR_MESSAGE: &str =
    "An error occurred while processing the response. Please try again.";

/// Default route prefix for generated files.
pub const DEFAULT_FILE_ROUTE: &str = "/files";

/// What the driver must do after an event has been applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Directive {
    /// Keep reading the stream.
    Continue,
    /// Input stays disabled; resolve these calls and submit them as one batch.
    ResolveToolCalls {
        /// Paused run.
        run_id: String,
        /// Calls to resolve.
        tool_calls: Vec<ToolCall>,
    },
    /// The run completed; re-enable input.
    Completed,
    /// A fallback error message was appended; re-enable input.
    Failed,
}

/// Stateless reducer over [`StreamEvent`]s.
#[derive(Clone, Debug)]
pub struct StreamReducer {
    file_route: String,
}

impl Default for StreamReducer {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_ROUTE)
    }
}

impl StreamReducer {
    /// Create a reducer that links generated files under `file_route`.
    #[must_use]
    pub fn new(file_route: impl Into<String>) -> Self {
        let file_route = file_route.into();
        Self {
            file_route: file_route.trim_end_matches('/').to_string(),
        }
    }

    /// Link to a generated file.
    #[must_use]
    pub fn file_link(&self, file_id: &str) -> String {
        format!("{}/{file_id}", self.file_route)
    }

    /// Apply one event to the transcript.
    ///
    /// Never fails: a mutation that cannot be applied appends the fallback
    /// error message and returns [`Directive::Failed`].
    pub fn apply(&self, transcript: &mut TranscriptStore, event: StreamEvent) -> Directive {
        match self.try_apply(transcript, event) {
            Ok(directive) => directive,
            Err(err) => {
                warn!(%err, "Failed to apply stream event");
                transcript.append(Role::Assistant, STREAM_ERROR_MESSAGE);
                Directive::Failed
            }
        }
    }

    fn try_apply(
        &self,
        transcript: &mut TranscriptStore,
        event: StreamEvent,
    ) -> TranscriptResult<Directive> {
        match event {
            StreamEvent::TextCreated => {
                transcript.append(Role::Assistant, "");
            }
            StreamEvent::TextDelta { value, annotations } => {
                if let Some(value) = value {
                    transcript.append_to_last(&value)?;
                }
                if !annotations.is_empty() {
                    transcript.rewrite_last(|text| self.resolve_annotations(text, &annotations))?;
                }
            }
            StreamEvent::ImageFileDone { file_id } => {
                let link = self.file_link(&file_id);
                transcript.append_to_last(&format!("\n![{file_id}]({link})\n"))?;
            }
            StreamEvent::ToolCallCreated { kind } => {
                if kind == ToolKind::CodeInterpreter {
                    transcript.append(Role::Code, "");
                }
            }
            StreamEvent::ToolCallDelta { kind, input } => {
                if kind == ToolKind::CodeInterpreter
                    && let Some(input) = input
                {
                    transcript.append_to_last(&input)?;
                }
            }
            StreamEvent::RequiresAction { run } => {
                debug!(run_id = %run.id, calls = run.tool_calls().len(), "Run requires action");
                let tool_calls = run.tool_calls().to_vec();
                return Ok(Directive::ResolveToolCalls {
                    run_id: run.id,
                    tool_calls,
                });
            }
            StreamEvent::RunCompleted { run_id } => {
                debug!(%run_id, "Run completed");
                return Ok(Directive::Completed);
            }
            StreamEvent::RunFailed { run_id, message } => {
                warn!(%run_id, %message, "Run ended without completing");
                transcript.append(Role::Assistant, STREAM_ERROR_MESSAGE);
                return Ok(Directive::Failed);
            }
            StreamEvent::StreamError { message } => {
                warn!(%message, "Stream error");
                transcript.append(Role::Assistant, STREAM_ERROR_MESSAGE);
                return Ok(Directive::Failed);
            }
        }
        Ok(Directive::Continue)
    }

    /// Rewrite every `file_path` marker in `text` to its download link.
    #[must_use]
    pub fn resolve_annotations(&self, text: &str, annotations: &[Annotation]) -> String {
        annotations
            .iter()
            .fold(text.to_string(), |acc, annotation| match annotation {
                Annotation::FilePath { text, file_path } if !text.is_empty() => {
                    acc.replace(text.as_str(), &self.file_link(&file_path.file_id))
                }
                _ => acc,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;
    use crate::conversation::storage::MemoryKvStore;
    use crate::conversation::types::{FileRef, Run};

    fn transcript() -> TranscriptStore {
        TranscriptStore::new(Arc::new(MemoryKvStore::new()), TimeDelta::hours(12))
    }

    fn fold(reducer: &StreamReducer, transcript: &mut TranscriptStore, events: Vec<StreamEvent>) -> Vec<Directive> {
        events
            .into_iter()
            .map(|event| reducer.apply(transcript, event))
            .collect()
    }

    #[test]
    fn test_deltas_concatenate_into_last_message() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();
        transcript.append(Role::User, "Who covers AI at TechCrunch?");

        let directives = fold(
            &reducer,
            &mut transcript,
            vec![
                StreamEvent::TextCreated,
                StreamEvent::text("Here"),
                StreamEvent::text(" are"),
                StreamEvent::text(" three journalists..."),
                StreamEvent::RunCompleted {
                    run_id: "run_1".to_string(),
                },
            ],
        );

        assert_eq!(directives.last(), Some(&Directive::Completed));
        assert_eq!(transcript.len(), 2);
        assert_eq!(
            transcript.last().map(|m| m.text.as_str()),
            Some("Here are three journalists...")
        );
    }

    #[test]
    fn test_deltas_never_cross_message_boundaries() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();

        fold(
            &reducer,
            &mut transcript,
            vec![
                StreamEvent::TextCreated,
                StreamEvent::text("first"),
                StreamEvent::ToolCallCreated {
                    kind: ToolKind::CodeInterpreter,
                },
                StreamEvent::ToolCallDelta {
                    kind: ToolKind::CodeInterpreter,
                    input: Some("print(1)".to_string()),
                },
                StreamEvent::ToolCallDelta {
                    kind: ToolKind::Function,
                    input: Some("ignored".to_string()),
                },
                StreamEvent::TextCreated,
                StreamEvent::text("second"),
            ],
        );

        let got: Vec<(Role, &str)> = transcript
            .messages()
            .iter()
            .map(|m| (m.role, m.text.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (Role::Assistant, "first"),
                (Role::Code, "print(1)"),
                (Role::Assistant, "second"),
            ]
        );
    }

    #[test]
    fn test_non_code_tool_call_adds_no_message() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();
        let directive = reducer.apply(
            &mut transcript,
            StreamEvent::ToolCallCreated {
                kind: ToolKind::Function,
            },
        );
        assert_eq!(directive, Directive::Continue);
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_annotations_rewrite_after_delta() {
        let reducer = StreamReducer::new("/files/");
        let mut transcript = transcript();

        fold(
            &reducer,
            &mut transcript,
            vec![
                StreamEvent::TextCreated,
                StreamEvent::text("Download [the list](sandbox:/mnt/data/list.csv)"),
                StreamEvent::TextDelta {
                    value: Some(" now.".to_string()),
                    annotations: vec![
                        Annotation::FilePath {
                            text: "sandbox:/mnt/data/list.csv".to_string(),
                            file_path: FileRef {
                                file_id: "file_42".to_string(),
                            },
                        },
                        Annotation::Other,
                    ],
                },
            ],
        );

        assert_eq!(
            transcript.last().map(|m| m.text.as_str()),
            Some("Download [the list](/files/file_42) now.")
        );
    }

    #[test]
    fn test_image_reference_appended() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();
        fold(
            &reducer,
            &mut transcript,
            vec![
                StreamEvent::TextCreated,
                StreamEvent::ImageFileDone {
                    file_id: "file_img".to_string(),
                },
            ],
        );
        assert_eq!(
            transcript.last().map(|m| m.text.as_str()),
            Some("\n![file_img](/files/file_img)\n")
        );
    }

    #[test]
    fn test_requires_action_yields_tool_calls() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();
        let call = crate::conversation::types::ToolCall::function(
            "call_1",
            "search_web",
            r#"{"search_query":"AI reporters TechCrunch"}"#,
        );

        let directive = reducer.apply(
            &mut transcript,
            StreamEvent::RequiresAction {
                run: Run::requiring("run_1", vec![call.clone()]),
            },
        );

        assert_eq!(
            directive,
            Directive::ResolveToolCalls {
                run_id: "run_1".to_string(),
                tool_calls: vec![call],
            }
        );
    }

    #[test]
    fn test_stream_error_appends_fallback() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();
        let directive = reducer.apply(
            &mut transcript,
            StreamEvent::StreamError {
                message: "connection reset".to_string(),
            },
        );
        assert_eq!(directive, Directive::Failed);
        assert_eq!(
            transcript.last().map(|m| m.text.as_str()),
            Some(STREAM_ERROR_MESSAGE)
        );
    }

    #[test]
    fn test_delta_without_message_recovers() {
        let reducer = StreamReducer::default();
        let mut transcript = transcript();
        let directive = reducer.apply(&mut transcript, StreamEvent::text("orphan"));

        assert_eq!(directive, Directive::Failed);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].text, STREAM_ERROR_MESSAGE);
    }
}
