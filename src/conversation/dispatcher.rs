//! Routes tool calls to their handlers and assembles output batches.
//!
//! Handler failures never escape: they are logged and turned into a
//! descriptive output string so one failing tool cannot block its batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::search::{SearchError, SearchService};

use super::types::{ToolCall, ToolOutput};

/// Keyword web search tool name.
pub const SEARCH_WEB_TOOL: &str = "search_web";
/// Semantic search tool name.
pub const SEMANTIC_SEARCH_TOOL: &str = "exa_researcher";

/// Tool invocation failure, rendered into the tool output.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments were not valid JSON or lacked a field.
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// What was wrong.
        reason: String,
    },
    /// A search collaborator failed.
    #[error("Error searching for: {query} ({source})")]
    Search {
        /// The query as requested.
        query: String,
        /// Underlying failure.
        #[source]
        source: SearchError,
    },
    /// No handler knows this function.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

/// A client-side tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute `call` and return the text handed back to the assistant.
    ///
    /// # Errors
    /// Returns an error if the tool fails; the dispatcher turns it into output text.
    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError>;
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    search_query: Option<String>,
}

/// Extract the `search_query` argument of a search tool call.
///
/// # Errors
/// Returns [`ToolError::InvalidArguments`] for malformed JSON or a missing/blank query.
pub fn search_query(call: &ToolCall) -> Result<String, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool: call.function.name.clone(),
        reason,
    };
    let args: SearchArgs =
        serde_json::from_str(&call.function.arguments).map_err(|err| invalid(err.to_string()))?;
    args.search_query
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .ok_or_else(|| invalid("missing search_query".to_string()))
}

/// Keyword web search over [`SearchService::web_search_text`].
pub struct WebSearchTool {
    search: Arc<SearchService>,
}

impl WebSearchTool {
    /// Wrap a search service.
    #[must_use]
    pub const fn new(search: Arc<SearchService>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let query = search_query(call)?;
        info!(%query, "Searching the web");
        self.search
            .web_search_text(&query)
            .await
            .map_err(|source| ToolError::Search { query, source })
    }
}

/// Semantic search over [`SearchService::semantic_text`].
pub struct SemanticSearchTool {
    search: Arc<SearchService>,
}

impl SemanticSearchTool {
    /// Wrap a search service.
    #[must_use]
    pub const fn new(search: Arc<SearchService>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl ToolHandler for SemanticSearchTool {
    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let query = search_query(call)?;
        info!(%query, "Running semantic search");
        self.search
            .semantic_text(&query)
            .await
            .map_err(|source| ToolError::Search { query, source })
    }
}

/// Fallback for functions the host did not register.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownFunction;

#[async_trait]
impl ToolHandler for UnknownFunction {
    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        Err(ToolError::UnknownFunction(call.function.name.clone()))
    }
}

/// Maps tool names to handlers.
pub struct ToolDispatcher {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    fallback: Arc<dyn ToolHandler>,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(UnknownFunction))
    }
}

impl ToolDispatcher {
    /// Create a dispatcher that sends unrouted calls to `fallback`.
    #[must_use]
    pub fn new(fallback: Arc<dyn ToolHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Create a dispatcher with both search tools registered.
    #[must_use]
    pub fn with_search(search: Arc<SearchService>, fallback: Arc<dyn ToolHandler>) -> Self {
        Self::new(fallback)
            .with_tool(SEARCH_WEB_TOOL, Arc::new(WebSearchTool::new(Arc::clone(&search))))
            .with_tool(SEMANTIC_SEARCH_TOOL, Arc::new(SemanticSearchTool::new(search)))
    }

    /// Route `name` to `handler`.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Resolve one call. Failures become the output text.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutput {
        let handler = self
            .handlers
            .get(&call.function.name)
            .unwrap_or(&self.fallback);

        let output = match handler.invoke(call).await {
            Ok(output) => output,
            Err(err) => {
                warn!(tool = %call.function.name, call_id = %call.id, %err, "Tool call failed");
                err.to_string()
            }
        };

        ToolOutput {
            tool_call_id: call.id.clone(),
            output,
        }
    }

    /// Resolve every call of one run concurrently.
    ///
    /// Returns only once all calls have settled, one output per call, in call order.
    pub async fn resolve_batch(&self, calls: &[ToolCall]) -> Vec<ToolOutput> {
        join_all(calls.iter().map(|call| self.dispatch(call))).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
            Ok(format!("echo:{}", search_query(call)?))
        }
    }

    struct Slow {
        delay: Duration,
        done: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for Slow {
        async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
            tokio::time::sleep(self.delay).await;
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(call.id.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl ToolHandler for Broken {
        async fn invoke(&self, _call: &ToolCall) -> Result<String, ToolError> {
            Err(ToolError::Search {
                query: "AI reporters TechCrunch".to_string(),
                source: SearchError::NoResults("AI reporters TechCrunch".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_routes_by_name_and_falls_back() {
        let dispatcher = ToolDispatcher::default().with_tool(SEARCH_WEB_TOOL, Arc::new(Echo));

        let routed = dispatcher
            .dispatch(&ToolCall::function("c1", SEARCH_WEB_TOOL, r#"{"search_query":"AI"}"#))
            .await;
        assert_eq!(routed.output, "echo:AI");
        assert_eq!(routed.tool_call_id, "c1");

        let fallback = dispatcher
            .dispatch(&ToolCall::function("c2", "get_weather", "{}"))
            .await;
        assert_eq!(fallback.output, "Unknown function: get_weather");
    }

    #[tokio::test]
    async fn test_failures_become_output_text() {
        let dispatcher = ToolDispatcher::default()
            .with_tool(SEARCH_WEB_TOOL, Arc::new(Echo))
            .with_tool(SEMANTIC_SEARCH_TOOL, Arc::new(Broken));

        let outputs = dispatcher
            .resolve_batch(&[
                ToolCall::function("c1", SEARCH_WEB_TOOL, "not json"),
                ToolCall::function("c2", SEARCH_WEB_TOOL, r#"{"search_query":"  "}"#),
                ToolCall::function("c3", SEMANTIC_SEARCH_TOOL, r#"{"search_query":"x"}"#),
            ])
            .await;

        assert_eq!(outputs.len(), 3);
        assert!(outputs[0].output.starts_with("Invalid arguments for search_web"));
        assert!(outputs[1].output.contains("missing search_query"));
        assert!(outputs[2].output.contains("Error searching for: AI reporters TechCrunch"));
    }

    #[tokio::test]
    async fn test_batch_waits_for_every_call_and_keeps_order() {
        let done = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(Slow {
            delay: Duration::from_millis(30),
            done: Arc::clone(&done),
        });
        let dispatcher = ToolDispatcher::new(slow);

        let calls: Vec<ToolCall> = (0..4)
            .map(|i| ToolCall::function(format!("call_{i}"), "lookup", "{}"))
            .collect();
        let outputs = dispatcher.resolve_batch(&calls).await;

        assert_eq!(done.load(Ordering::SeqCst), 4);
        let ids: Vec<&str> = outputs.iter().map(|o| o.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["call_0", "call_1", "call_2", "call_3"]);
        assert!(outputs.iter().all(|o| o.output == o.tool_call_id));
    }
}
