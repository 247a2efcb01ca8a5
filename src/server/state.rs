//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::conversation::SessionManager;
use crate::execution::{AssistantsClient, ExecutionService};
use crate::search::SearchService;

/// Shared application state.
pub struct AppState {
    /// Thread and run operations against the execution service.
    pub session: SessionManager<dyn ExecutionService>,
    /// Search providers.
    pub search: Arc<SearchService>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(session: SessionManager<dyn ExecutionService>, search: Arc<SearchService>) -> Arc<Self> {
        Arc::new(Self { session, search })
    }

    /// Build the state from configuration.
    ///
    /// # Errors
    /// Returns an error if a client cannot be created or a required setting is missing.
    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let assistant_id = config.execution.require_assistant_id()?;
        let client = AssistantsClient::new(config.execution.assistants())
            .map_err(|e| format!("Failed to create execution client: {e}"))?;
        let service: Arc<dyn ExecutionService> = Arc::new(client);

        let session = SessionManager::new(service, assistant_id)
            .with_policy(config.session.poll_policy());
        let search = SearchService::new(config.search.clone())
            .map_err(|e| format!("Failed to create search service: {e}"))?;

        Ok(Self::new(session, Arc::new(search)))
    }
}
