//! Most-recent-first list of submitted queries.

use std::sync::Arc;

use tracing::warn;

use super::errors::TranscriptResult;
use super::storage::{KeyValueStore, RECENT_QUERIES_KEY};

/// Maximum number of remembered queries.
pub const MAX_RECENT_QUERIES: usize = 20;

/// Persistent list of recent user queries.
pub struct RecentQueries {
    storage: Arc<dyn KeyValueStore>,
    limit: usize,
}

impl RecentQueries {
    /// Create a list capped at [`MAX_RECENT_QUERIES`].
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            limit: MAX_RECENT_QUERIES,
        }
    }

    /// Override the cap.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Stored queries, most recent first. A malformed stored list reads as empty.
    ///
    /// # Errors
    /// Returns an error if storage cannot be read.
    pub fn list(&self) -> TranscriptResult<Vec<String>> {
        let Some(raw) = self.storage.load(RECENT_QUERIES_KEY)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(%err, "Ignoring malformed recent queries");
            Vec::new()
        }))
    }

    /// Move `query` to the front, dropping duplicates and the oldest overflow.
    ///
    /// # Errors
    /// Returns an error if storage fails.
    pub fn record(&self, query: &str) -> TranscriptResult<()> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }

        let mut queries = self.list()?;
        queries.retain(|existing| existing != query);
        queries.insert(0, query.to_string());
        queries.truncate(self.limit);

        let raw = serde_json::to_string(&queries)?;
        self.storage.save(RECENT_QUERIES_KEY, &raw)?;
        Ok(())
    }
}
