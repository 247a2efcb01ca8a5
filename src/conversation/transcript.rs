//! Ordered, append-and-amend transcript with bounded retention.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::errors::{TranscriptError, TranscriptResult};
use super::storage::{KeyValueStore, TRANSCRIPT_KEY};
use super::types::{Message, Role};

/// Drop every message created before `cutoff`, keeping the rest in order.
///
/// Returns the kept messages and how many were removed.
#[must_use]
pub fn prune_expired(messages: Vec<Message>, cutoff: DateTime<Utc>) -> (Vec<Message>, usize) {
    let cutoff_ms = cutoff.timestamp_millis();
    let before = messages.len();
    let kept: Vec<Message> = messages
        .into_iter()
        .filter(|message| message.created_at >= cutoff_ms)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// The conversation transcript as the user sees it.
///
/// Appends never reorder. `append_to_last` and `rewrite_last` always target
/// the tail and fail with [`TranscriptError::Empty`] on an empty transcript.
pub struct TranscriptStore {
    messages: Vec<Message>,
    storage: Arc<dyn KeyValueStore>,
    retention: TimeDelta,
}

impl TranscriptStore {
    /// Create an empty transcript backed by `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, retention: TimeDelta) -> Self {
        Self {
            messages: Vec::new(),
            storage,
            retention,
        }
    }

    /// Restore the persisted transcript, dropping entries outside the retention window.
    ///
    /// A persisted transcript that no longer decodes is discarded and the
    /// store starts empty.
    ///
    /// # Errors
    /// Returns an error if storage cannot be read.
    pub fn load(
        storage: Arc<dyn KeyValueStore>,
        retention: TimeDelta,
        now: DateTime<Utc>,
    ) -> TranscriptResult<Self> {
        let messages = match storage.load(TRANSCRIPT_KEY)? {
            Some(raw) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(%err, "Discarding malformed persisted transcript");
                    storage.remove(TRANSCRIPT_KEY)?;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut store = Self {
            messages,
            storage,
            retention,
        };
        let removed = store.prune(now);
        debug!(
            restored = store.messages.len(),
            removed, "Transcript loaded"
        );
        Ok(store)
    }

    /// Write the current transcript to storage.
    ///
    /// # Errors
    /// Returns an error if serialization or storage fails.
    pub fn persist(&self) -> TranscriptResult<()> {
        let raw = serde_json::to_string(&self.messages)?;
        self.storage.save(TRANSCRIPT_KEY, &raw)?;
        Ok(())
    }

    /// Append a new message stamped with the current time.
    pub fn append(&mut self, role: Role, text: impl Into<String>) {
        self.append_at(role, text, Utc::now());
    }

    /// Append a new message with an explicit creation time.
    pub fn append_at(&mut self, role: Role, text: impl Into<String>, created_at: DateTime<Utc>) {
        self.messages.push(Message::new(role, text, created_at));
    }

    /// Append text to the tail message.
    ///
    /// # Errors
    /// Returns [`TranscriptError::Empty`] if there is no message yet.
    pub fn append_to_last(&mut self, text: &str) -> TranscriptResult<()> {
        let last = self.messages.last_mut().ok_or(TranscriptError::Empty)?;
        last.text.push_str(text);
        Ok(())
    }

    /// Replace the tail message's text with `transform(current_text)`.
    ///
    /// # Errors
    /// Returns [`TranscriptError::Empty`] if there is no message yet.
    pub fn rewrite_last<F>(&mut self, transform: F) -> TranscriptResult<()>
    where
        F: FnOnce(&str) -> String,
    {
        let last = self.messages.last_mut().ok_or(TranscriptError::Empty)?;
        last.text = transform(&last.text);
        Ok(())
    }

    /// Drop messages older than the retention window as of `now`.
    ///
    /// Returns the number of removed messages. A window reaching past the
    /// earliest representable time keeps everything.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (kept, removed) = prune_expired(std::mem::take(&mut self.messages), cutoff);
        self.messages = kept;
        removed
    }

    /// Remove every message from memory and storage.
    ///
    /// # Errors
    /// Returns an error if storage cannot be written.
    pub fn clear(&mut self) -> TranscriptResult<()> {
        self.messages.clear();
        self.storage.remove(TRANSCRIPT_KEY)?;
        Ok(())
    }

    /// All messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The tail message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Retention window.
    #[must_use]
    pub const fn retention(&self) -> TimeDelta {
        self.retention
    }
}
