//! Thread identity and run submission.
//!
//! A thread is created once and cached; before a new user message is posted
//! any run still `in_progress` on the thread is waited out with a bounded poll.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::execution::{EventStream, ExecutionService};

use super::errors::{SessionError, SessionResult, StorageResult};
use super::storage::{KeyValueStore, THREAD_ID_KEY};
use super::types::{Role, Run, RunStatus, ToolOutput};

/// Poll cadence and deadline for waiting out an active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two `get_run` polls.
    pub interval: Duration,
    /// Total wait before giving up.
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
        }
    }
}

/// Time source for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cached thread identity.
#[derive(Clone)]
pub struct ThreadCache {
    storage: Arc<dyn KeyValueStore>,
}

impl ThreadCache {
    /// Wrap a key-value store.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Cached thread id, if any.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn get(&self) -> StorageResult<Option<String>> {
        Ok(self
            .storage
            .load(THREAD_ID_KEY)?
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()))
    }

    /// Remember `thread_id`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    pub fn set(&self, thread_id: &str) -> StorageResult<()> {
        self.storage.save(THREAD_ID_KEY, thread_id)
    }

    /// Forget the cached thread.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    pub fn clear(&self) -> StorageResult<()> {
        self.storage.remove(THREAD_ID_KEY)
    }
}

/// Owns the conversation's view of the execution service.
pub struct SessionManager<E: ?Sized> {
    service: Arc<E>,
    assistant_id: String,
    policy: PollPolicy,
    clock: Arc<dyn Clock>,
}

impl<E: ExecutionService + ?Sized> SessionManager<E> {
    /// Create a manager using the system clock and the default poll policy.
    #[must_use]
    pub fn new(service: Arc<E>, assistant_id: impl Into<String>) -> Self {
        Self {
            service,
            assistant_id: assistant_id.into(),
            policy: PollPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the poll policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The execution service.
    #[must_use]
    pub fn service(&self) -> &Arc<E> {
        &self.service
    }

    /// The assistant every run is started with.
    #[must_use]
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// Create a fresh thread.
    ///
    /// # Errors
    /// Returns an error if the service call fails.
    pub async fn create_thread(&self) -> SessionResult<String> {
        let thread_id = self.service.create_thread().await?;
        info!(%thread_id, "Created conversation thread");
        Ok(thread_id)
    }

    /// Restore the cached thread, or create and cache one.
    ///
    /// # Errors
    /// Returns an error if the cache or the service fails.
    pub async fn ensure_thread(&self, cache: &ThreadCache) -> SessionResult<String> {
        if let Some(thread_id) = cache.get()? {
            debug!(%thread_id, "Restored conversation thread");
            return Ok(thread_id);
        }
        let thread_id = self.create_thread().await?;
        cache.set(&thread_id)?;
        Ok(thread_id)
    }

    /// The run currently `in_progress` on the thread, if any.
    ///
    /// # Errors
    /// Returns an error if the service call fails.
    pub async fn active_run(&self, thread_id: &str) -> SessionResult<Option<Run>> {
        let runs = self.service.list_runs(thread_id).await?;
        Ok(runs.into_iter().find(|run| run.status == RunStatus::InProgress))
    }

    /// Poll `run` until it leaves `in_progress`.
    ///
    /// # Errors
    /// Returns [`SessionError::ActiveRunTimeout`] if the run is still in
    /// progress after `max_wait`, or the service error.
    pub async fn wait_for_run(&self, thread_id: &str, run: &Run) -> SessionResult<()> {
        info!(%thread_id, run_id = %run.id, "Waiting for active run");
        let start = self.clock.now();
        loop {
            let waited = self.clock.now().saturating_duration_since(start);
            if waited >= self.policy.max_wait {
                warn!(%thread_id, run_id = %run.id, ?waited, "Active run did not finish in time");
                return Err(SessionError::ActiveRunTimeout {
                    run_id: run.id.clone(),
                    waited,
                });
            }

            let current = self.service.get_run(thread_id, &run.id).await?;
            if current.status != RunStatus::InProgress {
                debug!(run_id = %current.id, status = ?current.status, "Active run settled");
                return Ok(());
            }
            self.clock.sleep(self.policy.interval).await;
        }
    }

    /// Block until no run on the thread is `in_progress`.
    ///
    /// # Errors
    /// See [`Self::wait_for_run`].
    pub async fn wait_for_active_run(&self, thread_id: &str) -> SessionResult<()> {
        match self.active_run(thread_id).await? {
            Some(run) => self.wait_for_run(thread_id, &run).await,
            None => Ok(()),
        }
    }

    /// Post the user message and start a run, without checking for an active run.
    ///
    /// # Errors
    /// Returns an error if a service call fails.
    pub async fn start_run(&self, thread_id: &str, content: &str) -> SessionResult<EventStream> {
        self.service.create_message(thread_id, Role::User, content).await?;
        Ok(self.service.stream_run(thread_id, &self.assistant_id).await?)
    }

    /// Wait out any active run, post the user message and start a run.
    ///
    /// # Errors
    /// Returns an error if waiting times out or a service call fails; the
    /// message is not posted when waiting fails.
    pub async fn submit_message(&self, thread_id: &str, content: &str) -> SessionResult<EventStream> {
        self.wait_for_active_run(thread_id).await?;
        self.start_run(thread_id, content).await
    }

    /// Submit one batch of tool outputs and resume the run.
    ///
    /// # Errors
    /// Returns an error if the service call fails.
    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> SessionResult<EventStream> {
        debug!(%run_id, outputs = outputs.len(), "Submitting tool outputs");
        Ok(self
            .service
            .submit_tool_outputs(thread_id, run_id, outputs)
            .await?)
    }
}
