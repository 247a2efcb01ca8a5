//! Drives one conversation turn end to end.
//!
//! `send` appends the user message, waits out any active run, streams the
//! new run through the [`StreamReducer`] and answers tool calls until the run
//! reaches a terminal event. Every exit path re-enables input.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::execution::{EventStream, ExecutionService};

use super::dispatcher::ToolDispatcher;
use super::errors::{SessionError, TranscriptResult};
use super::recent::RecentQueries;
use super::reducer::{Directive, StreamReducer};
use super::session::{SessionManager, ThreadCache};
use super::storage::KeyValueStore;
use super::transcript::TranscriptStore;
use super::types::{Role, StreamEvent, ToolCall};

/// Shown when the message could not be sent.
pub const SEND_ERROR_MESSAGE: &str = "An error occurred while sending the message. Please try again.";
/// Shown when tool outputs could not be submitted.
pub const ACTION_ERROR_MESSAGE: &str =
    "An error occurred while processing the request. Please try again.";
/// Shown when a previous run kept the thread busy past the wait deadline.
pub const ACTIVE_RUN_TIMEOUT_MESSAGE: &str =
    "The assistant is still busy with a previous request. Please try again in a moment.";

/// Transcript shared between the driver and the prune worker.
pub type SharedTranscript = Arc<Mutex<TranscriptStore>>;

/// Where the conversation currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for user input.
    #[default]
    Idle,
    /// Listing runs on the thread.
    CheckActiveRun,
    /// Polling a run that was already in progress.
    WaitForRun,
    /// Posting the user message and starting a run.
    SubmitMessage,
    /// Consuming run events.
    Streaming,
    /// Resolving and submitting a tool-output batch.
    AwaitingToolOutputs,
}

/// How a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The run completed.
    Completed,
    /// An error message was appended to the transcript.
    Failed,
    /// The stream closed without a terminal event.
    Ended,
    /// Nothing was sent: blank input, or input was disabled.
    Rejected,
}

/// Receives transcript changes while a turn is running.
pub trait TranscriptObserver: Send {
    /// Called after every transcript mutation.
    fn on_update(&mut self, _transcript: &TranscriptStore) {}

    /// Called when tool calls start (`true`) and when they settle (`false`).
    fn on_searching(&mut self, _active: bool) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TranscriptObserver for NoopObserver {}

#[derive(Debug)]
struct TurnState {
    phase: SessionPhase,
    input_enabled: bool,
}

impl TurnState {
    const IDLE: Self = Self {
        phase: SessionPhase::Idle,
        input_enabled: true,
    };
}

/// Holds input disabled for one turn; dropping it, including when the turn
/// future is cancelled, returns the conversation to idle.
struct TurnGuard<'a> {
    state: &'a StdMutex<TurnState>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = TurnState::IDLE;
    }
}

/// A single conversation with its persisted state.
pub struct Conversation<E: ?Sized> {
    session: SessionManager<E>,
    dispatcher: ToolDispatcher,
    reducer: StreamReducer,
    transcript: SharedTranscript,
    threads: ThreadCache,
    recent: RecentQueries,
    state: StdMutex<TurnState>,
}

impl<E: ExecutionService + ?Sized> Conversation<E> {
    /// Assemble a conversation; thread id and recent queries live in `storage`.
    #[must_use]
    pub fn new(
        session: SessionManager<E>,
        dispatcher: ToolDispatcher,
        transcript: TranscriptStore,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            session,
            dispatcher,
            reducer: StreamReducer::default(),
            transcript: Arc::new(Mutex::new(transcript)),
            threads: ThreadCache::new(Arc::clone(&storage)),
            recent: RecentQueries::new(storage),
            state: StdMutex::new(TurnState::IDLE),
        }
    }

    /// Replace the stream reducer.
    #[must_use]
    pub fn with_reducer(mut self, reducer: StreamReducer) -> Self {
        self.reducer = reducer;
        self
    }

    /// Handle to the transcript.
    #[must_use]
    pub fn transcript(&self) -> SharedTranscript {
        Arc::clone(&self.transcript)
    }

    /// Recent queries list.
    #[must_use]
    pub const fn recent(&self) -> &RecentQueries {
        &self.recent
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.lock_state().phase
    }

    /// Whether a new message may be sent.
    #[must_use]
    pub fn is_input_enabled(&self) -> bool {
        self.lock_state().input_enabled
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TurnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.lock_state().phase = phase;
    }

    /// Disable input for a turn; `None` if a turn already holds it.
    fn begin_turn(&self) -> Option<TurnGuard<'_>> {
        let mut state = self.lock_state();
        if !state.input_enabled {
            return None;
        }
        state.input_enabled = false;
        Some(TurnGuard { state: &self.state })
    }

    /// Send `text` and drive the run to its end.
    ///
    /// Failures are reported in the transcript, never returned. A second
    /// `send` while a turn is running is rejected.
    pub async fn send(&self, text: &str, observer: &mut dyn TranscriptObserver) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Rejected;
        }
        let Some(turn) = self.begin_turn() else {
            return TurnOutcome::Rejected;
        };

        let mut transcript = self.transcript.lock().await;
        transcript.append(Role::User, text);
        checkpoint(&transcript);
        observer.on_update(&transcript);

        if let Err(err) = self.recent.record(text) {
            warn!(%err, "Failed to record recent query");
        }

        let outcome = self.run_turn(&mut transcript, text, observer).await;
        debug!(?outcome, "Turn finished");

        drop(turn);
        checkpoint(&transcript);
        observer.on_update(&transcript);
        outcome
    }

    async fn run_turn(
        &self,
        transcript: &mut TranscriptStore,
        text: &str,
        observer: &mut dyn TranscriptObserver,
    ) -> TurnOutcome {
        let (thread_id, mut stream) = match self.open_run(text).await {
            Ok(opened) => opened,
            Err(err) => {
                warn!(%err, "Failed to send message");
                let message = match err {
                    SessionError::ActiveRunTimeout { .. } => ACTIVE_RUN_TIMEOUT_MESSAGE,
                    _ => SEND_ERROR_MESSAGE,
                };
                transcript.append(Role::Assistant, message);
                return TurnOutcome::Failed;
            }
        };

        loop {
            self.set_phase(SessionPhase::Streaming);
            let Some(directive) = self.consume(transcript, &mut stream, observer).await else {
                warn!(%thread_id, "Run stream ended without a terminal event");
                return TurnOutcome::Ended;
            };

            match directive {
                Directive::ResolveToolCalls { run_id, tool_calls } => {
                    self.set_phase(SessionPhase::AwaitingToolOutputs);
                    checkpoint(transcript);
                    match self
                        .resolve_and_submit(&thread_id, &run_id, &tool_calls, observer)
                        .await
                    {
                        Ok(resumed) => stream = resumed,
                        Err(err) => {
                            warn!(%run_id, %err, "Failed to submit tool outputs");
                            transcript.append(Role::Assistant, ACTION_ERROR_MESSAGE);
                            return TurnOutcome::Failed;
                        }
                    }
                }
                Directive::Completed => return TurnOutcome::Completed,
                Directive::Failed => return TurnOutcome::Failed,
                Directive::Continue => {}
            }
        }
    }

    async fn open_run(&self, text: &str) -> Result<(String, EventStream), SessionError> {
        self.set_phase(SessionPhase::CheckActiveRun);
        let thread_id = self.session.ensure_thread(&self.threads).await?;

        if let Some(run) = self.session.active_run(&thread_id).await? {
            self.set_phase(SessionPhase::WaitForRun);
            self.session.wait_for_run(&thread_id, &run).await?;
        }

        self.set_phase(SessionPhase::SubmitMessage);
        let stream = self.session.start_run(&thread_id, text).await?;
        Ok((thread_id, stream))
    }

    /// Apply events until one needs the driver; `None` if the stream closed first.
    async fn consume(
        &self,
        transcript: &mut TranscriptStore,
        stream: &mut EventStream,
        observer: &mut dyn TranscriptObserver,
    ) -> Option<Directive> {
        while let Some(item) = stream.next().await {
            let event = item.unwrap_or_else(|err| StreamEvent::StreamError {
                message: err.to_string(),
            });
            let directive = self.reducer.apply(transcript, event);
            observer.on_update(transcript);
            if directive != Directive::Continue {
                return Some(directive);
            }
        }
        None
    }

    async fn resolve_and_submit(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_calls: &[ToolCall],
        observer: &mut dyn TranscriptObserver,
    ) -> Result<EventStream, SessionError> {
        info!(%run_id, calls = tool_calls.len(), "Resolving tool calls");
        observer.on_searching(true);
        let outputs = self.dispatcher.resolve_batch(tool_calls).await;
        observer.on_searching(false);
        self.session
            .submit_tool_outputs(thread_id, run_id, &outputs)
            .await
    }

    /// Forget the thread and the transcript; the next message starts a new thread.
    ///
    /// # Errors
    /// Returns an error if storage fails.
    pub async fn reset(&mut self) -> TranscriptResult<()> {
        self.transcript.lock().await.clear()?;
        self.threads.clear()?;
        *self.lock_state() = TurnState::IDLE;
        info!("Conversation reset");
        Ok(())
    }
}

fn checkpoint(transcript: &TranscriptStore) {
    if let Err(err) = transcript.persist() {
        warn!(%err, "Failed to persist transcript");
    }
}
