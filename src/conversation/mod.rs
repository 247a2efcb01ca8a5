//! Streaming conversation orchestration.
//!
//! ## Architecture
//!
//! - `types`: messages, runs, tool calls and the [`StreamEvent`] enum
//! - `storage`: pluggable key-value persistence (memory, file-per-key)
//! - `transcript`: append-and-amend message log with retention pruning
//! - `reducer`: folds stream events into transcript mutations
//! - `dispatcher`: routes tool calls to search handlers, batches outputs
//! - `session`: thread identity and the bounded wait on active runs
//! - `driver`: one conversation turn end to end
//! - `recent`: recently submitted queries
//! - `maintenance`: background transcript pruning

pub mod dispatcher;
pub mod driver;
pub mod errors;
pub mod maintenance;
pub mod recent;
pub mod reducer;
pub mod session;
pub mod storage;
pub mod transcript;
pub mod types;

pub use dispatcher::{ToolDispatcher, ToolError, ToolHandler};
pub use driver::{
    Conversation, NoopObserver, SessionPhase, SharedTranscript, TranscriptObserver, TurnOutcome,
};
pub use errors::{SessionError, StorageError, TranscriptError};
pub use maintenance::{PruneConfig, PruneWorker};
pub use recent::RecentQueries;
pub use reducer::{Directive, StreamReducer};
pub use session::{Clock, PollPolicy, SessionManager, SystemClock, ThreadCache};
pub use storage::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use transcript::TranscriptStore;
pub use types::{Message, Role, Run, RunStatus, StreamEvent, ToolCall, ToolOutput};
