//! Background pruning of the transcript.
//!
//! Periodically drops messages that fell out of the retention window and
//! persists the shortened transcript.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::driver::SharedTranscript;
use super::errors::TranscriptResult;

/// Configuration for background pruning.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Interval between prune runs (in seconds).
    pub interval_seconds: u64,
    /// Whether background pruning is enabled.
    pub enabled: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600, // 1 hour
            enabled: true,
        }
    }
}

/// Statistics from a prune run.
#[derive(Debug, Clone, Default)]
pub struct PruneStats {
    /// Messages removed.
    pub removed: usize,
    /// Messages kept.
    pub remaining: usize,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Background worker pruning a shared transcript.
pub struct PruneWorker {
    transcript: SharedTranscript,
    config: PruneConfig,
    shutdown: Arc<Notify>,
}

impl PruneWorker {
    /// Create a new prune worker.
    #[must_use]
    pub fn new(transcript: SharedTranscript, config: PruneConfig) -> Self {
        Self {
            transcript,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Transcript pruning is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        info!(?interval, "Starting transcript prune worker");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match self.run_once(Utc::now()).await {
                        Ok(stats) if stats.removed > 0 => {
                            info!(
                                removed = stats.removed,
                                remaining = stats.remaining,
                                duration_ms = stats.duration_ms,
                                "Transcript pruned"
                            );
                        }
                        Ok(_) => debug!("Prune completed with nothing to remove"),
                        Err(err) => warn!(%err, "Transcript prune failed"),
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Transcript prune worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single prune cycle against `now`.
    ///
    /// The lock is held for this cycle only.
    ///
    /// # Errors
    /// Returns an error if the pruned transcript cannot be persisted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> TranscriptResult<PruneStats> {
        let start = Instant::now();
        let mut transcript = self.transcript.lock().await;
        let removed = transcript.prune(now);
        if removed > 0 {
            transcript.persist()?;
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        Ok(PruneStats {
            removed,
            remaining: transcript.len(),
            duration_ms,
        })
    }
}
