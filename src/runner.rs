//! Sequential batch driver for external assistant calls.
//!
//! Per item: `pending → (attempt 1..N) → {succeeded, exhausted}`. Exhausted
//! items are recorded and the run moves on; one bad item never aborts the
//! batch. Retries back off exponentially, successful calls are paced by a
//! fixed inter-request delay (skipped after the final item), and at most one
//! batch runs per process at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::client::ClientError;
use crate::types::{Query, ResponseRecord};

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("a batch is already running")]
    AlreadyRunning,
    #[error("batch status lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Attempts per item before it is recorded as exhausted.
    pub max_attempts: u32,
    /// Initial backoff after a failed attempt; doubles per retry.
    pub retry_delay: Duration,
    /// Fixed pause between successful calls.
    pub rate_limit_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(1),
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Single-query invocation, supplied by an external API client.
///
/// The runner treats failures opaquely: it retries on any error and records
/// the final error's display string, leaving interpretation to the caller.
#[async_trait]
pub trait QueryInvoker: Send + Sync {
    async fn invoke(&self, query_text: &str) -> Result<ResponseRecord, ClientError>;
}

/// Progress event emitted after each processed item.
#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub processed: usize,
    pub total: usize,
    pub query_id: u64,
    /// `None` when the item exhausted its retries.
    pub result: Option<ResponseRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("{0}")]
    Message(String),
}

/// Per-item side effects: incremental persistence, live progress display.
/// Observer failures are logged and do not stop the batch.
#[async_trait]
pub trait BatchObserver: Send + Sync {
    async fn on_item(&self, event: BatchEvent) -> Result<(), ObserverError>;
}

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Succeeded(ResponseRecord),
    Exhausted { attempts: u32, error: String },
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub query_id: u64,
    pub outcome: ItemOutcome,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Succeeded(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<ItemReport>,
}

impl BatchSummary {
    pub fn completion_message(&self) -> String {
        if self.failed == 0 {
            format!("SUCCESS: processed all {} queries", self.succeeded)
        } else if self.succeeded == 0 {
            format!("FAILED: all {} queries failed", self.total)
        } else {
            format!("PARTIAL: {} succeeded, {} failed", self.succeeded, self.failed)
        }
    }
}

// =============================================================================
// Run handle
// =============================================================================

/// Shared mutable status for the batch currently in flight, if any.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatus {
    pub running: bool,
    pub processed: usize,
    pub total: usize,
    pub current_query: Option<u64>,
    pub success_count: usize,
    pub error_count: usize,
    /// First few failure reasons, enough for a status display.
    pub recent_errors: Vec<String>,
    pub completed: bool,
    pub completion_message: Option<String>,
}

const RECENT_ERRORS_KEPT: usize = 3;

/// Guard object enforcing the single-active-run rule and owning the status
/// record that status queries snapshot.
///
/// Status reads are eventually consistent with the in-flight run; the store
/// is flushed per item, so a stale snapshot never implies lost results.
#[derive(Debug, Default)]
pub struct BatchRunHandle {
    active: AtomicBool,
    status: Mutex<BatchStatus>,
}

impl BatchRunHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Read-only snapshot of the current status.
    pub fn snapshot(&self) -> BatchStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Clear the completion banner after the caller has surfaced it.
    pub fn acknowledge_completion(&self) -> Result<(), RunnerError> {
        let mut status = self.status.lock().map_err(|_| RunnerError::Poisoned)?;
        status.completed = false;
        status.completion_message = None;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BatchStatus)) {
        if let Ok(mut status) = self.status.lock() {
            f(&mut status);
        }
    }
}

/// Releases the single-active-run flag when the run finishes, panicking
/// included.
struct RunToken {
    handle: Arc<BatchRunHandle>,
}

impl RunToken {
    fn acquire(handle: Arc<BatchRunHandle>, total: usize) -> Result<Self, RunnerError> {
        if handle
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunnerError::AlreadyRunning);
        }
        handle.update(|status| {
            *status = BatchStatus {
                running: true,
                total,
                ..BatchStatus::default()
            };
        });
        Ok(Self { handle })
    }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.handle.update(|status| {
            status.running = false;
            status.current_query = None;
            status.completed = true;
        });
        self.handle.active.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Runner
// =============================================================================

#[derive(Debug, Clone)]
pub struct BatchRunner {
    config: RunnerConfig,
    handle: Arc<BatchRunHandle>,
}

impl BatchRunner {
    pub fn new(config: RunnerConfig, handle: Arc<BatchRunHandle>) -> Self {
        Self { config, handle }
    }

    pub fn handle(&self) -> Arc<BatchRunHandle> {
        Arc::clone(&self.handle)
    }

    /// Process `queries` in order against `invoker`.
    ///
    /// Returns `Err(AlreadyRunning)` if another batch holds the guard;
    /// individual item failures never surface as errors.
    pub async fn run(
        &self,
        queries: &[Query],
        invoker: &dyn QueryInvoker,
        observer: Option<&dyn BatchObserver>,
    ) -> Result<BatchSummary, RunnerError> {
        let _token = RunToken::acquire(Arc::clone(&self.handle), queries.len())?;
        info!(total = queries.len(), "starting batch");

        let mut summary = BatchSummary {
            total: queries.len(),
            ..BatchSummary::default()
        };

        for (idx, query) in queries.iter().enumerate() {
            self.handle.update(|status| {
                status.current_query = Some(query.id);
            });

            let outcome = self.invoke_with_retry(invoker, &query.text).await;

            let result = match &outcome {
                ItemOutcome::Succeeded(record) => {
                    summary.succeeded += 1;
                    Some(record.clone())
                }
                ItemOutcome::Exhausted { attempts, error } => {
                    summary.failed += 1;
                    warn!(query_id = query.id, attempts, error = %error, "query exhausted retries");
                    None
                }
            };

            self.handle.update(|status| {
                status.processed = idx + 1;
                match &outcome {
                    ItemOutcome::Succeeded(_) => status.success_count += 1,
                    ItemOutcome::Exhausted { error, .. } => {
                        status.error_count += 1;
                        if status.recent_errors.len() < RECENT_ERRORS_KEPT {
                            status.recent_errors.push(error.clone());
                        }
                    }
                }
            });

            if let Some(observer) = observer {
                let event = BatchEvent {
                    processed: idx + 1,
                    total: queries.len(),
                    query_id: query.id,
                    result: result.clone(),
                };
                if let Err(err) = observer.on_item(event).await {
                    warn!(query_id = query.id, error = %err, "batch observer failed");
                }
            }

            let succeeded = result.is_some();
            summary.reports.push(ItemReport {
                query_id: query.id,
                outcome,
            });

            // Pace successful calls; failed items were already slowed by
            // backoff, and the final item needs no trailing delay.
            if succeeded && idx + 1 < queries.len() && !self.config.rate_limit_delay.is_zero() {
                sleep(self.config.rate_limit_delay).await;
            }
        }

        let message = summary.completion_message();
        self.handle.update(|status| {
            status.completion_message = Some(message.clone());
        });
        info!(%message, "batch finished");

        Ok(summary)
    }

    async fn invoke_with_retry(&self, invoker: &dyn QueryInvoker, query_text: &str) -> ItemOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match invoker.invoke(query_text).await {
                Ok(record) => return ItemOutcome::Succeeded(record),
                Err(err) => {
                    last_error = err.to_string();
                    if attempt + 1 < max_attempts {
                        let delay = backoff_delay(self.config.retry_delay, attempt);
                        warn!(attempt = attempt + 1, error = %last_error, ?delay, "attempt failed; backing off");
                        sleep(delay).await;
                    }
                }
            }
        }

        ItemOutcome::Exhausted {
            attempts: max_attempts,
            error: last_error,
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 9), Duration::from_secs(64));
    }

    #[test]
    fn completion_message_covers_all_outcomes() {
        let all_ok = BatchSummary {
            total: 3,
            succeeded: 3,
            failed: 0,
            reports: Vec::new(),
        };
        assert!(all_ok.completion_message().starts_with("SUCCESS"));

        let all_bad = BatchSummary {
            total: 2,
            succeeded: 0,
            failed: 2,
            reports: Vec::new(),
        };
        assert!(all_bad.completion_message().starts_with("FAILED"));

        let partial = BatchSummary {
            total: 2,
            succeeded: 1,
            failed: 1,
            reports: Vec::new(),
        };
        assert!(partial.completion_message().starts_with("PARTIAL"));
    }
}
