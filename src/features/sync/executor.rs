//! Outbox executor.
//!
//! Replays pending writes against the remote store in strict enqueue order.
//! A failing write blocks everything behind it until it succeeds or, when an
//! attempt limit is configured, is dead-lettered.

use colored::Colorize;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::operation::{PendingWrite, PersistOutcome, WriteStatus};
use super::queue::OutboxQueue;
use super::remote::RemoteStore;
use crate::config::SyncConfig;
use crate::error::FocusError;

/// Configuration for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Attempts before a write is dead-lettered; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Maximum writes replayed per drain.
    pub batch_size: usize,
    /// Dry run mode (don't actually send)
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            batch_size: 100,
            dry_run: false,
        }
    }
}

impl From<&SyncConfig> for ExecutorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            batch_size: config.batch_size,
            dry_run: false,
        }
    }
}

/// Result of replaying a single write.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Outbox ID
    pub id: i64,
    /// `METHOD url`
    pub summary: String,
    /// Whether it succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Whether it was skipped (dry run)
    pub skipped: bool,
    /// Whether the failure dead-lettered the write
    pub dead_lettered: bool,
}

/// Result of a drain.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// Number of successful writes
    pub succeeded: usize,
    /// Number of failed writes
    pub failed: usize,
    /// Number of skipped writes
    pub skipped: usize,
    /// Whether a failing head entry stopped the drain
    pub blocked: bool,
    /// Individual results
    pub results: Vec<ExecutionResult>,
}

impl SyncResult {
    /// Create an empty result.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            blocked: false,
            results: Vec::new(),
        }
    }

    /// Add a result.
    pub fn add(&mut self, result: ExecutionResult) {
        if result.skipped {
            self.skipped += 1;
        } else if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Get total writes processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Executor for the outbox.
pub struct SyncExecutor<'a> {
    remote: &'a dyn RemoteStore,
    queue: &'a OutboxQueue,
    config: ExecutorConfig,
}

impl<'a> SyncExecutor<'a> {
    /// Create an executor with custom config.
    #[must_use]
    pub const fn with_config(
        remote: &'a dyn RemoteStore,
        queue: &'a OutboxQueue,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            remote,
            queue,
            config,
        }
    }

    /// Replay pending writes in order until the outbox is empty, the batch
    /// is exhausted, or a write fails without being dead-lettered.
    ///
    /// Waits for any other drain of the same outbox to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error if outbox bookkeeping fails.
    pub async fn drain(&self) -> Result<SyncResult, FocusError> {
        let _guard = self.queue.drain_guard().await;
        let pending = self.queue.get_pending(self.config.batch_size)?;
        let mut result = SyncResult::empty();

        for write in pending {
            let outcome = self.execute_one(&write).await?;
            let blocks = !outcome.success && !outcome.skipped && !outcome.dead_lettered;
            result.add(outcome);

            if blocks {
                result.blocked = true;
                break;
            }
        }

        if result.total() > 0 {
            debug!(
                succeeded = result.succeeded,
                failed = result.failed,
                blocked = result.blocked,
                "outbox drained"
            );
        }

        Ok(result)
    }

    /// Replay a single write and record the attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if outbox bookkeeping fails.
    pub async fn execute_one(&self, write: &PendingWrite) -> Result<ExecutionResult, FocusError> {
        let id = write.id.unwrap_or(0);
        let summary = write.summary();

        if self.config.dry_run {
            return Ok(ExecutionResult {
                id,
                summary,
                success: true,
                error: None,
                skipped: true,
                dead_lettered: false,
            });
        }

        match self.remote.send(write).await {
            Ok(()) => {
                self.queue.mark_completed(id)?;
                Ok(ExecutionResult {
                    id,
                    summary,
                    success: true,
                    error: None,
                    skipped: false,
                    dead_lettered: false,
                })
            }
            Err(e) => {
                let message = e.to_string();
                let dead_lettered =
                    self.queue
                        .record_failure(id, &message, self.config.max_attempts)?;
                if dead_lettered {
                    error!(id, %summary, error = %message, "write dead-lettered");
                } else {
                    warn!(id, %summary, error = %message, "write failed, kept queued");
                }
                Ok(ExecutionResult {
                    id,
                    summary,
                    success: false,
                    error: Some(message),
                    skipped: false,
                    dead_lettered,
                })
            }
        }
    }

    /// Queue `writes` behind anything already pending and drain.
    ///
    /// Writes the outbox cannot take are sent directly, and only after every
    /// write queued before them has gone out. If some are still queued the
    /// outcome is `Failed`.
    pub async fn persist(&self, mut writes: Vec<PendingWrite>) -> PersistOutcome {
        let mut queued = 0;
        while queued < writes.len() {
            if let Err(e) = self.queue.enqueue(&mut writes[queued]) {
                error!(error = %e, "outbox unavailable, sending directly");
                break;
            }
            queued += 1;
        }
        let unqueued = writes.split_off(queued);

        if !writes.is_empty() {
            if let Err(e) = self.drain().await {
                error!(error = %e, "outbox drain failed");
            }
        }

        let synced = writes.iter().filter_map(|w| w.id).all(|id| {
            match self.queue.get(id) {
                Ok(Some(w)) => w.status == WriteStatus::Completed,
                Ok(None) => false,
                Err(e) => {
                    error!(error = %e, "could not read back outbox entry");
                    false
                }
            }
        });

        if unqueued.is_empty() {
            return if synced {
                PersistOutcome::Synced
            } else {
                PersistOutcome::QueuedOffline
            };
        }

        if !synced {
            warn!(
                dropped = unqueued.len(),
                "earlier writes still queued; not sending the rest out of order"
            );
            return PersistOutcome::Failed;
        }
        self.send_direct(&unqueued).await
    }

    async fn send_direct(&self, writes: &[PendingWrite]) -> PersistOutcome {
        for write in writes {
            if let Err(e) = self.remote.send(write).await {
                warn!(error = %e, summary = %write.summary(), "direct send failed");
                return PersistOutcome::Failed;
            }
        }
        PersistOutcome::Synced
    }
}

/// Format a drain result for display.
#[must_use]
pub fn format_sync_result(result: &SyncResult) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Sync completed: {} writes", result.total()));
    lines.push("─".repeat(40));

    if result.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} succeeded", result.succeeded).green()
        ));
    }

    if result.failed > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} failed", result.failed).red()
        ));
    }

    if result.skipped > 0 {
        lines.push(format!(
            "  {} {}",
            "○".yellow(),
            format!("{} skipped", result.skipped).yellow()
        ));
    }

    if result.blocked {
        lines.push(String::new());
        lines.push(
            "Stopped at a failing write; later writes stay queued in order."
                .dimmed()
                .to_string(),
        );
    }

    let errors: Vec<_> = result
        .results
        .iter()
        .filter(|r| r.error.is_some())
        .take(3)
        .collect();

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for err in errors {
            lines.push(format!(
                "  - {}: {}",
                err.summary,
                err.error.as_deref().unwrap_or("Unknown error")
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::{MemoryRemote, WriteMethod};
    use crate::features::focus::Session;
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Accepts every write after a delay, recording arrival order.
    #[derive(Default)]
    struct SlowRemote {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteStore for SlowRemote {
        async fn send(&self, write: &PendingWrite) -> Result<(), FocusError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.sent.lock().unwrap().push(write.url.clone());
            Ok(())
        }

        async fn fetch_sessions(&self, _owner_id: &str) -> Result<Vec<Session>, FocusError> {
            Ok(Vec::new())
        }
    }

    /// Outbox whose inserts fail for urls starting with `/reject`.
    fn rejecting_queue() -> OutboxQueue {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.connection()
            .execute_batch(
                "CREATE TRIGGER reject_write BEFORE INSERT ON outbox
                 WHEN NEW.url LIKE '/reject%'
                 BEGIN SELECT RAISE(ABORT, 'outbox full'); END;",
            )
            .unwrap();
        OutboxQueue::with_database(db)
    }

    fn queue() -> OutboxQueue {
        OutboxQueue::with_database(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn executor<'a>(remote: &'a dyn RemoteStore, queue: &'a OutboxQueue) -> SyncExecutor<'a> {
        SyncExecutor::with_config(remote, queue, ExecutorConfig::default())
    }

    fn write(n: u32) -> PendingWrite {
        PendingWrite::new(WriteMethod::Post, format!("/w/{n}"), Vec::new(), None)
    }

    #[test]
    fn test_sync_result() {
        let mut result = SyncResult::empty();

        result.add(ExecutionResult {
            id: 1,
            summary: "POST /a".to_string(),
            success: true,
            error: None,
            skipped: false,
            dead_lettered: false,
        });

        result.add(ExecutionResult {
            id: 2,
            summary: "POST /b".to_string(),
            success: false,
            error: Some("Connection failed".to_string()),
            skipped: false,
            dead_lettered: false,
        });

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn test_executor_config_default() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.batch_size, 100);
        assert!(!config.dry_run);
    }

    #[tokio::test]
    async fn test_drain_in_enqueue_order() {
        let queue = queue();
        let remote = MemoryRemote::new();
        for n in 0..3 {
            queue.enqueue(&mut write(n)).unwrap();
        }

        let result = executor(&remote, &queue).drain().await.unwrap();

        assert_eq!(result.succeeded, 3);
        let urls: Vec<_> = remote.sent().into_iter().map(|w| w.url).collect();
        assert_eq!(urls, vec!["/w/0", "/w/1", "/w/2"]);
        assert!(!queue.has_pending().unwrap());
    }

    #[tokio::test]
    async fn test_drain_stops_at_failing_head() {
        let queue = queue();
        let remote = MemoryRemote::new();
        remote.set_online(false);
        for n in 0..3 {
            queue.enqueue(&mut write(n)).unwrap();
        }

        let result = executor(&remote, &queue).drain().await.unwrap();

        assert!(result.blocked);
        assert_eq!(result.failed, 1);
        assert_eq!(queue.get_pending(10).unwrap().len(), 3);

        // Back online: everything goes out in the original order
        remote.set_online(true);
        let result = executor(&remote, &queue).drain().await.unwrap();
        assert_eq!(result.succeeded, 3);
        let urls: Vec<_> = remote.sent().into_iter().map(|w| w.url).collect();
        assert_eq!(urls, vec!["/w/0", "/w/1", "/w/2"]);
    }

    #[tokio::test]
    async fn test_dead_letter_unblocks_queue() {
        let queue = queue();
        let remote = MemoryRemote::new();
        remote.set_online(false);
        queue.enqueue(&mut write(0)).unwrap();

        let config = ExecutorConfig {
            max_attempts: Some(1),
            ..ExecutorConfig::default()
        };
        let result = SyncExecutor::with_config(&remote, &queue, config)
            .drain()
            .await
            .unwrap();

        assert!(!result.blocked);
        assert!(result.results[0].dead_lettered);
        assert_eq!(queue.stats().unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let queue = queue();
        let remote = MemoryRemote::new();
        queue.enqueue(&mut write(0)).unwrap();

        let config = ExecutorConfig {
            dry_run: true,
            ..ExecutorConfig::default()
        };
        let result = SyncExecutor::with_config(&remote, &queue, config)
            .drain()
            .await
            .unwrap();

        assert_eq!(result.skipped, 1);
        assert!(remote.sent().is_empty());
        assert!(queue.has_pending().unwrap());
    }

    #[tokio::test]
    async fn test_persist_outcomes() {
        let queue = queue();
        let remote = MemoryRemote::new();
        let executor = executor(&remote, &queue);

        assert_eq!(executor.persist(vec![write(0)]).await, PersistOutcome::Synced);

        remote.set_online(false);
        assert_eq!(
            executor.persist(vec![write(1)]).await,
            PersistOutcome::QueuedOffline
        );

        // Online again, but an older write is still queued: it goes first
        remote.set_online(true);
        assert_eq!(executor.persist(vec![write(2)]).await, PersistOutcome::Synced);
        let urls: Vec<_> = remote.sent().into_iter().map(|w| w.url).collect();
        assert_eq!(urls, vec!["/w/0", "/w/1", "/w/2"]);
    }

    #[tokio::test]
    async fn test_concurrent_drains_send_each_write_once() {
        let queue = queue();
        let remote = SlowRemote::default();
        for n in 0..3 {
            queue.enqueue(&mut write(n)).unwrap();
        }

        let first = executor(&remote, &queue);
        let second = executor(&remote, &queue);
        let (a, b) = tokio::join!(first.drain(), second.drain());

        assert_eq!(a.unwrap().succeeded + b.unwrap().succeeded, 3);
        assert_eq!(*remote.sent.lock().unwrap(), vec!["/w/0", "/w/1", "/w/2"]);
        assert!(!queue.has_pending().unwrap());
    }

    #[tokio::test]
    async fn test_persist_sends_only_unqueued_writes_directly() {
        let queue = rejecting_queue();
        let remote = MemoryRemote::new();
        let rejected = PendingWrite::new(WriteMethod::Post, "/reject/1", Vec::new(), None);

        let outcome = executor(&remote, &queue)
            .persist(vec![write(0), rejected])
            .await;

        assert_eq!(outcome, PersistOutcome::Synced);
        let urls: Vec<_> = remote.sent().into_iter().map(|w| w.url).collect();
        assert_eq!(urls, vec!["/w/0", "/reject/1"]);
        assert!(!queue.has_pending().unwrap());
    }

    #[tokio::test]
    async fn test_persist_keeps_order_when_queued_part_is_offline() {
        let queue = rejecting_queue();
        let remote = MemoryRemote::new();
        remote.set_online(false);
        let rejected = PendingWrite::new(WriteMethod::Post, "/reject/1", Vec::new(), None);

        let outcome = executor(&remote, &queue)
            .persist(vec![write(0), rejected])
            .await;

        assert_eq!(outcome, PersistOutcome::Failed);
        assert!(remote.sent().is_empty());
        let pending = queue.get_pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "/w/0");

        // The queued write goes out once, and nothing else follows it
        remote.set_online(true);
        executor(&remote, &queue).drain().await.unwrap();
        let urls: Vec<_> = remote.sent().into_iter().map(|w| w.url).collect();
        assert_eq!(urls, vec!["/w/0"]);
    }
}
