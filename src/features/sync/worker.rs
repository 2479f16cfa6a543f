//! Background sync worker.
//!
//! Receives [`PersistIntent`]s from the tracker, writes each one to the local
//! session cache, then pushes it to the remote store through the outbox. The
//! outbox is also drained on a timer and whenever connectivity is signalled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::executor::{ExecutorConfig, SyncExecutor, SyncResult};
use super::operation::{PersistIntent, PersistOutcome};
use super::queue::OutboxQueue;
use super::remote::RemoteStore;
use crate::config::SyncConfig;
use crate::error::FocusError;
use crate::features::focus::SessionCache;

/// Persists intents locally and remotely.
pub struct SyncWorker {
    cache: Arc<SessionCache>,
    queue: Arc<OutboxQueue>,
    remote: Option<Arc<dyn RemoteStore>>,
    config: SyncConfig,
    outcomes: Option<UnboundedSender<PersistOutcome>>,
}

impl SyncWorker {
    /// Create a worker. Without a remote store every intent stays local.
    #[must_use]
    pub fn new(
        cache: Arc<SessionCache>,
        queue: Arc<OutboxQueue>,
        remote: Option<Arc<dyn RemoteStore>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            cache,
            queue,
            remote,
            config,
            outcomes: None,
        }
    }

    /// Report the outcome of every handled intent to `outcomes`.
    #[must_use]
    pub fn report_outcomes(mut self, outcomes: UnboundedSender<PersistOutcome>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    /// Persist one intent.
    ///
    /// The local cache is written first. Remote delivery is skipped when the
    /// intent carries no owner or no remote store is configured.
    pub async fn handle_intent(&self, intent: &PersistIntent) -> PersistOutcome {
        let local_ok = match intent {
            PersistIntent::UpsertSession(session) => match self.cache.put(session) {
                Ok(()) => true,
                Err(e) => {
                    error!(id = %session.id, error = %e, "local cache write failed");
                    false
                }
            },
            // Rollups live only in the remote store
            PersistIntent::AddDailyFocus { .. } => true,
        };

        let (Some(remote), Some(_owner)) = (&self.remote, intent.owner_id()) else {
            debug!(kind = intent.kind(), "no owner or remote; keeping write local");
            return if local_ok {
                PersistOutcome::LocalOnly
            } else {
                PersistOutcome::Failed
            };
        };

        let writes = match intent.to_writes() {
            Ok(writes) => writes,
            Err(e) => {
                error!(kind = intent.kind(), error = %e, "could not render intent");
                return if local_ok {
                    PersistOutcome::LocalOnly
                } else {
                    PersistOutcome::Failed
                };
            }
        };

        let executor = SyncExecutor::with_config(
            remote.as_ref(),
            &self.queue,
            ExecutorConfig::from(&self.config),
        );
        executor.persist(writes).await
    }

    /// Replay the outbox. Returns `None` without a remote store.
    pub async fn drain(&self) -> Option<SyncResult> {
        let remote = self.remote.as_ref()?;
        let executor = SyncExecutor::with_config(
            remote.as_ref(),
            &self.queue,
            ExecutorConfig::from(&self.config),
        );

        match executor.drain().await {
            Ok(result) => Some(result),
            Err(e) => {
                error!(error = %e, "outbox drain failed");
                None
            }
        }
    }

    /// Fetch `owner_id`'s sessions from the remote store and merge them into
    /// the local cache. Returns the number of rows that changed.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a remote store, or the remote or
    /// database error that stopped the pull.
    pub async fn pull(&self, owner_id: &str) -> Result<usize, FocusError> {
        let remote = self.remote.as_ref().ok_or(FocusError::NotAuthenticated)?;
        let rows = remote.fetch_sessions(owner_id).await?;
        let changed = self.cache.merge(&rows)?;
        info!(fetched = rows.len(), changed, "pulled remote sessions");
        Ok(changed)
    }

    async fn process(&self, intent: PersistIntent) {
        let outcome = self.handle_intent(&intent).await;
        match outcome {
            PersistOutcome::Synced | PersistOutcome::LocalOnly => {
                debug!(kind = intent.kind(), %outcome, "intent persisted");
            }
            PersistOutcome::QueuedOffline => {
                warn!(kind = intent.kind(), "remote unavailable; write queued");
            }
            PersistOutcome::Failed => {
                error!(kind = intent.kind(), "intent could not be persisted");
            }
        }
        if let Some(outcomes) = &self.outcomes {
            let _ = outcomes.send(outcome);
        }
    }

    /// Run the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> SyncHandle {
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let online = Arc::new(Notify::new());

        let task = tokio::spawn(self.run(intents_rx, Arc::clone(&online), shutdown_rx));

        SyncHandle {
            intents: intents_tx,
            online,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        self,
        mut intents: UnboundedReceiver<PersistIntent>,
        online: Arc<Notify>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let period = Duration::from_secs(self.config.drain_interval_secs.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => self.process(intent).await,
                    None => break,
                },
                () = online.notified() => {
                    debug!("online signal; draining outbox");
                    self.drain().await;
                }
                _ = ticker.tick() => {
                    self.drain().await;
                }
                _ = &mut shutdown => {
                    // Senders may still be alive; stop accepting and finish the backlog
                    intents.close();
                    while let Some(intent) = intents.recv().await {
                        self.process(intent).await;
                    }
                    break;
                }
            }
        }

        debug!("sync worker stopped");
    }
}

/// Handle to a running [`SyncWorker`].
pub struct SyncHandle {
    intents: UnboundedSender<PersistIntent>,
    online: Arc<Notify>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// A sender for the tracker's outbox.
    #[must_use]
    pub fn sender(&self) -> UnboundedSender<PersistIntent> {
        self.intents.clone()
    }

    /// Signal that connectivity is back; the worker drains the outbox.
    pub fn notify_online(&self) {
        self.online.notify_one();
    }

    /// Stop the worker after every intent sent so far has been handled.
    pub async fn shutdown(self) {
        let Self { shutdown, task, .. } = self;
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            error!(error = %e, "sync worker panicked");
        }
    }
}
