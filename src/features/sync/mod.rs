//! Best-effort remote persistence.
//!
//! Tracker transitions emit intents; the [`SyncWorker`] writes them to the
//! local cache and pushes them to the remote store through a durable outbox
//! that is replayed in strict enqueue order.

pub mod executor;
pub mod operation;
pub mod queue;
pub mod remote;
pub mod worker;

pub use executor::{format_sync_result, ExecutorConfig, SyncExecutor, SyncResult};
pub use operation::{PendingWrite, PersistIntent, PersistOutcome, WriteMethod, WriteStatus};
pub use queue::{OutboxQueue, QueueStats};
pub use remote::{MemoryRemote, RemoteStore, RestStore};
pub use worker::{SyncHandle, SyncWorker};
