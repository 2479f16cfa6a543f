//! Command implementations for focuslog.
//!
//! [`App`] is the composition root: it opens the database, builds the remote
//! store from configuration, and wires the tracker to the sync worker.

mod focus;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use chrono::Weekday;
use clap::CommandFactory;
use clap_complete::Shell;
use tracing::{debug, info};

pub use focus::{item, pause, report, resume, start, status, stop, totals};
pub use sync::sync;

use crate::cli::args::{Cli, Commands, OutputFormat};
use crate::config::Config;
use crate::core::SystemClock;
use crate::error::FocusError;
use crate::features::focus::{SessionCache, SessionTracker};
use crate::features::sync::{OutboxQueue, PersistIntent, RemoteStore, RestStore, SyncWorker};
use crate::storage::Database;
use tokio::sync::mpsc::UnboundedSender;

/// Shared handles for one CLI invocation.
pub struct App {
    /// Loaded configuration, env overrides applied.
    pub config: Config,
    /// Local session cache.
    pub cache: Arc<SessionCache>,
    /// Remote write outbox.
    pub queue: Arc<OutboxQueue>,
    /// Remote store, when a URL is configured.
    pub remote: Option<Arc<dyn RemoteStore>>,
}

impl App {
    /// Open the default database and configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed or the database
    /// cannot be opened.
    pub fn open() -> Result<Self, FocusError> {
        let config = Config::load()?;
        let db = Arc::new(Database::open()?);
        Self::with_database(config, db)
    }

    /// Build an app over an existing database.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_database(config: Config, db: Arc<Database>) -> Result<Self, FocusError> {
        let remote = RestStore::from_config(&config.remote)?
            .map(|store| Arc::new(store) as Arc<dyn RemoteStore>);

        Ok(Self {
            cache: Arc::new(SessionCache::with_database(Arc::clone(&db))),
            queue: Arc::new(OutboxQueue::with_database(db)),
            remote,
            config,
        })
    }

    /// Default configuration over an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn in_memory() -> Result<Self, FocusError> {
        Self::with_database(Config::default(), Arc::new(Database::open_in_memory()?))
    }

    /// A sync worker over this app's cache, outbox and remote store.
    #[must_use]
    pub fn worker(&self) -> SyncWorker {
        SyncWorker::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.queue),
            self.remote.clone(),
            self.config.sync.clone(),
        )
    }

    /// A tracker restored from the local cache, emitting into `outbox`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    pub fn tracker(
        &self,
        outbox: UnboundedSender<PersistIntent>,
    ) -> Result<SessionTracker<SystemClock>, FocusError> {
        let owner = self.config.remote.owner_id.clone();
        let week_start = self.config.calendar.week_starts_on;
        if week_start != Weekday::Sun {
            info!(%week_start, "week window starts on a non-default day");
        }
        let sessions = self.cache.all_for_owner(owner.as_deref())?;

        let mut tracker = SessionTracker::new(SystemClock)
            .with_owner(owner)
            .with_week_start(week_start)
            .with_outbox(outbox);
        tracker.restore(sessions);
        Ok(tracker)
    }

    /// Output format from the flag, falling back to the config default.
    #[must_use]
    pub fn output_format(&self, flag: Option<OutputFormat>) -> OutputFormat {
        flag.unwrap_or(self.config.general.default_output)
    }
}

/// Run a parsed command line and return what to print.
///
/// # Errors
///
/// Returns an error if setup fails or the command itself fails.
pub async fn run(cli: Cli) -> Result<String, FocusError> {
    if let Commands::Completions { shell } = cli.command {
        return completions(shell);
    }

    let app = App::open()?;
    app.config.general.color.apply();
    dispatch(&app, cli).await
}

/// Run a command against an opened app.
///
/// `sync` subcommands work on the outbox directly and never start the
/// background worker, so inspecting or dry-running the outbox cannot replay
/// it. Every other command runs with a worker that is shut down before
/// returning, so each write the command caused has reached the cache and,
/// if possible, the remote store.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn dispatch(app: &App, cli: Cli) -> Result<String, FocusError> {
    let format = app.output_format(cli.output);

    let command = match cli.command {
        Commands::Sync(args) => return sync(app, &app.worker(), args.command, format).await,
        Commands::Completions { shell } => return completions(shell),
        command => command,
    };

    let handle = app.worker().spawn();
    if app.remote.is_some() {
        // Flush anything left over from earlier runs
        handle.notify_online();
    }
    let mut tracker = app.tracker(handle.sender())?;
    let tick = Duration::from_secs(app.config.display.tick_interval_secs.max(1));

    let result = match command {
        Commands::Start { item, label } => start(&mut tracker, &item, label.as_deref(), format),
        Commands::Pause => pause(&mut tracker, format),
        Commands::Resume => resume(&mut tracker, format),
        Commands::Stop => stop(&mut tracker, format),
        Commands::Status { watch } => status(&tracker, watch, tick, format).await,
        Commands::Totals => totals(&tracker, format),
        Commands::Item { item_ref } => item(&tracker, &item_ref, format),
        Commands::Report { period } => report(&tracker, &period, format),
        Commands::Sync(_) | Commands::Completions { .. } => Ok(String::new()),
    };

    drop(tracker);
    handle.shutdown().await;
    debug!("sync worker drained");

    result
}

/// Render shell completions.
///
/// # Errors
///
/// Returns an error if the generated script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, FocusError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "focuslog", &mut buf);
    String::from_utf8(buf).map_err(|e| FocusError::Parse(e.to_string()))
}
