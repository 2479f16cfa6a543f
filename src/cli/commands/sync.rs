//! Sync outbox command implementation.
//!
//! Inspects and replays the outbox of writes waiting for the remote store.

use chrono::Utc;
use colored::Colorize;

use crate::cli::args::{OutputFormat, SyncCommands};
use crate::error::FocusError;
use crate::features::sync::{
    format_sync_result, ExecutorConfig, OutboxQueue, RemoteStore, SyncExecutor, SyncWorker,
    WriteStatus,
};
use crate::output::to_json;

use super::App;

/// Execute sync subcommands.
///
/// # Errors
///
/// Returns an error if the outbox cannot be read or the command is invalid.
pub async fn sync(
    app: &App,
    worker: &SyncWorker,
    cmd: SyncCommands,
    format: OutputFormat,
) -> Result<String, FocusError> {
    match cmd {
        SyncCommands::Status => show_status(app, format),
        SyncCommands::Run { dry_run, limit } => run_sync(app, dry_run, limit, format).await,
        SyncCommands::List { status, limit } => list_writes(&app.queue, status, limit, format),
        SyncCommands::Retry { all, id } => retry_writes(&app.queue, all, id, format),
        SyncCommands::Clear {
            all,
            older_than,
            force,
        } => clear_writes(&app.queue, all, older_than, force, format),
        SyncCommands::Pull => pull(app, worker, format).await,
    }
}

/// Show outbox status.
fn show_status(app: &App, format: OutputFormat) -> Result<String, FocusError> {
    let stats = app.queue.stats()?;
    let cached = app.cache.count()?;
    let remote = &app.config.remote;

    match format {
        OutputFormat::Json => {
            let data = serde_json::json!({
                "pending": stats.pending,
                "completed": stats.completed,
                "failed": stats.failed,
                "oldest_pending": stats.oldest_pending.map(|t| t.to_rfc3339()),
                "remote_configured": remote.is_configured(),
                "cached_sessions": cached,
            });
            to_json(&data)
        }
        OutputFormat::Pretty => {
            let mut lines = Vec::new();

            lines.push("Sync Outbox Status".bold().to_string());
            lines.push("─".repeat(40));

            let target = match (&remote.url, &remote.owner_id) {
                (Some(url), Some(owner)) => format!("{url} as {owner}"),
                (Some(url), None) => format!("{url} {}", "(no owner id; local only)".yellow()),
                (None, _) => "not configured (local only)".dimmed().to_string(),
            };
            lines.push(format!("  Remote:     {target}"));
            lines.push(format!("  Cached:     {cached} {}", "sessions".dimmed()));

            lines.push(format!(
                "  Pending:    {} {}",
                stats.pending,
                if stats.pending > 0 {
                    "writes waiting".dimmed()
                } else {
                    "".dimmed()
                }
            ));

            lines.push(format!(
                "  Completed:  {} {}",
                stats.completed,
                "writes".dimmed()
            ));

            lines.push(format!(
                "  Failed:     {} {}",
                stats.failed,
                if stats.failed > 0 {
                    "writes dead-lettered".red()
                } else {
                    "".normal()
                }
            ));

            if let Some(oldest) = stats.oldest_pending {
                let age = Utc::now().signed_duration_since(oldest);
                let age_str = if age.num_hours() > 0 {
                    format!("{} hours ago", age.num_hours())
                } else if age.num_minutes() > 0 {
                    format!("{} minutes ago", age.num_minutes())
                } else {
                    "just now".to_string()
                };
                lines.push(format!("  Oldest:     {}", age_str.dimmed()));
            }

            if stats.pending > 0 {
                lines.push(String::new());
                lines.push(
                    "Run 'focuslog sync run' to replay pending writes"
                        .dimmed()
                        .to_string(),
                );
            }

            Ok(lines.join("\n"))
        }
    }
}

/// Replay pending writes.
async fn run_sync(
    app: &App,
    dry_run: bool,
    limit: usize,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let remote: &dyn RemoteStore = app.remote.as_deref().ok_or_else(|| {
        FocusError::Config(
            "No remote store configured. Set remote.url or FOCUSLOG_REMOTE_URL.".to_string(),
        )
    })?;

    let config = ExecutorConfig {
        max_attempts: app.config.sync.max_attempts,
        batch_size: limit,
        dry_run,
    };

    let executor = SyncExecutor::with_config(remote, &app.queue, config);
    let result = executor.drain().await?;

    match format {
        OutputFormat::Json => to_json(&result),
        OutputFormat::Pretty => {
            if result.total() == 0 {
                Ok("No pending writes to sync.".to_string())
            } else {
                Ok(format_sync_result(&result))
            }
        }
    }
}

/// List outbox entries.
fn list_writes(
    queue: &OutboxQueue,
    status_filter: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let status = status_filter
        .as_deref()
        .map_or(WriteStatus::Pending, WriteStatus::from_str);

    let writes: Vec<_> = queue.get_by_status(status)?.into_iter().take(limit).collect();

    match format {
        OutputFormat::Json => to_json(&writes),
        OutputFormat::Pretty => {
            if writes.is_empty() {
                return Ok(format!("No {status} writes in outbox."));
            }

            let mut lines = Vec::new();

            lines.push(format!(
                "{} Writes ({})",
                status.to_string().to_uppercase(),
                writes.len()
            ));
            lines.push("─".repeat(70));

            lines.push(format!(
                "{:<6} {:<40} {:<17} {}",
                "ID", "Request", "Created", "Tries"
            ));
            lines.push("─".repeat(70));

            for write in &writes {
                let id = write.id.map(|i| i.to_string()).unwrap_or_default();
                let created = write.created_at.format("%Y-%m-%d %H:%M").to_string();
                let mut summary = write.summary();
                if summary.chars().count() > 40 {
                    summary = format!("{}...", summary.chars().take(37).collect::<String>());
                }

                lines.push(format!(
                    "{:<6} {:<40} {:<17} {}",
                    id, summary, created, write.attempts
                ));

                if let Some(error) = &write.last_error {
                    let short_error = if error.chars().count() > 60 {
                        format!("{}...", error.chars().take(57).collect::<String>())
                    } else {
                        error.clone()
                    };
                    lines.push(format!("       {}", short_error.red()));
                }
            }

            Ok(lines.join("\n"))
        }
    }
}

/// Re-queue dead-lettered writes.
fn retry_writes(
    queue: &OutboxQueue,
    all: bool,
    id: Option<i64>,
    format: OutputFormat,
) -> Result<String, FocusError> {
    if let Some(write_id) = id {
        let Some(write) = queue.get(write_id)? else {
            return Err(FocusError::NotFound(format!("Outbox entry {write_id}")));
        };
        if write.status != WriteStatus::Failed {
            return Err(FocusError::Config(format!(
                "Outbox entry {write_id} is {}, not failed",
                write.status
            )));
        }
        queue.retry_failed(Some(write_id))?;

        match format {
            OutputFormat::Json => to_json(&serde_json::json!({"reset": 1, "id": write_id})),
            OutputFormat::Pretty => Ok(format!("Re-queued write {write_id}")),
        }
    } else if all {
        let count = queue.retry_failed(None)?;

        match format {
            OutputFormat::Json => to_json(&serde_json::json!({"reset": count})),
            OutputFormat::Pretty => Ok(format!("Re-queued {count} failed writes")),
        }
    } else {
        Err(FocusError::Config(
            "Specify --all or provide an outbox ID".to_string(),
        ))
    }
}

/// Clear writes from the outbox.
fn clear_writes(
    queue: &OutboxQueue,
    all: bool,
    older_than: i64,
    force: bool,
    format: OutputFormat,
) -> Result<String, FocusError> {
    if all {
        if !force {
            return Err(FocusError::Config(
                "Use --force to clear all writes, including unsynced ones".to_string(),
            ));
        }
        let count = queue.clear()?;

        match format {
            OutputFormat::Json => to_json(&serde_json::json!({"cleared": count})),
            OutputFormat::Pretty => Ok(format!("Cleared {count} writes from outbox")),
        }
    } else {
        let count = queue.cleanup(older_than)?;

        match format {
            OutputFormat::Json => to_json(&serde_json::json!({"cleared": count})),
            OutputFormat::Pretty => Ok(format!(
                "Cleared {count} completed writes older than {older_than} hours"
            )),
        }
    }
}

/// Merge the owner's remote sessions into the local cache.
async fn pull(app: &App, worker: &SyncWorker, format: OutputFormat) -> Result<String, FocusError> {
    let owner = app
        .config
        .remote
        .owner_id
        .as_deref()
        .ok_or(FocusError::NotAuthenticated)?;
    let changed = worker.pull(owner).await?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({"merged": changed})),
        OutputFormat::Pretty => Ok(format!("Merged {changed} sessions from the remote store")),
    }
}
