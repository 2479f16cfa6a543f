use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "focuslog")]
#[command(about = "Track focus sessions and total them by day, week, month, year and item")]
#[command(long_about = "focuslog - a focus-session timer

One session runs at a time. Sessions can be paused and resumed; totals are
computed over calendar windows in local time and per work item. Every change
is written to a local cache and, when an owner and remote store are
configured, synced to the remote store through an offline outbox.

QUICK START:
  focuslog start docs-42 --label \"Write docs\"   Start timing an item
  focuslog pause / focuslog resume               Take a break
  focuslog stop                                  Finish the session
  focuslog totals                                Today, week, month and year

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a focus session
    ///
    /// Any active session is ended first.
    ///
    /// # Examples
    ///
    ///   focuslog start docs-42
    ///   focuslog start docs-42 --label "Write docs"
    #[command(alias = "s")]
    Start {
        /// Work-item reference
        item: String,

        /// Display label (defaults to the item reference)
        #[arg(long, short = 'l')]
        label: Option<String>,
    },

    /// Pause the running session
    Pause,

    /// Resume the paused session
    Resume,

    /// End the active session
    #[command(alias = "end")]
    Stop,

    /// Show the active session
    Status {
        /// Keep redrawing the elapsed time until interrupted
        #[arg(long, short = 'w')]
        watch: bool,
    },

    /// Show focus totals for today, this week, this month and this year
    #[command(alias = "t")]
    Totals,

    /// Show all-time focus on one work item
    Item {
        /// Work-item reference
        item_ref: String,
    },

    /// Generate a focus report
    ///
    /// Summary of focus time per item and per day.
    Report {
        /// Calendar window (today, week, month, year)
        #[arg(default_value = "week")]
        period: String,
    },

    /// Manage the sync outbox
    Sync(SyncArgs),

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   focuslog completions bash > ~/.local/share/bash-completion/completions/focuslog
    ///   focuslog completions zsh > ~/.zfunc/_focuslog
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the sync outbox.
#[derive(Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncCommands,
}

/// Sync outbox subcommands.
#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show outbox status
    ///
    /// Displays pending, completed, and failed writes.
    Status,

    /// Replay pending writes against the remote store
    ///
    /// Writes go out in enqueue order; the run stops at the first failure.
    Run {
        /// Dry run - show what would be sent
        #[arg(long)]
        dry_run: bool,

        /// Maximum writes to replay
        #[arg(long, short = 'n', default_value = "100")]
        limit: usize,
    },

    /// List outbox entries
    List {
        /// Filter by status (pending, completed, failed)
        #[arg(long, short = 's')]
        status: Option<String>,

        /// Maximum entries to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Re-queue dead-lettered writes
    ///
    /// Only writes that reached `sync.max_attempts` are dead-lettered.
    Retry {
        /// Retry all failed writes
        #[arg(long)]
        all: bool,

        /// Specific outbox ID to retry
        id: Option<i64>,
    },

    /// Clear writes from the outbox
    ///
    /// Removes completed writes, or everything with --all.
    Clear {
        /// Clear all writes, including pending ones
        #[arg(long)]
        all: bool,

        /// Maximum age in hours for cleanup
        #[arg(long, default_value = "24")]
        older_than: i64,

        /// Skip confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Fetch sessions from the remote store into the local cache
    Pull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start() {
        let cli = Cli::try_parse_from(["focuslog", "start", "docs-42"]).unwrap();
        if let Commands::Start { item, label } = cli.command {
            assert_eq!(item, "docs-42");
            assert!(label.is_none());
        } else {
            panic!("Expected Start command");
        }
    }

    #[test]
    fn test_cli_start_with_label() {
        let cli =
            Cli::try_parse_from(["focuslog", "s", "docs-42", "--label", "Write docs"]).unwrap();
        if let Commands::Start { label, .. } = cli.command {
            assert_eq!(label, Some("Write docs".to_string()));
        } else {
            panic!("Expected Start command");
        }
    }

    #[test]
    fn test_cli_start_requires_item() {
        assert!(Cli::try_parse_from(["focuslog", "start"]).is_err());
    }

    #[test]
    fn test_cli_stop_alias() {
        let cli = Cli::try_parse_from(["focuslog", "end"]).unwrap();
        assert!(matches!(cli.command, Commands::Stop));
    }

    #[test]
    fn test_cli_status_watch() {
        let cli = Cli::try_parse_from(["focuslog", "status", "-w"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { watch: true }));
    }

    #[test]
    fn test_cli_report_default_period() {
        let cli = Cli::try_parse_from(["focuslog", "report"]).unwrap();
        if let Commands::Report { period } = cli.command {
            assert_eq!(period, "week");
        } else {
            panic!("Expected Report command");
        }
    }

    #[test]
    fn test_cli_output_format_default() {
        let cli = Cli::try_parse_from(["focuslog", "totals"]).unwrap();
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_output_format_json() {
        let cli = Cli::try_parse_from(["focuslog", "--output", "json", "totals"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }

    #[test]
    fn test_cli_output_format_global() {
        let cli = Cli::try_parse_from(["focuslog", "sync", "status", "-o", "json"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }

    #[test]
    fn test_cli_sync_run() {
        let cli = Cli::try_parse_from(["focuslog", "sync", "run", "--dry-run"]).unwrap();
        if let Commands::Sync(args) = cli.command {
            assert!(matches!(
                args.command,
                SyncCommands::Run {
                    dry_run: true,
                    limit: 100
                }
            ));
        } else {
            panic!("Expected Sync command");
        }
    }

    #[test]
    fn test_cli_sync_retry_id() {
        let cli = Cli::try_parse_from(["focuslog", "sync", "retry", "7"]).unwrap();
        if let Commands::Sync(args) = cli.command {
            assert!(matches!(
                args.command,
                SyncCommands::Retry {
                    all: false,
                    id: Some(7)
                }
            ));
        } else {
            panic!("Expected Sync command");
        }
    }

    #[test]
    fn test_cli_completions() {
        let cli = Cli::try_parse_from(["focuslog", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }

    #[test]
    fn test_output_format_default() {
        assert!(matches!(OutputFormat::default(), OutputFormat::Pretty));
    }
}
