use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

use focuslog::cli::commands;
use focuslog::Cli;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr, filtered by `FOCUSLOG_LOG` (or `RUST_LOG`), default `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOCUSLOG_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = commands::run(cli).await?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
