//! Focus session commands.
//!
//! Handles start/pause/resume/stop, status and the totals views.

use std::io::Write;
use std::time::Duration;

use colored::Colorize;
use serde_json::json;

use crate::cli::args::OutputFormat;
use crate::core::{CalendarWindow, Clock};
use crate::error::FocusError;
use crate::features::focus::{
    format_clock, format_hm, format_hms, FocusReport, Session, SessionState, SessionTracker,
    Transition,
};
use crate::output::to_json;

/// Start a session, ending any active one.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn start<C: Clock>(
    tracker: &mut SessionTracker<C>,
    item: &str,
    label: Option<&str>,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let transition = tracker.start_session(item, label.unwrap_or(item));

    match format {
        OutputFormat::Json => to_json(&transition),
        OutputFormat::Pretty => {
            let mut output = Vec::new();

            if let Transition::Started {
                session,
                ended: Some(ended),
            } = &transition
            {
                output.push(format!(
                    "⏹  Ended {} after {}",
                    ended.item_label,
                    format_hms(ended.elapsed_ms)
                ));
                output.push(format!(
                    "▶  Started {}",
                    session.item_label.green().bold()
                ));
            } else if let Some(session) = transition.session() {
                output.push(format!(
                    "▶  Started {}",
                    session.item_label.green().bold()
                ));
            }

            output.push(String::new());
            output.push("   Use 'focuslog status' to check progress".dimmed().to_string());
            output.push("   Use 'focuslog stop' when done".dimmed().to_string());

            Ok(output.join("\n"))
        }
    }
}

/// Pause the running session.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn pause<C: Clock>(
    tracker: &mut SessionTracker<C>,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let transition = tracker.pause_session();

    match format {
        OutputFormat::Json => to_json(&transition),
        OutputFormat::Pretty => Ok(match &transition {
            Transition::Paused { session } => format!(
                "⏸  Paused at {}\n   Use 'focuslog resume' to continue",
                format_hms(session.elapsed_ms)
            ),
            other => describe_noop(other),
        }),
    }
}

/// Resume the paused session.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn resume<C: Clock>(
    tracker: &mut SessionTracker<C>,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let transition = tracker.resume_session();

    match format {
        OutputFormat::Json => to_json(&transition),
        OutputFormat::Pretty => Ok(match &transition {
            Transition::Resumed { session } => {
                format!("▶  Resumed {}. Stay focused!", session.item_label)
            }
            other => describe_noop(other),
        }),
    }
}

/// End the active session.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn stop<C: Clock>(
    tracker: &mut SessionTracker<C>,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let transition = tracker.end_session();

    match format {
        OutputFormat::Json => to_json(&transition),
        OutputFormat::Pretty => Ok(match &transition {
            Transition::Ended { session } => {
                let mut output = Vec::new();
                output.push(format!("✅ Session ended: {}", session.item_label));
                output.push(format!("   Duration: {}", format_hms(session.elapsed_ms)));
                output.push(format!("   Today:    {}", format_hm(tracker.today_total())));
                output.join("\n")
            }
            other => describe_noop(other),
        }),
    }
}

fn describe_noop(transition: &Transition) -> String {
    match transition {
        Transition::NotRunning => "Session is already paused.".to_string(),
        Transition::NotPaused => "Session is already running.".to_string(),
        _ => "No active focus session.".to_string(),
    }
}

/// Show the active session, optionally redrawing until Ctrl-C.
///
/// # Errors
///
/// Returns an error if JSON serialization or writing to stdout fails.
pub async fn status<C: Clock>(
    tracker: &SessionTracker<C>,
    watch: bool,
    tick: Duration,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let Some(session) = tracker.active_session() else {
        return match format {
            OutputFormat::Json => to_json(&json!({ "state": SessionState::Idle })),
            OutputFormat::Pretty => Ok(
                "No active focus session.\n\nStart one with: focuslog start <item>".to_string(),
            ),
        };
    };

    match format {
        OutputFormat::Json => to_json(&json!({
            "state": tracker.state(),
            "session": session,
            "elapsed_ms": tracker.live_elapsed(),
        })),
        OutputFormat::Pretty if watch && tracker.state() == SessionState::Running => {
            watch_status(tracker, session, tick).await?;
            Ok(String::new())
        }
        OutputFormat::Pretty => Ok(format_status(tracker, session)),
    }
}

fn state_icon(state: SessionState) -> &'static str {
    match state {
        SessionState::Running => "▶",
        SessionState::Paused => "⏸",
        SessionState::Idle => "⏹",
    }
}

fn format_status<C: Clock>(tracker: &SessionTracker<C>, session: &Session) -> String {
    let state = tracker.state();
    let mut output = Vec::new();

    output.push(format!("{} {}", state_icon(state), session.item_label.bold()));
    output.push("─".repeat(40));
    output.push(format!("Item:     {}", session.item_ref));
    output.push(format!("State:    {state}"));
    output.push(format!(
        "Since:    {}",
        session.start_time_local().format("%H:%M")
    ));
    output.push(format!("Elapsed:  {}", format_clock(tracker.live_elapsed())));
    output.push(format!("Today:    {}", format_hm(tracker.today_total())));

    output.join("\n")
}

async fn watch_status<C: Clock>(
    tracker: &SessionTracker<C>,
    session: &Session,
    tick: Duration,
) -> Result<(), FocusError> {
    let mut stdout = std::io::stdout();
    loop {
        write!(
            stdout,
            "\r{} {}  {}  ",
            state_icon(SessionState::Running),
            session.item_label.bold(),
            format_clock(tracker.live_elapsed())
        )?;
        stdout.flush()?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = tokio::time::sleep(tick) => {}
        }
    }
    writeln!(stdout)?;
    Ok(())
}

/// Show totals for every calendar window.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn totals<C: Clock>(
    tracker: &SessionTracker<C>,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let totals: Vec<_> = CalendarWindow::ALL
        .iter()
        .map(|&window| (window, tracker.total_for(window)))
        .collect();

    match format {
        OutputFormat::Json => {
            let mut data = serde_json::Map::new();
            for (window, ms) in &totals {
                data.insert(format!("{}_ms", window.key()), json!(ms));
            }
            data.insert("state".to_string(), json!(tracker.state()));
            to_json(&data)
        }
        OutputFormat::Pretty => {
            let mut output = Vec::new();
            output.push("Focus Totals".bold().to_string());
            output.push("─".repeat(40));
            for (window, ms) in &totals {
                output.push(format!("  {:<12} {}", window.display_name(), format_hm(*ms)));
            }
            if tracker.state() == SessionState::Running {
                output.push(String::new());
                output.push("Includes the running session.".dimmed().to_string());
            }
            Ok(output.join("\n"))
        }
    }
}

/// Show all-time focus on one item.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn item<C: Clock>(
    tracker: &SessionTracker<C>,
    item_ref: &str,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let total = tracker.project_total(item_ref);
    let sessions = tracker
        .log()
        .iter()
        .filter(|s| s.item_ref == item_ref)
        .count();

    match format {
        OutputFormat::Json => to_json(&json!({
            "item_ref": item_ref,
            "total_ms": total,
            "sessions": sessions,
        })),
        OutputFormat::Pretty => Ok(format!(
            "{}: {} ({} sessions)",
            item_ref.bold(),
            format_hms(total),
            sessions
        )),
    }
}

/// Generate a focus report.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn report<C: Clock>(
    tracker: &SessionTracker<C>,
    period: &str,
    format: OutputFormat,
) -> Result<String, FocusError> {
    let report = FocusReport::generate(tracker, CalendarWindow::parse(period));

    match format {
        OutputFormat::Json => to_json(&report),
        OutputFormat::Pretty => Ok(report.format()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;

    fn tracker() -> (SessionTracker<ManualClock>, ManualClock) {
        let clock = ManualClock::new(
            CalendarWindow::Today.start_local(chrono::Utc::now(), chrono::Weekday::Sun)
                + chrono::Duration::hours(12),
        );
        (SessionTracker::new(clock.clone()), clock)
    }

    #[test]
    fn test_start_json() {
        let (mut tracker, _clock) = tracker();
        let out = start(&mut tracker, "docs-42", Some("Write docs"), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["transition"], "started");
        assert_eq!(value["session"]["item_label"], "Write docs");
        assert!(value["ended"].is_null());
    }

    #[test]
    fn test_label_defaults_to_item() {
        let (mut tracker, _clock) = tracker();
        start(&mut tracker, "docs-42", None, OutputFormat::Pretty).unwrap();
        assert_eq!(tracker.log()[0].item_label, "docs-42");
    }

    #[test]
    fn test_idle_commands_are_not_errors() {
        let (mut tracker, _clock) = tracker();
        assert_eq!(
            pause(&mut tracker, OutputFormat::Pretty).unwrap(),
            "No active focus session."
        );
        let out = stop(&mut tracker, OutputFormat::Json).unwrap();
        assert!(out.contains("no_active_session"));
    }

    #[test]
    fn test_totals_json() {
        let (mut tracker, clock) = tracker();
        start(&mut tracker, "a", None, OutputFormat::Json).unwrap();
        clock.advance_millis(5_400_000);

        let out = totals(&tracker, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["today_ms"], 5_400_000);
        assert_eq!(value["state"], "running");

        let pretty = totals(&tracker, OutputFormat::Pretty).unwrap();
        assert!(pretty.contains("1h 30m"));
    }

    #[test]
    fn test_item_total() {
        let (mut tracker, clock) = tracker();
        start(&mut tracker, "a", None, OutputFormat::Json).unwrap();
        clock.advance_millis(3_723_000);
        stop(&mut tracker, OutputFormat::Json).unwrap();

        let out = item(&tracker, "a", OutputFormat::Pretty).unwrap();
        assert!(out.contains("1h 2m 3s"));
        assert!(out.contains("1 sessions"));
    }

    #[tokio::test]
    async fn test_status_idle_json() {
        let (tracker, _clock) = tracker();
        let out = status(&tracker, false, Duration::from_secs(1), OutputFormat::Json)
            .await
            .unwrap();
        assert!(out.contains("idle"));
    }
}
