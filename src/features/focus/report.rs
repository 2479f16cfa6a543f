//! Focus reports.
//!
//! Summarizes the tracker's log over a calendar window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;

use super::timer::{format_hm, format_hms};
use super::tracker::SessionTracker;
use crate::core::{CalendarWindow, Clock};

/// Focus report data.
#[derive(Debug, Clone, Serialize)]
pub struct FocusReport {
    /// Report window
    pub window: CalendarWindow,
    /// When the window starts
    pub window_start: DateTime<Utc>,
    /// Total focus time in milliseconds
    pub total_ms: i64,
    /// Sessions started in the window
    pub sessions: usize,
    /// Average session length in milliseconds
    pub avg_session_ms: i64,
    /// Longest session in milliseconds
    pub longest_session_ms: i64,
    /// Focus time by work item, largest first
    pub by_item: Vec<ItemFocusTime>,
    /// Daily breakdown, most recent first
    pub daily: Vec<DailyFocusTime>,
    /// Consecutive days with focus time, ending today or yesterday
    pub streak_days: i64,
}

/// Focus time per work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFocusTime {
    /// Work-item reference
    pub item_ref: String,
    /// Label of the most recent session for the item
    pub item_label: String,
    /// Total focus milliseconds
    pub ms: i64,
    /// Session count
    pub sessions: usize,
}

/// Focus time per local day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyFocusTime {
    /// Local date
    pub date: NaiveDate,
    /// Total focus milliseconds
    pub ms: i64,
    /// Session count
    pub sessions: usize,
}

impl FocusReport {
    /// Generate a report for `window` as of the tracker's current instant.
    ///
    /// The running session contributes its live elapsed time, so `total_ms`
    /// matches [`SessionTracker::total_for`].
    #[must_use]
    pub fn generate<C: Clock>(tracker: &SessionTracker<C>, window: CalendarWindow) -> Self {
        let now = tracker.now();
        let window_start = tracker.window_start(window);

        let in_window: Vec<_> = tracker
            .log()
            .iter()
            .filter(|s| s.start_time >= window_start)
            .map(|s| (s, s.elapsed_at(now)))
            .collect();

        let total_ms: i64 = in_window.iter().map(|(_, ms)| ms).sum();
        let sessions = in_window.len();
        let avg_session_ms = i64::try_from(sessions)
            .ok()
            .filter(|&n| n > 0)
            .map_or(0, |n| total_ms / n);
        let longest_session_ms = in_window.iter().map(|(_, ms)| *ms).max().unwrap_or(0);

        // By item; later sessions win the label
        let mut item_map: HashMap<&str, ItemFocusTime> = HashMap::new();
        let mut ordered = in_window.clone();
        ordered.sort_by_key(|(s, _)| s.start_time);
        for (session, ms) in &ordered {
            let entry = item_map
                .entry(session.item_ref.as_str())
                .or_insert_with(|| ItemFocusTime {
                    item_ref: session.item_ref.clone(),
                    item_label: String::new(),
                    ms: 0,
                    sessions: 0,
                });
            entry.item_label.clone_from(&session.item_label);
            entry.ms += ms;
            entry.sessions += 1;
        }
        let mut by_item: Vec<_> = item_map.into_values().collect();
        by_item.sort_by(|a, b| b.ms.cmp(&a.ms).then_with(|| a.item_ref.cmp(&b.item_ref)));

        // Daily breakdown
        let mut daily_map: HashMap<NaiveDate, (i64, usize)> = HashMap::new();
        for (session, ms) in &in_window {
            let entry = daily_map
                .entry(session.start_time_local().date_naive())
                .or_insert((0, 0));
            entry.0 += ms;
            entry.1 += 1;
        }
        let mut daily: Vec<_> = daily_map
            .into_iter()
            .map(|(date, (ms, sessions))| DailyFocusTime { date, ms, sessions })
            .collect();
        daily.sort_by(|a, b| b.date.cmp(&a.date));

        let focus_days: Vec<_> = tracker
            .log()
            .iter()
            .filter(|s| s.elapsed_at(now) > 0)
            .map(|s| s.start_time_local().date_naive())
            .collect();
        let streak_days = calculate_streak(focus_days, now.with_timezone(&Local).date_naive());

        Self {
            window,
            window_start,
            total_ms,
            sessions,
            avg_session_ms,
            longest_session_ms,
            by_item,
            daily,
            streak_days,
        }
    }

    /// Format the report for display.
    #[must_use]
    pub fn format(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Focus Report: {}", self.window.display_name()));
        lines.push("═".repeat(50));
        lines.push(String::new());

        lines.push("Summary".to_string());
        lines.push("─".repeat(40));
        lines.push(format!("  Total focus time:  {}", format_hm(self.total_ms)));
        lines.push(format!("  Sessions:          {}", self.sessions));
        lines.push(format!(
            "  Average session:   {}",
            format_hm(self.avg_session_ms)
        ));
        lines.push(format!(
            "  Longest session:   {}",
            format_hm(self.longest_session_ms)
        ));
        lines.push(format!("  Current streak:    {} days", self.streak_days));
        lines.push(String::new());

        if !self.by_item.is_empty() {
            lines.push("Top Items".to_string());
            lines.push("─".repeat(40));

            for item in self.by_item.iter().take(5) {
                let name = if item.item_label.chars().count() > 25 {
                    format!("{}...", item.item_label.chars().take(22).collect::<String>())
                } else {
                    item.item_label.clone()
                };
                lines.push(format!(
                    "  {:<25} {:>12} ({} sessions)",
                    name,
                    format_hms(item.ms),
                    item.sessions
                ));
            }
            lines.push(String::new());
        }

        if !self.daily.is_empty() {
            lines.push("Recent Days".to_string());
            lines.push("─".repeat(40));

            for day in self.daily.iter().take(7) {
                lines.push(format!(
                    "  {} {:>8} ({} sessions)",
                    day.date,
                    format_hm(day.ms),
                    day.sessions
                ));
            }
        }

        lines.join("\n")
    }
}

/// Count consecutive focus days ending today, or yesterday when nothing has
/// been logged today yet.
fn calculate_streak(mut dates: Vec<NaiveDate>, today: NaiveDate) -> i64 {
    dates.sort_unstable();
    dates.dedup();

    let mut check_date = today;
    if dates.binary_search(&today).is_err() {
        check_date = today - Duration::days(1);
    }

    let mut streak = 0;
    while dates.binary_search(&check_date).is_ok() {
        streak += 1;
        check_date -= Duration::days(1);
    }

    streak
}
