//! Duration formatting for focus totals.
//!
//! All formatters take milliseconds, use integer floor division and clamp
//! negative input to zero.

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

fn split(ms: i64) -> (i64, i64, i64) {
    let ms = ms.max(0);
    (
        ms / MS_PER_HOUR,
        (ms % MS_PER_HOUR) / MS_PER_MINUTE,
        (ms % MS_PER_MINUTE) / MS_PER_SECOND,
    )
}

/// Format as `"{h}h {m}m"`, the style used for window totals.
#[must_use]
pub fn format_hm(ms: i64) -> String {
    let (hours, minutes, _) = split(ms);
    format!("{hours}h {minutes}m")
}

/// Format as `"{h}h {m}m {s}s"`, the style used for per-item totals.
#[must_use]
pub fn format_hms(ms: i64) -> String {
    let (hours, minutes, seconds) = split(ms);
    format!("{hours}h {minutes}m {seconds}s")
}

/// Format as `HH:MM:SS` for a ticking status line.
#[must_use]
pub fn format_clock(ms: i64) -> String {
    let (hours, minutes, seconds) = split(ms);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
