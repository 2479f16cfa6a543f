//! Calendar window boundaries.
//!
//! Windows start at local midnight and are recomputed from "now" on every
//! query, so a query made after midnight sees the new day immediately.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A calendar period that aggregation queries can be bounded by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarWindow {
    /// Since local midnight today.
    Today,
    /// Since local midnight on the most recent week-start day.
    Week,
    /// Since local midnight on day 1 of the current month.
    Month,
    /// Since local midnight on January 1 of the current year.
    Year,
}

impl CalendarWindow {
    /// All windows, shortest first.
    pub const ALL: [Self; 4] = [Self::Today, Self::Week, Self::Month, Self::Year];

    /// Start of this window in the time zone of `now`.
    #[must_use]
    pub fn start_in<Tz: TimeZone>(self, now: &DateTime<Tz>, week_starts_on: Weekday) -> DateTime<Utc> {
        let today = now.date_naive();
        let first_day = match self {
            Self::Today => today,
            Self::Week => {
                let back = days_since_week_start(today.weekday(), week_starts_on);
                today - Duration::days(i64::from(back))
            }
            Self::Month => today.with_day(1).unwrap_or(today),
            Self::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        midnight(&now.timezone(), first_day)
    }

    /// Start of this window in the system's local time zone.
    #[must_use]
    pub fn start_local(self, now: DateTime<Utc>, week_starts_on: Weekday) -> DateTime<Utc> {
        self.start_in(&now.with_timezone(&Local), week_starts_on)
    }

    /// Parse a window name. Unknown input falls back to `Today`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "week" | "w" => Self::Week,
            "month" | "m" => Self::Month,
            "year" | "y" => Self::Year,
            _ => Self::Today,
        }
    }

    /// Short lowercase name, as accepted by [`CalendarWindow::parse`].
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Get display name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Week => "This Week",
            Self::Month => "This Month",
            Self::Year => "This Year",
        }
    }
}

impl std::fmt::Display for CalendarWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

fn days_since_week_start(day: Weekday, week_starts_on: Weekday) -> u32 {
    (7 + day.num_days_from_sunday() - week_starts_on.num_days_from_sunday()) % 7
}

/// Local midnight of `date` in `tz`, as a UTC instant.
///
/// When a DST transition skips midnight the first existing local instant
/// after it is used.
pub fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::default());
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map_or_else(
            || tz.from_utc_datetime(&naive).with_timezone(&Utc),
            |t| t.with_timezone(&Utc),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(tz: &FixedOffset, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        tz.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_today_starts_at_local_midnight() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 2024-03-13 is a Wednesday
        let now = at(&tz, 2024, 3, 13, 15, 30);

        let start = CalendarWindow::Today.start_in(&now, Weekday::Sun);
        assert_eq!(start, at(&tz, 2024, 3, 13, 0, 0).with_timezone(&Utc));
    }

    #[test]
    fn test_week_starts_on_sunday_by_default() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let now = at(&tz, 2024, 3, 13, 9, 0);

        let start = CalendarWindow::Week.start_in(&now, Weekday::Sun);
        assert_eq!(start, at(&tz, 2024, 3, 10, 0, 0).with_timezone(&Utc));
    }

    #[test]
    fn test_week_start_monday() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let now = at(&tz, 2024, 3, 13, 9, 0);

        let start = CalendarWindow::Week.start_in(&now, Weekday::Mon);
        assert_eq!(start, at(&tz, 2024, 3, 11, 0, 0).with_timezone(&Utc));
    }

    #[test]
    fn test_week_on_first_day_equals_today() {
        let tz = FixedOffset::east_opt(0).unwrap();
        // 2024-03-10 is a Sunday
        let now = at(&tz, 2024, 3, 10, 23, 59);

        assert_eq!(
            CalendarWindow::Week.start_in(&now, Weekday::Sun),
            CalendarWindow::Today.start_in(&now, Weekday::Sun)
        );
    }

    #[test]
    fn test_month_and_year() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = at(&tz, 2024, 7, 20, 1, 0);

        assert_eq!(
            CalendarWindow::Month.start_in(&now, Weekday::Sun),
            at(&tz, 2024, 7, 1, 0, 0).with_timezone(&Utc)
        );
        assert_eq!(
            CalendarWindow::Year.start_in(&now, Weekday::Sun),
            at(&tz, 2024, 1, 1, 0, 0).with_timezone(&Utc)
        );
    }

    #[test]
    fn test_window_crosses_midnight() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let before = at(&tz, 2024, 3, 13, 23, 59);
        let after = before + Duration::minutes(2);

        let day1 = CalendarWindow::Today.start_in(&before, Weekday::Sun);
        let day2 = CalendarWindow::Today.start_in(&after, Weekday::Sun);
        assert_eq!(day2 - day1, Duration::days(1));
    }

    #[test]
    fn test_parse() {
        assert_eq!(CalendarWindow::parse("today"), CalendarWindow::Today);
        assert_eq!(CalendarWindow::parse("W"), CalendarWindow::Week);
        assert_eq!(CalendarWindow::parse("month"), CalendarWindow::Month);
        assert_eq!(CalendarWindow::parse("y"), CalendarWindow::Year);
        assert_eq!(CalendarWindow::parse("bogus"), CalendarWindow::Today);
    }
}
