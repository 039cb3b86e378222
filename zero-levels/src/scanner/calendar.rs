//! Calendar period boundaries.
//!
//! Weeks start Monday 00:00 UTC and months start on day 1 at 00:00 UTC.
//! All boundaries of a pass derive from one reference instant.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Calendar period a reference level is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    Month,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Whether `ts` lies inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Whole days spanned by the window.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Period starts derived from a single `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBoundaries {
    pub now: DateTime<Utc>,
    pub this_week: DateTime<Utc>,
    pub last_week: DateTime<Utc>,
    pub this_month: DateTime<Utc>,
    pub last_month: DateTime<Utc>,
}

impl PeriodBoundaries {
    /// Compute boundaries for `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        // Day 1 exists in every month, so `with_day(1)` cannot fail here.
        let first_of_month = today.with_day(1).unwrap_or(today);
        let first_of_last_month = (first_of_month - Duration::days(1))
            .with_day(1)
            .unwrap_or(first_of_month);

        let this_week = midnight(monday);
        Self {
            now,
            this_week,
            last_week: this_week - Duration::weeks(1),
            this_month: midnight(first_of_month),
            last_month: midnight(first_of_last_month),
        }
    }

    /// Start of the period currently in progress.
    pub fn current_start(&self, period: Period) -> DateTime<Utc> {
        match period {
            Period::Week => self.this_week,
            Period::Month => self.this_month,
        }
    }

    /// The completed previous period.
    pub fn previous(&self, period: Period) -> Window {
        let start = match period {
            Period::Week => self.last_week,
            Period::Month => self.last_month,
        };
        Window {
            start,
            end: self.current_start(period),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_midweek_boundaries() {
        // Wednesday
        let b = PeriodBoundaries::at(ts("2024-06-12T15:30:00Z"));
        assert_eq!(b.this_week, ts("2024-06-10T00:00:00Z"));
        assert_eq!(b.last_week, ts("2024-06-03T00:00:00Z"));
        assert_eq!(b.this_month, ts("2024-06-01T00:00:00Z"));
        assert_eq!(b.last_month, ts("2024-05-01T00:00:00Z"));
    }

    #[test]
    fn test_monday_midnight_is_start_of_week() {
        let b = PeriodBoundaries::at(ts("2024-06-10T00:00:00Z"));
        assert_eq!(b.this_week, ts("2024-06-10T00:00:00Z"));
        assert_eq!(b.previous(Period::Week).days(), 7);
    }

    #[test]
    fn test_sunday_belongs_to_previous_monday() {
        let b = PeriodBoundaries::at(ts("2024-06-16T23:59:59Z"));
        assert_eq!(b.this_week, ts("2024-06-10T00:00:00Z"));
    }

    #[test]
    fn test_january_rolls_back_to_december() {
        let b = PeriodBoundaries::at(ts("2025-01-15T08:00:00Z"));
        assert_eq!(b.this_month, ts("2025-01-01T00:00:00Z"));
        assert_eq!(b.last_month, ts("2024-12-01T00:00:00Z"));
        assert_eq!(b.previous(Period::Month).days(), 31);
    }

    #[test]
    fn test_week_spanning_month_boundary() {
        // Monday 2024-07-01 is also the first of the month.
        let b = PeriodBoundaries::at(ts("2024-07-03T12:00:00Z"));
        assert_eq!(b.last_week, ts("2024-06-24T00:00:00Z"));
        assert_eq!(b.last_month, ts("2024-06-01T00:00:00Z"));
        assert_eq!(b.previous(Period::Month).days(), 30);
    }

    #[test]
    fn test_window_is_half_open() {
        let b = PeriodBoundaries::at(ts("2024-06-12T00:00:00Z"));
        let w = b.previous(Period::Week);
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
    }

    proptest! {
        #[test]
        fn prop_boundaries_are_ordered(secs in 946_684_800i64..4_102_444_800i64) {
            let now = Utc.timestamp_opt(secs, 0).unwrap();
            let b = PeriodBoundaries::at(now);

            prop_assert!(b.last_week < b.this_week);
            prop_assert!(b.this_week <= now);
            prop_assert!(now - b.this_week < Duration::weeks(1));
            prop_assert_eq!(b.this_week.weekday(), chrono::Weekday::Mon);

            prop_assert!(b.last_month < b.this_month);
            prop_assert!(b.this_month <= now);
            prop_assert_eq!(b.this_month.day(), 1);
            prop_assert_eq!(b.last_month.day(), 1);
            let month_days = b.previous(Period::Month).days();
            prop_assert!((28..=31).contains(&month_days));
        }
    }
}
