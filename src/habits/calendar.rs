//! Scope windows: which dates belong to a day, month, or year scope.
//!
//! All functions are pure. Windows are half-open `[from, to)`.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::types::{ScopeKind, TimeScope};
use crate::errors::{HabitError, HabitResult};

/// Date format used on the wire and in period keys.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date < self.to
    }
}

/// The window of `scope` containing `date`.
pub fn window_for(date: NaiveDate, scope: TimeScope) -> DateWindow {
    match scope {
        TimeScope::Day => DateWindow {
            from: date,
            to: date.succ_opt().unwrap_or(NaiveDate::MAX),
        },
        TimeScope::Month => {
            let from = first_of_month(date);
            let (y, m) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            DateWindow {
                from,
                to: NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MAX),
            }
        }
        TimeScope::Year => DateWindow {
            from: NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
            to: NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).unwrap_or(NaiveDate::MAX),
        },
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Cache/period key: `YYYY-MM-DD`, `YYYY-MM`, or `YYYY`.
pub fn period_key(date: NaiveDate, scope: TimeScope) -> String {
    match scope {
        TimeScope::Day => date.format(DATE_FORMAT).to_string(),
        TimeScope::Month => date.format("%Y-%m").to_string(),
        TimeScope::Year => date.format("%Y").to_string(),
    }
}

pub fn parse_date(s: &str) -> HabitResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| HabitError::malformed(format!("malformed date {:?}", s)))
}

/// Days of the month containing `date`, newest first.
///
/// A non-zero `limit` stops at that day of the month, so viewing the current
/// month does not list days in the future.
pub fn days_of_month(date: NaiveDate, limit: u32) -> Vec<NaiveDate> {
    let window = window_for(date, TimeScope::Month);
    let mut last = window.to.pred_opt().unwrap_or(window.from);
    if limit != 0 && limit < last.day() {
        last = last.with_day(limit).unwrap_or(last);
    }
    let mut days = Vec::with_capacity(last.day() as usize);
    let mut cursor = last;
    while cursor >= window.from {
        days.push(cursor);
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    days
}

/// The set of tasks that share a dense ordering.
///
/// Time-scoped tasks are partitioned by window; project tasks form one
/// partition per project regardless of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Partition {
    Window { scope: TimeScope, window: DateWindow },
    Project(i32),
}

impl Partition {
    pub fn of(scope: ScopeKind, date: NaiveDate) -> Self {
        match scope.time_scope() {
            Some(ts) => Partition::Window {
                scope: ts,
                window: window_for(date, ts),
            },
            None => Partition::Project(scope.code()),
        }
    }

    pub fn scope(&self) -> ScopeKind {
        match self {
            Partition::Window { scope, .. } => ScopeKind::from(*scope),
            Partition::Project(id) => ScopeKind::Project(*id),
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Window { scope, window } => {
                write!(f, "{} {}", scope, period_key(window.from, *scope))
            }
            Partition::Project(id) => write!(f, "project {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn day_window_is_one_day() {
        let w = window_for(d(2024, 7, 14), TimeScope::Day);
        assert_eq!(w.from, d(2024, 7, 14));
        assert_eq!(w.to, d(2024, 7, 15));
    }

    #[test]
    fn month_window_rolls_over_december() {
        let w = window_for(d(2023, 12, 31), TimeScope::Month);
        assert_eq!(w.from, d(2023, 12, 1));
        assert_eq!(w.to, d(2024, 1, 1));
    }

    #[test]
    fn month_window_handles_leap_february() {
        let w = window_for(d(2024, 2, 29), TimeScope::Month);
        assert_eq!(w.from, d(2024, 2, 1));
        assert_eq!(w.to, d(2024, 3, 1));
        assert!(w.contains(d(2024, 2, 29)));
        assert!(!w.contains(d(2024, 3, 1)));
    }

    #[test]
    fn year_window_covers_calendar_year() {
        let w = window_for(d(2017, 6, 3), TimeScope::Year);
        assert_eq!(w.from, d(2017, 1, 1));
        assert_eq!(w.to, d(2018, 1, 1));
    }

    #[test]
    fn period_keys() {
        assert_eq!(period_key(d(2024, 7, 4), TimeScope::Month), "2024-07");
        assert_eq!(period_key(d(2024, 7, 4), TimeScope::Year), "2024");
        assert_eq!(period_key(d(2024, 7, 4), TimeScope::Day), "2024-07-04");
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert_eq!(parse_date("2024-07-04").unwrap(), d(2024, 7, 4));
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn days_of_month_newest_first() {
        let days = days_of_month(d(2024, 2, 10), 0);
        assert_eq!(days.len(), 29);
        assert_eq!(days[0], d(2024, 2, 29));
        assert_eq!(days[28], d(2024, 2, 1));
    }

    #[test]
    fn days_of_month_respects_limit() {
        let days = days_of_month(d(2024, 7, 1), 5);
        assert_eq!(
            days,
            vec![d(2024, 7, 5), d(2024, 7, 4), d(2024, 7, 3), d(2024, 7, 2), d(2024, 7, 1)]
        );
        // A limit past the end of the month is ignored
        assert_eq!(days_of_month(d(2024, 4, 1), 40).len(), 30);
    }

    #[test]
    fn partitions_group_by_window_or_project() {
        let a = Partition::of(ScopeKind::Month, d(2024, 7, 1));
        let b = Partition::of(ScopeKind::Month, d(2024, 7, 30));
        let c = Partition::of(ScopeKind::Month, d(2024, 8, 1));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let p1 = Partition::of(ScopeKind::Project(9), d(2020, 1, 1));
        let p2 = Partition::of(ScopeKind::Project(9), d(2024, 1, 1));
        assert_eq!(p1, p2);
        assert_eq!(p1.scope(), ScopeKind::Project(9));
        assert_eq!(a.to_string(), "month 2024-07");
    }
}
