//! Plain-text export of tasks, one line per task.
//!
//! A line is the task name, its date in the scope's granularity, and the
//! comment body, separated by single spaces and ended with `\r\n`. Comment
//! bodies are emitted as stored; no markup conversion happens here.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use super::types::{ScopeKind, Task};
use crate::errors::{HabitError, HabitResult};

/// Filter for [`crate::habits::Tracker::export`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExportFilter {
    /// Case-insensitive substring of the task name. Empty matches all.
    #[serde(default)]
    pub name: String,
    /// First included date. `None` means no lower bound.
    #[serde(default)]
    pub begin: Option<NaiveDate>,
    /// Last included date. `None` means today.
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Only day tasks.
    #[serde(default)]
    pub day: bool,
}

/// Resolved half-open date range and scope restriction for the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportQuery {
    pub name: String,
    pub from: Option<NaiveDate>,
    pub to: NaiveDate,
    pub day_only: bool,
}

impl ExportFilter {
    /// Resolve defaults against `today`; the end date is inclusive.
    pub fn resolve(&self, today: NaiveDate) -> HabitResult<ExportQuery> {
        let end = self.end.unwrap_or(today);
        if let Some(begin) = self.begin {
            if begin > end {
                return Err(HabitError::malformed(format!(
                    "export range starts {} after it ends {}",
                    begin, end
                )));
            }
        }
        Ok(ExportQuery {
            name: self.name.trim().to_string(),
            from: self.begin,
            to: end + Duration::days(1),
            day_only: self.day,
        })
    }
}

fn format_date(scope: ScopeKind, date: NaiveDate) -> String {
    match scope {
        ScopeKind::Year => date.format("%Y").to_string(),
        ScopeKind::Month => date.format("%Y-%m").to_string(),
        ScopeKind::Day | ScopeKind::Project(_) => date.format("%A, %B %e, %Y").to_string(),
    }
}

/// One export line, without a trailing space when there is no comment.
pub fn export_line(task: &Task) -> String {
    let date = format_date(task.scope, task.date);
    match task.comment.as_ref().map(|c| c.body.trim()) {
        Some(body) if !body.is_empty() => format!("{} {} {}\r\n", task.name, date, body),
        _ => format!("{} {}\r\n", task.name, date),
    }
}

pub fn render_export(tasks: &[Task]) -> String {
    tasks.iter().map(export_line).collect()
}
