//! Rolling-window statistics for project scopes.
//!
//! Pinned projects are measured over a trailing window (72 days by default)
//! and compared against a short window right before it to get a direction
//! of progress. Everything else is measured over a long fixed lookback.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::calendar::DateWindow;
use super::types::{ProjectStats, ProjectVisibility};

pub const DEFAULT_WINDOW_DAYS: u32 = 72;

/// Lookback for unpinned and hidden projects (roughly 30 months).
pub const UNPINNED_LOOKBACK_DAYS: u32 = 900;

/// Completed-task count and minutes of a project over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, sqlx::FromRow)]
pub struct ProjectActivity {
    pub completed: i64,
    pub minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectWindows {
    pub recent: DateWindow,
    pub comparison: Option<DateWindow>,
}

/// Length of the comparison window: a tenth of the trailing window, rounded up.
pub fn comparison_days(window_days: u32) -> u32 {
    window_days.max(1).div_ceil(10)
}

/// Windows to measure for a project with `visibility`, ending with `today`.
pub fn project_windows(today: NaiveDate, window_days: u32, visibility: ProjectVisibility) -> ProjectWindows {
    let end = today.succ_opt().unwrap_or(today);
    match visibility {
        ProjectVisibility::Pinned => {
            let days = window_days.max(1);
            let recent = DateWindow {
                from: end - Duration::days(i64::from(days)),
                to: end,
            };
            let comparison = DateWindow {
                from: recent.from - Duration::days(i64::from(comparison_days(days))),
                to: recent.from,
            };
            ProjectWindows {
                recent,
                comparison: Some(comparison),
            }
        }
        ProjectVisibility::Unpinned | ProjectVisibility::Hidden => ProjectWindows {
            recent: DateWindow {
                from: end - Duration::days(i64::from(UNPINNED_LOOKBACK_DAYS)),
                to: end,
            },
            comparison: None,
        },
    }
}

/// Combine the measured windows into project stats.
///
/// The direction is a plain difference of completion counts, a signal and
/// not a rate.
pub fn project_stats(recent: ProjectActivity, comparison: Option<ProjectActivity>) -> ProjectStats {
    ProjectStats {
        completed: recent.completed,
        minutes: recent.minutes,
        progress_direction: comparison.map(|c| recent.completed - c.completed),
    }
}
