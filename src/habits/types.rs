//! Task, project, and comment types.
//!
//! Rows come out of PostgreSQL as raw `*Row` structs via `sqlx::FromRow` and
//! are validated into the domain types here, so an out-of-range scope or
//! status stored by hand surfaces as `MalformedInput` instead of a panic.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{HabitError, HabitResult};

/// Scope codes at or above this value name a user-defined project.
pub const SCOPE_PROJECT_THRESHOLD: i32 = 4;

/// Built-in time granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeScope {
    Day,
    Month,
    Year,
}

impl TimeScope {
    pub fn code(self) -> i32 {
        match self {
            TimeScope::Day => 1,
            TimeScope::Month => 2,
            TimeScope::Year => 3,
        }
    }
}

impl std::fmt::Display for TimeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeScope::Day => write!(f, "day"),
            TimeScope::Month => write!(f, "month"),
            TimeScope::Year => write!(f, "year"),
        }
    }
}

/// The scope a task belongs to: a time scope or a project id.
///
/// Persisted as a single integer: 1 = day, 2 = month, 3 = year, and any
/// value `>= SCOPE_PROJECT_THRESHOLD` is the id of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ScopeKind {
    Day,
    Month,
    Year,
    Project(i32),
}

impl ScopeKind {
    pub fn code(self) -> i32 {
        match self {
            ScopeKind::Day => 1,
            ScopeKind::Month => 2,
            ScopeKind::Year => 3,
            ScopeKind::Project(id) => id,
        }
    }

    /// `None` for projects, which have no date window.
    pub fn time_scope(self) -> Option<TimeScope> {
        match self {
            ScopeKind::Day => Some(TimeScope::Day),
            ScopeKind::Month => Some(TimeScope::Month),
            ScopeKind::Year => Some(TimeScope::Year),
            ScopeKind::Project(_) => None,
        }
    }

    pub fn is_project(self) -> bool {
        matches!(self, ScopeKind::Project(_))
    }

    /// Month and year tasks carry statistics aggregated from day tasks.
    pub fn is_aggregated(self) -> bool {
        matches!(self, ScopeKind::Month | ScopeKind::Year)
    }
}

impl From<TimeScope> for ScopeKind {
    fn from(scope: TimeScope) -> Self {
        match scope {
            TimeScope::Day => ScopeKind::Day,
            TimeScope::Month => ScopeKind::Month,
            TimeScope::Year => ScopeKind::Year,
        }
    }
}

impl TryFrom<i32> for ScopeKind {
    type Error = HabitError;

    fn try_from(code: i32) -> HabitResult<Self> {
        match code {
            1 => Ok(ScopeKind::Day),
            2 => Ok(ScopeKind::Month),
            3 => Ok(ScopeKind::Year),
            id if id >= SCOPE_PROJECT_THRESHOLD => Ok(ScopeKind::Project(id)),
            other => Err(HabitError::malformed(format!("invalid scope {}", other))),
        }
    }
}

impl From<ScopeKind> for i32 {
    fn from(scope: ScopeKind) -> i32 {
        scope.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TaskStatus {
    #[default]
    Unset,
    Complete,
    Incomplete,
}

impl TaskStatus {
    pub fn code(self) -> i32 {
        match self {
            TaskStatus::Unset => 0,
            TaskStatus::Complete => 1,
            TaskStatus::Incomplete => 2,
        }
    }
}

impl TryFrom<i32> for TaskStatus {
    type Error = HabitError;

    fn try_from(code: i32) -> HabitResult<Self> {
        match code {
            0 => Ok(TaskStatus::Unset),
            1 => Ok(TaskStatus::Complete),
            2 => Ok(TaskStatus::Incomplete),
            other => Err(HabitError::malformed(format!("invalid status {}", other))),
        }
    }
}

impl From<TaskStatus> for i32 {
    fn from(status: TaskStatus) -> i32 {
        status.code()
    }
}

/// Whether a project shows rolling-window stats, all-time stats, or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ProjectVisibility {
    Hidden,
    #[default]
    Unpinned,
    Pinned,
}

impl ProjectVisibility {
    pub fn code(self) -> i32 {
        match self {
            ProjectVisibility::Hidden => 0,
            ProjectVisibility::Unpinned => 1,
            ProjectVisibility::Pinned => 2,
        }
    }

    /// Pin toggle: pinned and unpinned swap, a hidden project comes back unpinned.
    pub fn toggled(self) -> Self {
        match self {
            ProjectVisibility::Pinned => ProjectVisibility::Unpinned,
            ProjectVisibility::Unpinned => ProjectVisibility::Pinned,
            ProjectVisibility::Hidden => ProjectVisibility::Unpinned,
        }
    }
}

impl TryFrom<i32> for ProjectVisibility {
    type Error = HabitError;

    fn try_from(code: i32) -> HabitResult<Self> {
        match code {
            0 => Ok(ProjectVisibility::Hidden),
            1 => Ok(ProjectVisibility::Unpinned),
            2 => Ok(ProjectVisibility::Pinned),
            other => Err(HabitError::malformed(format!(
                "invalid project visibility {}",
                other
            ))),
        }
    }
}

impl From<ProjectVisibility> for i32 {
    fn from(v: ProjectVisibility) -> i32 {
        v.code()
    }
}

// ── Tasks ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub body: String,
}

/// Statistics derived from day tasks. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub minutes: i64,
    pub completed: i64,
    pub total: i64,
    pub total_with_time: i64,
    /// -1 when there are no day tasks to aggregate.
    pub completion_rate: i64,
    /// Year tasks only.
    pub streak: Option<i64>,
    pub best_streak: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub scope: ScopeKind,
    pub status: TaskStatus,
    pub position: i32,
    pub minutes: Option<i32>,
    pub comment: Option<Comment>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stats: Option<TaskStats>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Task row joined with its (optional) comment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub scope: i32,
    pub status: i32,
    pub position: i32,
    pub minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub comment_id: Option<i64>,
    pub comment_body: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = HabitError;

    fn try_from(row: TaskRow) -> HabitResult<Self> {
        let comment = match (row.comment_id, row.comment_body) {
            (Some(id), Some(body)) => Some(Comment {
                id,
                task_id: row.id,
                body,
            }),
            _ => None,
        };
        Ok(Task {
            id: row.id,
            name: row.name,
            date: row.date,
            scope: ScopeKind::try_from(row.scope)?,
            status: TaskStatus::try_from(row.status)?,
            position: row.position,
            minutes: row.minutes,
            comment,
            stats: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// A validated request to create a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub name: String,
    pub date: NaiveDate,
    pub scope: ScopeKind,
    pub status: TaskStatus,
    pub minutes: Option<i32>,
}

impl TaskDraft {
    /// Validate raw caller input. Nothing touches the store until this passes.
    pub fn parse(
        name: &str,
        date: &str,
        scope: i32,
        status: Option<i32>,
        minutes: Option<i32>,
    ) -> HabitResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HabitError::malformed("task name must not be empty"));
        }
        if let Some(m) = minutes {
            if m < 0 {
                return Err(HabitError::malformed(format!("negative minutes {}", m)));
            }
        }
        Ok(TaskDraft {
            name: name.to_string(),
            date: super::calendar::parse_date(date)?,
            scope: ScopeKind::try_from(scope)?,
            status: status.map(TaskStatus::try_from).transpose()?.unwrap_or_default(),
            minutes,
        })
    }
}

/// Field changes applied by `update_task`. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub status: Option<TaskStatus>,
    pub minutes: Option<i32>,
    pub clear_minutes: bool,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if self.clear_minutes {
            task.minutes = None;
        } else if let Some(m) = self.minutes {
            task.minutes = Some(m);
        }
    }

    /// Name and status changes move the task between roll-up aggregates.
    pub fn touches_aggregates(&self) -> bool {
        self.name.is_some() || self.status.is_some() || self.minutes.is_some() || self.clear_minutes
    }
}

// ── Projects ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectStats {
    pub completed: i64,
    pub minutes: i64,
    /// Pinned projects only: recent completions minus comparison-window completions.
    pub progress_direction: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub visibility: ProjectVisibility,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stats: Option<ProjectStats>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i32,
    pub name: String,
    pub visibility: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = HabitError;

    fn try_from(row: ProjectRow) -> HabitResult<Self> {
        Ok(Project {
            id: row.id,
            name: row.name,
            visibility: ProjectVisibility::try_from(row.visibility)?,
            stats: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Project {
    pub fn scope(&self) -> ScopeKind {
        ScopeKind::Project(self.id)
    }
}

/// Projects grouped by visibility, most recently touched first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectList {
    pub pinned: Vec<Project>,
    pub unpinned: Vec<Project>,
    pub hidden: Vec<Project>,
}

impl ProjectList {
    pub fn from_projects(projects: Vec<Project>) -> Self {
        let mut list = ProjectList::default();
        for p in projects {
            match p.visibility {
                ProjectVisibility::Pinned => list.pinned.push(p),
                ProjectVisibility::Unpinned => list.unpinned.push(p),
                ProjectVisibility::Hidden => list.hidden.push(p),
            }
        }
        list
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.unpinned.len() + self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Explicit tag-to-task association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagLink {
    pub task_id: i64,
    pub tag_id: i64,
}
