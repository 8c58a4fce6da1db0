//! The mutation and read facade over storage, statistics, and sync.
//!
//! Every mutating call commits first and only then publishes. A publish that
//! fails is logged; it never turns a committed change into an error.
//!
//! Publishing follows three shapes:
//!
//! - **with stats**: the changed task plus the month and year tasks it rolls
//!   up into, re-annotated (`UPDATE_TASKS`, or `UPDATE_TASKS_AND_PROJECT`
//!   for project tasks)
//! - **scope**: the whole window of a task, after its order changed
//!   (`UPDATE_SCOPE`)
//! - **projects**: the grouped project list (`PROJECTS`)

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::calendar::{days_of_month, window_for, Partition};
use super::export::{render_export, ExportFilter};
use super::ordering::Direction;
use super::project_stats::{project_stats, project_windows};
use super::repair::{repair_ordering, RepairReport};
use super::stats::{aggregate, StatsCache, StatsKey};
use super::types::{
    Comment, Project, ProjectList, ProjectVisibility, ScopeKind, TagLink, Task, TaskDraft,
    TaskPatch, TimeScope,
};
use crate::db::Database;
use crate::errors::{HabitError, HabitResult};
use crate::events::{ScopeSnapshot, SyncEvent};
use crate::prom_metrics::Metrics;
use crate::sync::HubRegistry;

/// Day tasks of one date, as listed by [`Tracker::tasks_in_days`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTasks {
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
}

/// The month window of a date plus its days view, fetched in one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthAndDays {
    pub days: Vec<DayTasks>,
    pub month: Vec<Task>,
}

pub struct Tracker {
    db: Database,
    stats: StatsCache,
    hubs: HubRegistry,
    metrics: Arc<Metrics>,
    project_window_days: u32,
}

impl Tracker {
    pub fn new(
        db: Database,
        hubs: HubRegistry,
        metrics: Arc<Metrics>,
        stats_cache: bool,
        project_window_days: u32,
    ) -> Self {
        Tracker {
            db,
            stats: StatsCache::new(stats_cache),
            hubs,
            metrics,
            project_window_days: project_window_days.max(1),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn hubs(&self) -> &HubRegistry {
        &self.hubs
    }

    pub fn stats_cache(&self) -> &StatsCache {
        &self.stats
    }

    // ── Statistics ──────────────────────────────────────────────

    /// Attach month/year statistics. Day and project tasks are left alone.
    pub async fn annotate(&self, task: &mut Task) -> HabitResult<()> {
        let scope = match task.scope.time_scope() {
            Some(ts @ (TimeScope::Month | TimeScope::Year)) => ts,
            _ => return Ok(()),
        };
        let key = StatsKey::new(scope, task.date, &task.name);
        if let Some(stats) = self.stats.get(&key) {
            self.metrics.stats_cache_hits.inc();
            task.stats = Some(stats);
            return Ok(());
        }
        self.metrics.stats_cache_misses.inc();

        let generation = self.stats.generation();
        let children = self
            .db
            .day_tasks_named(&task.name, &window_for(task.date, scope))
            .await?;
        let stats = aggregate(scope, &children);
        self.stats.insert_if_current(key, stats, generation);
        task.stats = Some(stats);
        Ok(())
    }

    async fn annotate_all(&self, tasks: &mut [Task]) -> HabitResult<()> {
        for task in tasks.iter_mut() {
            self.annotate(task).await?;
        }
        Ok(())
    }

    fn invalidate(&self, task: &Task) {
        if task.scope == ScopeKind::Day {
            self.stats.invalidate_day(&task.name, task.date);
        }
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Live tasks of the window of `scope` containing `date`, in order.
    pub async fn tasks_in_window(&self, scope: ScopeKind, date: NaiveDate) -> HabitResult<Vec<Task>> {
        let mut tasks = self.db.tasks_in_partition(&Partition::of(scope, date)).await?;
        self.annotate_all(&mut tasks).await?;
        Ok(tasks)
    }

    /// Day tasks for every day of the month of `date`, newest day first.
    pub async fn tasks_in_days(&self, date: NaiveDate, limit: u32) -> HabitResult<Vec<DayTasks>> {
        let mut days = Vec::new();
        for day in days_of_month(date, limit) {
            let tasks = self.tasks_in_window(ScopeKind::Day, day).await?;
            days.push(DayTasks { date: day, tasks });
        }
        Ok(days)
    }

    pub async fn tasks_in_month_and_days(&self, date: NaiveDate, limit: u32) -> HabitResult<MonthAndDays> {
        let days = self.tasks_in_days(date, limit).await?;
        let month = self.tasks_in_window(ScopeKind::Month, date).await?;
        Ok(MonthAndDays { days, month })
    }

    /// Plain-text log of the tasks matching `filter`, one line per task.
    pub async fn export(&self, filter: &ExportFilter) -> HabitResult<String> {
        let query = filter.resolve(chrono::Local::now().date_naive())?;
        let tasks = self.db.export_tasks(&query).await?;
        debug!(name = %query.name, count = tasks.len(), "export");
        Ok(render_export(&tasks))
    }

    pub async fn project(&self, id: i32, window_days: Option<u32>) -> HabitResult<Project> {
        let mut project = self
            .db
            .get_project(id)
            .await?
            .ok_or_else(|| HabitError::not_found(format!("project {}", id)))?;
        self.attach_project_stats(&mut project, window_days).await?;
        Ok(project)
    }

    /// Live projects grouped by visibility, with rolling-window stats.
    pub async fn project_list(&self, window_days: Option<u32>) -> HabitResult<ProjectList> {
        let mut projects = self.db.list_projects().await?;
        for project in projects.iter_mut() {
            self.attach_project_stats(project, window_days).await?;
        }
        Ok(ProjectList::from_projects(projects))
    }

    pub async fn project_tasks(&self, id: i32) -> HabitResult<Vec<Task>> {
        if self.db.get_project(id).await?.is_none() {
            return Err(HabitError::not_found(format!("project {}", id)));
        }
        self.db.tasks_in_partition(&Partition::Project(id)).await
    }

    async fn attach_project_stats(&self, project: &mut Project, window_days: Option<u32>) -> HabitResult<()> {
        let today = chrono::Local::now().date_naive();
        let days = window_days.unwrap_or(self.project_window_days).max(1);
        let windows = project_windows(today, days, project.visibility);
        let recent = self.db.project_activity(project.id, &windows.recent).await?;
        let comparison = match windows.comparison {
            Some(ref w) => Some(self.db.project_activity(project.id, w).await?),
            None => None,
        };
        project.stats = Some(project_stats(recent, comparison));
        Ok(())
    }

    // ── Task mutations ──────────────────────────────────────────

    pub async fn create_task(&self, draft: TaskDraft) -> HabitResult<Task> {
        if let ScopeKind::Project(id) = draft.scope {
            if self.db.get_project(id).await?.is_none() {
                return Err(HabitError::not_found(format!("project {}", id)));
            }
        }
        let mut task = self.db.insert_task(&draft).await?;
        info!(id = task.id, scope = task.scope.code(), date = %task.date, "task created");

        self.invalidate(&task);
        if let ScopeKind::Project(id) = task.scope {
            if let Err(e) = self.db.touch_project(id).await {
                warn!(project = id, error = %e, "failed to touch project after task insert");
            }
        }
        self.annotate(&mut task).await?;
        self.sync_with_stats(&task, true).await;
        Ok(task)
    }

    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> HabitResult<Task> {
        if let Some(ref name) = patch.name {
            if name.trim().is_empty() {
                return Err(HabitError::malformed("task name must not be empty"));
            }
        }
        if let Some(m) = patch.minutes {
            if m < 0 {
                return Err(HabitError::malformed(format!("negative minutes {}", m)));
            }
        }
        let (before, mut after) = self.db.update_task(id, &patch).await?;
        debug!(id, "task updated");

        if patch.touches_aggregates() {
            self.invalidate(&before);
            self.invalidate(&after);
        }
        self.annotate(&mut after).await?;
        if before.name != after.name {
            // Old roll-ups lost a child.
            self.sync_with_stats(&before, false).await;
        }
        self.sync_with_stats(&after, true).await;
        Ok(after)
    }

    pub async fn delete_task(&self, id: i64) -> HabitResult<Task> {
        let task = self.db.soft_delete_task(id).await?;
        info!(id, scope = task.scope.code(), date = %task.date, "task deleted");

        self.invalidate(&task);
        self.sync_scope(&task).await;
        self.sync_with_stats(&task, false).await;
        Ok(task)
    }

    /// Move `source` to sit right after `target`.
    pub async fn reorder(&self, source: i64, target: i64) -> HabitResult<()> {
        let outcome = self.db.reorder_tasks(source, target).await?;
        info!(
            source,
            target,
            within_scope = outcome.plan.within_scope,
            updates = outcome.plan.updates.len(),
            "tasks reordered"
        );

        if !outcome.plan.within_scope {
            // The moved task left one aggregate and joined another.
            self.invalidate(&outcome.source);
            let mut moved = outcome.source.clone();
            moved.scope = outcome.target.scope;
            moved.date = outcome.target.date;
            self.invalidate(&moved);
        }
        for partition in outcome.plan.touched_partitions(&outcome.source, &outcome.target) {
            let anchor = match partition {
                Partition::Window { window, .. } => window.from,
                Partition::Project(_) => outcome.target.date,
            };
            self.publish_scope(partition.scope(), anchor).await;
        }
        Ok(())
    }

    /// Swap with the neighbour above or below.
    pub async fn move_task(&self, id: i64, direction: Direction) -> HabitResult<()> {
        let (task, updates) = self.db.swap_task(id, direction).await?;
        if updates.is_some() {
            debug!(id, ?direction, "task swapped");
            self.sync_scope(&task).await;
        }
        Ok(())
    }

    /// Set or clear a task's comment. A blank body removes it.
    pub async fn update_comment(&self, task_id: i64, body: &str) -> HabitResult<Option<Comment>> {
        let comment = self.db.upsert_comment(task_id, body).await?;
        if let Some(mut task) = self.db.get_task(task_id).await? {
            self.annotate(&mut task).await?;
            self.sync_with_stats(&task, true).await;
        }
        Ok(comment)
    }

    pub async fn link_tag(&self, task_id: i64, tag: &str) -> HabitResult<TagLink> {
        self.db.link_tag(task_id, tag).await
    }

    pub async fn unlink_tag(&self, task_id: i64, tag: &str) -> HabitResult<bool> {
        self.db.unlink_tag(task_id, tag).await
    }

    // ── Project mutations ───────────────────────────────────────

    pub async fn create_project(&self, name: &str) -> HabitResult<Project> {
        let project = self.db.create_project(name).await?;
        info!(id = project.id, name = %project.name, "project created");
        self.publish_projects().await;
        Ok(project)
    }

    /// Delete a project and all of its tasks.
    pub async fn delete_project(&self, id: i32) -> HabitResult<u64> {
        let tasks = self.db.delete_project(id).await?;
        info!(id, tasks, "project deleted");
        self.publish_projects().await;
        Ok(tasks)
    }

    pub async fn rename_project(&self, id: i32, name: &str) -> HabitResult<Project> {
        let project = self.db.rename_project(id, name).await?;
        self.publish_projects().await;
        Ok(project)
    }

    /// Flip between pinned and unpinned. Hidden projects become unpinned.
    pub async fn toggle_project_visibility(&self, id: i32) -> HabitResult<Project> {
        let current = self
            .db
            .get_project(id)
            .await?
            .ok_or_else(|| HabitError::not_found(format!("project {}", id)))?;
        self.set_project_visibility(id, current.visibility.toggled()).await
    }

    pub async fn set_project_visibility(&self, id: i32, visibility: ProjectVisibility) -> HabitResult<Project> {
        let project = self.db.set_project_visibility(id, visibility).await?;
        debug!(id, visibility = visibility.code(), "project visibility changed");
        self.publish_projects().await;
        Ok(project)
    }

    // ── Maintenance ─────────────────────────────────────────────

    pub async fn repair_ordering(&self, apply: bool) -> HabitResult<RepairReport> {
        let report = repair_ordering(&self.db, apply).await?;
        if apply && report.tasks_corrected > 0 {
            self.stats.clear();
        }
        Ok(report)
    }

    // ── Publishing ──────────────────────────────────────────────

    async fn publish(&self, event: SyncEvent) {
        match self.hubs.send(&event).await {
            Ok(fan_out) => debug!(
                kind = event.kind(),
                delivered = fan_out.delivered,
                dropped = fan_out.dropped,
                "sync event published"
            ),
            Err(e) => warn!(kind = event.kind(), error = %e, "failed to publish sync event"),
        }
    }

    /// Publish `task` (optionally) with the roll-ups it feeds.
    async fn sync_with_stats(&self, task: &Task, include_task: bool) {
        let mut tasks = Vec::new();
        if task.scope == ScopeKind::Day {
            for scope in [TimeScope::Year, TimeScope::Month] {
                match self.rollup(&task.name, scope, task.date).await {
                    Ok(Some(rollup)) => tasks.push(rollup),
                    Ok(None) => {}
                    Err(e) => warn!(id = task.id, error = %e, "failed to load roll-up for sync"),
                }
            }
        }
        if include_task {
            tasks.push(task.clone());
        }

        if let ScopeKind::Project(id) = task.scope {
            match self.project(id, None).await {
                Ok(project) => {
                    self.publish(SyncEvent::TasksAndProjectUpdated { tasks, project })
                        .await;
                    return;
                }
                Err(e) => warn!(project = id, error = %e, "failed to load project for sync"),
            }
        }
        if !tasks.is_empty() {
            self.publish(SyncEvent::TasksUpdated { tasks }).await;
        }
    }

    async fn rollup(&self, name: &str, scope: TimeScope, date: NaiveDate) -> HabitResult<Option<Task>> {
        match self.db.find_rollup(name, scope, date).await? {
            Some(mut task) => {
                self.annotate(&mut task).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn sync_scope(&self, task: &Task) {
        self.publish_scope(task.scope, task.date).await;
    }

    /// Re-send the whole window of `scope` containing `date`.
    async fn publish_scope(&self, scope: ScopeKind, date: NaiveDate) {
        let tasks = match self.tasks_in_window(scope, date).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(scope = scope.code(), date = %date, error = %e, "failed to load scope for sync");
                return;
            }
        };
        let name = match scope {
            ScopeKind::Project(id) => match self.db.get_project(id).await {
                Ok(Some(p)) => p.name,
                Ok(None) => String::new(),
                Err(e) => {
                    warn!(project = id, error = %e, "failed to load project name for sync");
                    String::new()
                }
            },
            _ => String::new(),
        };
        self.publish(SyncEvent::ScopeResynced(ScopeSnapshot {
            date,
            scope,
            name,
            tasks,
        }))
        .await;
    }

    async fn publish_projects(&self) {
        match self.project_list(None).await {
            Ok(list) => self.publish(SyncEvent::ProjectListChanged(list)).await,
            Err(e) => warn!(error = %e, "failed to load project list for sync"),
        }
    }
}
