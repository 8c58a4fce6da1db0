//! Task operations.
//!
//! Reads return live rows only (`deleted_at IS NULL`). Writes that touch
//! positions go through the planners in [`crate::habits::ordering`] and run
//! inside a transaction holding the partition's advisory lock.

use chrono::NaiveDate;
use sqlx::PgConnection;

use super::{lock_partition, partition_lock_key, Database, TASK_SELECT};
use crate::errors::{HabitError, HabitResult};
use crate::habits::calendar::{window_for, DateWindow, Partition};
use crate::habits::export::ExportQuery;
use crate::habits::ordering::{self, Direction, PositionUpdate, ReorderPlan};
use crate::habits::types::{Comment, TagLink, Task, TaskDraft, TaskPatch, TaskRow, TimeScope};

/// What a committed reorder did, for cache invalidation and broadcasting.
#[derive(Debug, Clone)]
pub struct ReorderOutcome {
    /// The source task as it was before the move.
    pub source: Task,
    pub target: Task,
    pub plan: ReorderPlan,
}

/// Whether a comment body counts as empty (the editor's blank paragraph included).
pub fn is_blank_comment(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.is_empty() || trimmed == "<p><br></p>"
}

fn rows_to_tasks(rows: Vec<TaskRow>) -> HabitResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

pub(crate) async fn fetch_task(
    conn: &mut PgConnection,
    id: i64,
    for_update: bool,
) -> HabitResult<Option<Task>> {
    let sql = format!(
        "{} WHERE t.id = $1 AND t.deleted_at IS NULL{}",
        TASK_SELECT,
        if for_update { " FOR UPDATE OF t" } else { "" }
    );
    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Task::try_from).transpose()
}

pub(crate) async fn fetch_partition(
    conn: &mut PgConnection,
    partition: &Partition,
) -> HabitResult<Vec<Task>> {
    let rows = match partition {
        Partition::Window { scope, window } => {
            let sql = format!(
                "{} WHERE t.deleted_at IS NULL AND t.scope = $1
                    AND t.date >= $2 AND t.date < $3
                  ORDER BY t.position, t.id",
                TASK_SELECT
            );
            sqlx::query_as::<_, TaskRow>(&sql)
                .bind(scope.code())
                .bind(window.from)
                .bind(window.to)
                .fetch_all(&mut *conn)
                .await?
        }
        Partition::Project(id) => {
            let sql = format!(
                "{} WHERE t.deleted_at IS NULL AND t.scope = $1
                  ORDER BY t.position, t.id",
                TASK_SELECT
            );
            sqlx::query_as::<_, TaskRow>(&sql)
                .bind(*id)
                .fetch_all(&mut *conn)
                .await?
        }
    };
    rows_to_tasks(rows)
}

/// Read `ids` and hold the advisory lock of every partition they live in.
///
/// Partitions are locked before any row lock is taken, in key order, and
/// the tasks are re-read once the locks are held. A task that moved while
/// we waited pulls in its new partition and the read repeats. Rows come
/// back in `ids` order; missing or deleted tasks are `None`.
pub(crate) async fn lock_tasks(
    conn: &mut PgConnection,
    ids: &[i64],
) -> HabitResult<Vec<Option<Task>>> {
    let mut held: Vec<Partition> = Vec::new();
    loop {
        let mut tasks = Vec::with_capacity(ids.len());
        for &id in ids {
            tasks.push(fetch_task(&mut *conn, id, false).await?);
        }

        let mut needed: Vec<Partition> = Vec::new();
        for task in tasks.iter().flatten() {
            let partition = Partition::of(task.scope, task.date);
            if !held.contains(&partition) && !needed.contains(&partition) {
                needed.push(partition);
            }
        }
        if needed.is_empty() {
            return Ok(tasks);
        }
        needed.sort_by_key(partition_lock_key);
        for partition in needed {
            lock_partition(&mut *conn, &partition).await?;
            held.push(partition);
        }
    }
}

pub(crate) async fn apply_updates(
    conn: &mut PgConnection,
    updates: &[PositionUpdate],
) -> HabitResult<()> {
    for update in updates {
        match update.moved_to {
            Some((scope, date)) => {
                sqlx::query(
                    "UPDATE tasks SET position = $1, scope = $2, date = $3, updated_at = now()
                      WHERE id = $4",
                )
                .bind(update.position)
                .bind(scope.code())
                .bind(date)
                .bind(update.id)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query("UPDATE tasks SET position = $1, updated_at = now() WHERE id = $2")
                    .bind(update.position)
                    .bind(update.id)
                    .execute(&mut *conn)
                    .await?;
            }
        }
    }
    Ok(())
}

impl Database {
    pub async fn get_task(&self, id: i64) -> HabitResult<Option<Task>> {
        let mut conn = self.pool.acquire().await?;
        fetch_task(&mut conn, id, false).await
    }

    /// Live tasks of a partition in position order.
    pub async fn tasks_in_partition(&self, partition: &Partition) -> HabitResult<Vec<Task>> {
        let mut conn = self.pool.acquire().await?;
        fetch_partition(&mut conn, partition).await
    }

    /// Live day tasks named `name` inside `window`, oldest first.
    pub async fn day_tasks_named(&self, name: &str, window: &DateWindow) -> HabitResult<Vec<Task>> {
        let sql = format!(
            "{} WHERE t.deleted_at IS NULL AND t.scope = $1 AND t.name = $2
                AND t.date >= $3 AND t.date < $4
              ORDER BY t.date, t.id",
            TASK_SELECT
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(TimeScope::Day.code())
            .bind(name)
            .bind(window.from)
            .bind(window.to)
            .fetch_all(&self.pool)
            .await?;
        rows_to_tasks(rows)
    }

    /// Live tasks for a plain-text export, oldest first.
    pub async fn export_tasks(&self, query: &ExportQuery) -> HabitResult<Vec<Task>> {
        let sql = format!(
            "{} WHERE t.deleted_at IS NULL
                AND strpos(lower(t.name), lower($1)) > 0
                AND ($2::date IS NULL OR t.date >= $2)
                AND t.date < $3
                AND (NOT $4 OR t.scope = $5)
              ORDER BY t.date, t.scope, t.position, t.id",
            TASK_SELECT
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(&query.name)
            .bind(query.from)
            .bind(query.to)
            .bind(query.day_only)
            .bind(TimeScope::Day.code())
            .fetch_all(&self.pool)
            .await?;
        rows_to_tasks(rows)
    }

    /// The month or year task named `name` whose window contains `date`.
    pub async fn find_rollup(
        &self,
        name: &str,
        scope: TimeScope,
        date: NaiveDate,
    ) -> HabitResult<Option<Task>> {
        let window = window_for(date, scope);
        let sql = format!(
            "{} WHERE t.deleted_at IS NULL AND t.scope = $1 AND t.name = $2
                AND t.date >= $3 AND t.date < $4
              ORDER BY t.position, t.id
              LIMIT 1",
            TASK_SELECT
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(scope.code())
            .bind(name)
            .bind(window.from)
            .bind(window.to)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    /// Insert a task at the end of its partition.
    pub async fn insert_task(&self, draft: &TaskDraft) -> HabitResult<Task> {
        let partition = Partition::of(draft.scope, draft.date);
        let mut tx = self.pool.begin().await?;
        lock_partition(&mut tx, &partition).await?;

        let siblings = fetch_partition(&mut tx, &partition).await?;
        let position = ordering::append_position(siblings.len());

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO tasks (name, date, scope, status, position, minutes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&draft.name)
        .bind(draft.date)
        .bind(draft.scope.code())
        .bind(draft.status.code())
        .bind(position)
        .bind(draft.minutes)
        .fetch_one(&mut *tx)
        .await?;

        let task = fetch_task(&mut tx, id, false)
            .await?
            .ok_or_else(|| HabitError::not_found(format!("task {}", id)))?;
        tx.commit().await?;
        Ok(task)
    }

    /// Apply a patch; returns the task before and after.
    pub async fn update_task(&self, id: i64, patch: &TaskPatch) -> HabitResult<(Task, Task)> {
        let mut tx = self.pool.begin().await?;
        let before = fetch_task(&mut tx, id, true)
            .await?
            .ok_or_else(|| HabitError::not_found(format!("task {}", id)))?;
        let mut after = before.clone();
        patch.apply(&mut after);

        sqlx::query(
            "UPDATE tasks SET name = $1, status = $2, minutes = $3, updated_at = now()
              WHERE id = $4",
        )
        .bind(&after.name)
        .bind(after.status.code())
        .bind(after.minutes)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let after = fetch_task(&mut tx, id, false)
            .await?
            .ok_or_else(|| HabitError::not_found(format!("task {}", id)))?;
        tx.commit().await?;
        Ok((before, after))
    }

    /// Soft-delete a task, drop its comment, and close the gap it leaves.
    pub async fn soft_delete_task(&self, id: i64) -> HabitResult<Task> {
        let mut tx = self.pool.begin().await?;
        let task = lock_tasks(&mut tx, &[id])
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| HabitError::not_found(format!("task {}", id)))?;
        let partition = Partition::of(task.scope, task.date);

        sqlx::query("UPDATE tasks SET deleted_at = now(), updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE task_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let siblings = fetch_partition(&mut tx, &partition).await?;
        let updates = ordering::close_gap(&siblings, task.id, task.position);
        apply_updates(&mut tx, &updates).await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Move `source_id` to sit right after `target_id`, possibly across scopes.
    ///
    /// Nothing is written unless both tasks resolve and the plan succeeds.
    pub async fn reorder_tasks(&self, source_id: i64, target_id: i64) -> HabitResult<ReorderOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut locked = lock_tasks(&mut tx, &[source_id, target_id]).await?.into_iter();
        let (source, target) = match (locked.next().flatten(), locked.next().flatten()) {
            (Some(s), Some(t)) => (s, t),
            (None, None) => {
                return Err(HabitError::not_found(format!(
                    "tasks {} and {}",
                    source_id, target_id
                )))
            }
            (None, _) => return Err(HabitError::not_found(format!("task {}", source_id))),
            (_, None) => return Err(HabitError::not_found(format!("task {}", target_id))),
        };

        let source_partition = Partition::of(source.scope, source.date);
        let target_partition = Partition::of(target.scope, target.date);
        let within = ordering::within_scope(&source, &target);

        let source_list = fetch_partition(&mut tx, &source_partition).await?;
        let target_list = if within {
            None
        } else {
            Some(fetch_partition(&mut tx, &target_partition).await?)
        };

        let plan = ordering::plan_reorder(&source, &target, source_list, target_list)?;
        apply_updates(&mut tx, &plan.updates).await?;
        tx.commit().await?;

        Ok(ReorderOutcome {
            source,
            target,
            plan,
        })
    }

    /// Swap a task with its neighbour; `None` when already at that edge.
    pub async fn swap_task(
        &self,
        id: i64,
        direction: Direction,
    ) -> HabitResult<(Task, Option<Vec<PositionUpdate>>)> {
        let mut tx = self.pool.begin().await?;
        let task = lock_tasks(&mut tx, &[id])
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| HabitError::not_found(format!("task {}", id)))?;
        let partition = Partition::of(task.scope, task.date);

        let siblings = fetch_partition(&mut tx, &partition).await?;
        let updates = ordering::plan_swap(&siblings, id, direction)?;
        if let Some(ref updates) = updates {
            apply_updates(&mut tx, updates).await?;
        }
        tx.commit().await?;
        Ok((task, updates))
    }

    /// Create, replace, or (for a blank body) remove a task's comment.
    pub async fn upsert_comment(&self, task_id: i64, body: &str) -> HabitResult<Option<Comment>> {
        let mut tx = self.pool.begin().await?;
        if fetch_task(&mut tx, task_id, true).await?.is_none() {
            return Err(HabitError::not_found(format!("task {}", task_id)));
        }

        let comment = if is_blank_comment(body) {
            sqlx::query("DELETE FROM comments WHERE task_id = $1")
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
            None
        } else {
            let (id, task_id, body): (i64, i64, String) = sqlx::query_as(
                "INSERT INTO comments (task_id, body) VALUES ($1, $2)
                 ON CONFLICT (task_id) DO UPDATE SET body = EXCLUDED.body, updated_at = now()
                 RETURNING id, task_id, body",
            )
            .bind(task_id)
            .bind(body)
            .fetch_one(&mut *tx)
            .await?;
            Some(Comment { id, task_id, body })
        };
        tx.commit().await?;
        Ok(comment)
    }

    /// Attach tag `name` to a live task, creating the tag if needed.
    pub async fn link_tag(&self, task_id: i64, name: &str) -> HabitResult<TagLink> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HabitError::malformed("tag name must not be empty"));
        }
        let mut tx = self.pool.begin().await?;
        if fetch_task(&mut tx, task_id, false).await?.is_none() {
            return Err(HabitError::not_found(format!("task {}", task_id)));
        }
        let tag_id: i64 = sqlx::query_scalar(
            "INSERT INTO tags (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO task_tags (task_id, tag_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(task_id)
        .bind(tag_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(TagLink { task_id, tag_id })
    }

    /// Remove tag `name` from a task. Returns whether a link existed.
    pub async fn unlink_tag(&self, task_id: i64, name: &str) -> HabitResult<bool> {
        let result = sqlx::query(
            "DELETE FROM task_tags tt USING tags g
              WHERE tt.tag_id = g.id AND tt.task_id = $1 AND g.name = $2",
        )
        .bind(task_id)
        .bind(name.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn tags_for_task(&self, task_id: i64) -> HabitResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT g.name FROM task_tags tt JOIN tags g ON g.id = tt.tag_id
              WHERE tt.task_id = $1
              ORDER BY g.name",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_comments_are_detected() {
        assert!(is_blank_comment(""));
        assert!(is_blank_comment("   \n"));
        assert!(is_blank_comment("<p><br></p>"));
        assert!(!is_blank_comment("ran 5k"));
        assert!(!is_blank_comment("<p>ran 5k</p>"));
    }
}
