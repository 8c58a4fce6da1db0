//! Reads and writes used by ordering repair.

use chrono::NaiveDate;

use super::tasks::{apply_updates, fetch_partition};
use super::{lock_partition, Database};
use crate::errors::HabitResult;
use crate::habits::calendar::Partition;
use crate::habits::ordering::renumber;
use crate::habits::types::TagLink;

/// The minimum of a task row needed to check partition density.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PositionRow {
    pub id: i64,
    pub scope: i32,
    pub date: NaiveDate,
    pub position: i32,
}

impl Database {
    /// Every live task's partition coordinates.
    pub async fn live_positions(&self) -> HabitResult<Vec<PositionRow>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT id, scope, date, position FROM tasks
              WHERE deleted_at IS NULL
              ORDER BY scope, date, position, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Renumber one partition to `0..n` under its advisory lock.
    ///
    /// The partition is re-read after the lock is taken, so deletes and
    /// moves that committed after the scan are respected. Returns the
    /// number of tasks whose position changed.
    pub async fn renumber_partition(&self, partition: &Partition) -> HabitResult<usize> {
        let mut tx = self.pool.begin().await?;
        lock_partition(&mut tx, partition).await?;
        let mut tasks = fetch_partition(&mut tx, partition).await?;
        let updates = renumber(&mut tasks);
        apply_updates(&mut tx, &updates).await?;
        tx.commit().await?;
        Ok(updates.len())
    }

    /// Tag links whose task is deleted or missing.
    pub async fn dangling_tag_links(&self) -> HabitResult<Vec<TagLink>> {
        let links = sqlx::query_as::<_, TagLink>(
            "SELECT tt.task_id, tt.tag_id
               FROM task_tags tt
               LEFT JOIN tasks t ON t.id = tt.task_id AND t.deleted_at IS NULL
              WHERE t.id IS NULL
              ORDER BY tt.task_id, tt.tag_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    pub async fn delete_tag_links(&self, links: &[TagLink]) -> HabitResult<u64> {
        if links.is_empty() {
            return Ok(0);
        }
        let task_ids: Vec<i64> = links.iter().map(|l| l.task_id).collect();
        let tag_ids: Vec<i64> = links.iter().map(|l| l.tag_id).collect();
        let result = sqlx::query(
            "DELETE FROM task_tags tt
              USING UNNEST($1::BIGINT[], $2::BIGINT[]) AS d(task_id, tag_id)
              WHERE tt.task_id = d.task_id AND tt.tag_id = d.tag_id
                AND NOT EXISTS (
                    SELECT 1 FROM tasks t WHERE t.id = tt.task_id AND t.deleted_at IS NULL
                )",
        )
        .bind(&task_ids)
        .bind(&tag_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
