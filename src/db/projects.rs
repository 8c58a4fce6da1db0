//! Project operations.
//!
//! Projects are user-defined scopes. Their ids start at 4 so that a project
//! id doubles as the task `scope` code of its tasks. Deletion is soft and
//! cascades to the project's tasks in the same transaction.

use super::Database;
use crate::errors::{HabitError, HabitResult};
use crate::habits::calendar::DateWindow;
use crate::habits::project_stats::ProjectActivity;
use crate::habits::types::{Project, ProjectRow, ProjectVisibility};

const PROJECT_COLUMNS: &str = "id, name, visibility, created_at, updated_at";

/// Map a unique-index violation on the live-name index to a caller error.
fn map_name_conflict(err: sqlx::Error, name: &str) -> HabitError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return HabitError::malformed(format!("project {:?} already exists", name));
        }
    }
    HabitError::Storage(err)
}

fn validate_name(name: &str) -> HabitResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HabitError::malformed("project name must not be empty"));
    }
    Ok(name)
}

impl Database {
    pub async fn create_project(&self, name: &str) -> HabitResult<Project> {
        let name = validate_name(name)?;
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "INSERT INTO projects (name) VALUES ($1) RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_name_conflict(e, name))?;
        Project::try_from(row)
    }

    pub async fn get_project(&self, id: i32) -> HabitResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE id = $1 AND deleted_at IS NULL",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Project::try_from).transpose()
    }

    /// All live projects, most recently touched first.
    pub async fn list_projects(&self) -> HabitResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE deleted_at IS NULL
              ORDER BY updated_at DESC, id",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Project::try_from).collect()
    }

    pub async fn rename_project(&self, id: i32, name: &str) -> HabitResult<Project> {
        let name = validate_name(name)?;
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects SET name = $1, updated_at = now()
              WHERE id = $2 AND deleted_at IS NULL
              RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_name_conflict(e, name))?
        .ok_or_else(|| HabitError::not_found(format!("project {}", id)))?;
        Project::try_from(row)
    }

    pub async fn set_project_visibility(
        &self,
        id: i32,
        visibility: ProjectVisibility,
    ) -> HabitResult<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects SET visibility = $1, updated_at = now()
              WHERE id = $2 AND deleted_at IS NULL
              RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(visibility.code())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| HabitError::not_found(format!("project {}", id)))?;
        Project::try_from(row)
    }

    /// Bump `updated_at` so the project sorts first in its list.
    pub async fn touch_project(&self, id: i32) -> HabitResult<()> {
        sqlx::query("UPDATE projects SET updated_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-delete a project together with all of its live tasks.
    ///
    /// Returns the number of tasks removed.
    pub async fn delete_project(&self, id: i32) -> HabitResult<u64> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(
            "UPDATE projects SET deleted_at = now(), updated_at = now()
              WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() == 0 {
            return Err(HabitError::not_found(format!("project {}", id)));
        }

        sqlx::query(
            "DELETE FROM comments c USING tasks t
              WHERE c.task_id = t.id AND t.scope = $1 AND t.deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let tasks = sqlx::query(
            "UPDATE tasks SET deleted_at = now(), updated_at = now()
              WHERE scope = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(tasks.rows_affected())
    }

    /// Completed count and summed minutes of a project's tasks dated in `window`.
    pub async fn project_activity(&self, id: i32, window: &DateWindow) -> HabitResult<ProjectActivity> {
        let activity = sqlx::query_as::<_, ProjectActivity>(
            "SELECT COUNT(*) FILTER (WHERE status = 1) AS completed,
                    COALESCE(SUM(minutes), 0)::BIGINT AS minutes
               FROM tasks
              WHERE scope = $1 AND deleted_at IS NULL
                AND date >= $2 AND date < $3",
        )
        .bind(id)
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await?;
        Ok(activity)
    }
}
