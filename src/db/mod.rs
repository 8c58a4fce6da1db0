//! # Database: PostgreSQL Storage Layer
//!
//! Async task, project, comment, and tag storage via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `tasks`: name, date, scope, status, position, minutes, soft-delete stamp
//! - `comments`: at most one per task
//! - `projects`: user-defined scopes (ids start at 4), visibility tri-state
//! - `tags` / `task_tags`: explicit tag-to-task association
//!
//! ## Module Structure
//!
//! - [`tasks`]: task CRUD, partition reads, position writes, reorder
//! - [`projects`]: project CRUD and rolling-window activity
//! - [`repair`]: partition scans and dangling tag-link cleanup
//!
//! ## Transactions
//!
//! Every operation that writes more than one position runs in one
//! transaction and first takes a transaction-scoped advisory lock on the
//! partition (see [`partition_lock_key`]), so two concurrent inserts into the
//! same day cannot both claim the same position.

mod projects;
mod repair;
mod tasks;

pub use repair::PositionRow;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::PgConnection;

use crate::errors::HabitResult;
use crate::habits::calendar::Partition;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Columns selected for every task read, joined with its comment.
pub(crate) const TASK_SELECT: &str = "SELECT t.id, t.name, t.date, t.scope, t.status, t.position,
        t.minutes, t.created_at, t.updated_at, t.deleted_at,
        c.id AS comment_id, c.body AS comment_body
   FROM tasks t
   LEFT JOIN comments c ON c.task_id = t.id";

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// The URL is parsed by hand so that percent-encoded usernames and
    /// passwords (common with hosted poolers) survive intact.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Wrap an existing pool (tests, embedding).
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create missing tables and indexes.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    ///
    /// Used by the `/readyz` readiness check.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// Advisory-lock key for a partition: scope code in the high half, the
/// window start (days since CE) in the low half. Projects use 0 for the low half.
pub fn partition_lock_key(partition: &Partition) -> i64 {
    use chrono::Datelike;
    let scope = i64::from(partition.scope().code());
    let low = match partition {
        Partition::Window { window, .. } => i64::from(window.from.num_days_from_ce()),
        Partition::Project(_) => 0,
    };
    (scope << 32) | (low & 0xFFFF_FFFF)
}

/// Serialize writers of one partition until the surrounding transaction ends.
pub(crate) async fn lock_partition(conn: &mut PgConnection, partition: &Partition) -> HabitResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(partition_lock_key(partition))
        .execute(conn)
        .await?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────
