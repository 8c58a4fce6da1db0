//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use habitsync::config::Config;
use habitsync::dashboard::AppState;
use habitsync::db::Database;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connect to the test database, apply the schema, and empty every table.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&test_db_url(), 5)
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to apply schema");
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation. Project ids restart at 4.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql("TRUNCATE TABLE task_tags, tags, comments, tasks, projects RESTART IDENTITY CASCADE")
        .execute(pool)
        .await
        .unwrap();
}

pub fn test_config() -> Config {
    Config {
        database_url: Some(test_db_url()),
        sync_queue_capacity: 16,
        ..Config::default()
    }
}

/// Application state over a clean test database.
pub async fn build_test_state() -> Arc<AppState> {
    let db = setup_test_db().await;
    AppState::with_db(db, test_config())
}

/// Build an Axum test app router connected to the test database.
pub async fn build_test_app() -> axum::Router {
    let state = build_test_state().await;
    habitsync::dashboard::build_router(state, None)
}
