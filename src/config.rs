//! Server configuration.
//!
//! Values come from an optional TOML file, then CLI flags and environment
//! variables (`DATABASE_URL`, `HABITSYNC_PORT`) override them. Every field has
//! a default, so an empty file is a valid configuration.
//!
//! ```toml
//! database_url = "postgres://habits@localhost/habits"
//! port = 8080
//! static_dir = "frontend/dist"
//! sync_queue_capacity = 256
//! project_window_days = 72
//! stats_cache = true
//! db_max_connections = 5
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::habits::project_stats::DEFAULT_WINDOW_DAYS;
use crate::sync::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    /// Outbound queue length per websocket connection.
    pub sync_queue_capacity: usize,
    pub project_window_days: u32,
    /// Memoize month/year statistics. Disabled means recompute on every read.
    pub stats_cache: bool,
    pub db_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            port: DEFAULT_PORT,
            static_dir: None,
            sync_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            project_window_days: DEFAULT_WINDOW_DAYS,
            stats_cache: true,
            db_max_connections: 5,
        }
    }
}

impl Config {
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse_toml(&content)
                    .with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_queue_capacity == 0 {
            anyhow::bail!("sync_queue_capacity must be at least 1");
        }
        if self.project_window_days == 0 {
            anyhow::bail!("project_window_days must be at least 1");
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("db_max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url, env, or config)"))
    }
}
