//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim: configuration
//! loading and the maintenance subcommands.

use anyhow::Result;
use habitsync::config::Config;
use habitsync::db::Database;
use habitsync::habits::repair_ordering;
use tracing::info;

use super::Cli;

/// Read `--config` (if any) and apply the global overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.database_url = Some(url.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn connect(config: &Config) -> Result<Database> {
    let db = Database::connect(config.database_url()?, config.db_max_connections).await?;
    Ok(db)
}

/// `check` (`apply = false`) and `repair` (`apply = true`).
pub async fn run_repair(config: &Config, apply: bool) -> Result<()> {
    let db = connect(config).await?;
    let report = repair_ordering(&db, apply).await?;
    if report.is_clean() {
        println!("ordering is consistent, no dangling tag links");
    } else {
        println!("{}", report);
        if !apply {
            println!("run `habitsync repair` to apply corrections");
        }
    }
    Ok(())
}

pub async fn run_migrate(config: &Config) -> Result<()> {
    let db = connect(config).await?;
    db.migrate().await?;
    info!("schema is up to date");
    Ok(())
}
