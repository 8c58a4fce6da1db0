//! # Main: CLI Entry Point
//!
//! Routes subcommands to the server and maintenance functions in [`cli`].
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API and websocket sync server.
//! - `check`: report ordering drift and dangling tag links without writing.
//! - `repair`: the same scan, applying corrections.
//! - `migrate`: create missing tables and indexes.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--config`: optional TOML file; flags and env override its values.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "habitsync",
    about = "Habit tracker core: scope roll-ups, task ordering, live sync"
)]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and websocket sync server
    Serve {
        /// Port to listen on
        #[arg(long, env = "HABITSYNC_PORT")]
        port: Option<u16>,
        /// Directory with a built frontend to serve at /
        #[arg(long)]
        static_dir: Option<PathBuf>,
        /// Disable the month/year statistics cache
        #[arg(long)]
        no_stats_cache: bool,
    },
    /// Report ordering drift and dangling tag links without changing anything
    Check,
    /// Renumber out-of-order scopes and remove dangling tag links
    Repair,
    /// Create missing tables and indexes
    Migrate,
}

fn init_tracing() {
    // LOG_FORMAT=json for log shipping, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;

    let rt = tokio::runtime::Runtime::new()?;
    match &cli.command {
        Commands::Serve {
            port,
            static_dir,
            no_stats_cache,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = *port;
            }
            if let Some(dir) = static_dir {
                config.static_dir = Some(dir.clone());
            }
            if *no_stats_cache {
                config.stats_cache = false;
            }
            rt.block_on(habitsync::dashboard::run(config))
        }
        Commands::Check => rt.block_on(cli::run_repair(&config, false)),
        Commands::Repair => rt.block_on(cli::run_repair(&config, true)),
        Commands::Migrate => rt.block_on(cli::run_migrate(&config)),
    }
}
