//! Outpost daemon - relays committed outbox events to the message bus.

mod app;
mod janitor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use outpost_config::{init_logging, Config, Paths};
use uuid::Uuid;

/// Outpost daemon command-line interface.
#[derive(Parser)]
#[command(name = "outpostd")]
#[command(about = "Outbox projector daemon: publishes committed events to the message bus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, logs). Defaults to ~/.outpost
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Database file path. Overrides the config file.
    #[arg(long, env = "OUTPOST_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Message bus endpoint. Overrides the config file.
    #[arg(long, global = true)]
    bus_url: Option<String>,

    /// Bearer token for bus publishes. Overrides the config file.
    #[arg(long, global = true)]
    bus_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the projector and janitor loops (default)
    Run,
    /// Reset an err/dead outbox row to new so the projector re-publishes it
    Replay {
        /// Outbox row id
        id: Uuid,
    },
    /// Show per-status backlog counts for a tenant
    Stats {
        /// Tenant to inspect. Defaults to the configured default tenant.
        #[arg(long)]
        tenant: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;

    // CLI flags win over both the config file and the environment
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }
    if let Some(bus_url) = cli.bus_url {
        config.bus_url = bus_url;
    }
    if let Some(bus_token) = cli.bus_token {
        config.bus_token = Some(bus_token);
    }

    init_logging(&config.log_level);

    match cli.command {
        Some(Commands::Run) | None => app::run_daemon(config, paths).await,
        Some(Commands::Replay { id }) => app::replay_row(config, paths, id).await,
        Some(Commands::Stats { tenant }) => app::print_stats(config, paths, tenant).await,
    }
}
