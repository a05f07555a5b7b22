//! Strata CLI
//!
//! Command-line interface for validating deployment maps and resolving them
//! into pipeline plans against an organization snapshot.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Deployment target and parameter resolution", long_about = None)]
struct Cli {
    /// Directory holding deployment_map.yml and deployment_maps/
    #[arg(long, env = "STRATA_MAP_ROOT", default_value = ".")]
    map_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_cli=info,strata_engine=info,strata_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config {
        map_root: cli.map_root,
    };

    handle_command(cli.command, &config).await
}
