//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod classify;
mod ou_path;
mod plan;
mod validate;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the deployment map
    Validate,
    /// Show how target expressions are classified
    Classify {
        /// Target expressions, e.g. 123456789012, ou-ab12-cdefghij, /banking/prod
        #[arg(required = true)]
        expressions: Vec<String>,
    },
    /// Print the organization path of an OU or account
    OuPath {
        /// Organization snapshot (YAML or JSON)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// OU or account id
        id: String,
    },
    /// Resolve every pipeline of the map
    Plan {
        /// Organization snapshot (YAML or JSON)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Directory receiving plan.json and parameter files per pipeline
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Record, submit and wait for every plan
        #[arg(long)]
        deploy: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Validate => validate::handle_validate(config),
        Commands::Classify { expressions } => classify::handle_classify(&expressions),
        Commands::OuPath { snapshot, id } => ou_path::handle_ou_path(config, &snapshot, &id).await,
        Commands::Plan {
            snapshot,
            out,
            deploy,
        } => plan::handle_plan(config, &snapshot, out.as_deref(), deploy).await,
    }
}
