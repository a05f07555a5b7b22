//! OU path command handler

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use std::sync::Arc;
use strata_engine::repository::InMemoryBackend;
use strata_engine::service::{OrganizationNavigator, RunCache};

use crate::config::Config;

/// Prints the path of the OUs above an OU or account
pub async fn handle_ou_path(config: &Config, snapshot: &Path, id: &str) -> Result<()> {
    let engine = config.engine_config()?;
    let backend = Arc::new(InMemoryBackend::from_file(snapshot)?);
    let navigator = OrganizationNavigator::new(backend, Arc::new(RunCache::new()), engine.max_ou_depth);

    let path = navigator
        .path_of(id)
        .await
        .with_context(|| format!("Failed to resolve the path of {}", id))?;

    println!("{} {}", id.cyan(), path.bold());
    Ok(())
}
