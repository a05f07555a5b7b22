//! Validate command handler

use anyhow::{Context, Result};
use colored::*;

use crate::config::Config;

/// Loads and validates the deployment map, then lists its pipelines
pub fn handle_validate(config: &Config) -> Result<()> {
    let map = config.load_map()?;
    map.validate().context("Deployment map is invalid")?;

    println!(
        "{}",
        format!("✓ Deployment map is valid ({} pipeline(s))", map.pipelines.len())
            .green()
            .bold()
    );

    for pipeline in &map.pipelines {
        let groups = pipeline
            .target_groups()
            .with_context(|| format!("Invalid targets in pipeline {}", pipeline.name))?;
        let regions = pipeline
            .regions
            .as_ref()
            .map(|r| r.join(", "))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {} {} {}",
            pipeline.name.bold(),
            format!("{} target group(s)", groups.len()).cyan(),
            format!("regions: {}", regions).dimmed()
        );
    }

    Ok(())
}
