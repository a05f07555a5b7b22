//! Plan command handler

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use std::sync::Arc;
use strata_core::domain::plan::PipelinePlan;
use strata_core::domain::wave::StageKind;
use strata_engine::repository::{Backends, InMemoryBackend};
use strata_engine::service::ParameterFiles;
use strata_engine::{DeploymentRun, RunMode};

use crate::config::Config;

/// Resolves every pipeline against a snapshot
///
/// # Arguments
/// * `config` - The CLI configuration
/// * `snapshot` - Organization snapshot file
/// * `out` - Directory receiving one folder per pipeline
/// * `deploy` - Also record and submit the plans
pub async fn handle_plan(
    config: &Config,
    snapshot: &Path,
    out: Option<&Path>,
    deploy: bool,
) -> Result<()> {
    let map = config.load_map()?;
    let engine = config.engine_config()?;
    let backend = Arc::new(InMemoryBackend::from_file(snapshot)?);

    let mode = if deploy { RunMode::Deploy } else { RunMode::Plan };
    let run = DeploymentRun::new(engine, Backends::in_memory(backend));
    let report = run.execute(&map, mode).await?;

    println!(
        "{}",
        format!("Run {} ({} pipeline(s))", report.run_id, report.outcomes.len()).bold()
    );
    for pipeline in &report.pruned {
        println!("  {} {} removed", "-".yellow(), pipeline.bold());
    }

    for plan in report.succeeded() {
        print_plan_summary(plan);
        if let Some(out) = out {
            write_plan(out, plan)?;
        }
    }

    let failed: Vec<_> = report.failed().collect();
    for (pipeline, error) in &failed {
        println!("  {} {} {}", "✗".red(), pipeline.bold(), error.to_string().red());
    }

    if !failed.is_empty() {
        anyhow::bail!("{} pipeline(s) failed", failed.len());
    }

    println!("{}", "✓ All pipelines resolved successfully!".green().bold());
    Ok(())
}

fn print_plan_summary(plan: &PipelinePlan) {
    println!(
        "  {} {} {}",
        "✓".green(),
        plan.name.bold(),
        format!("regions: {}", plan.regions().join(", ")).dimmed()
    );
    for stage in &plan.waves.stages {
        match stage.kind {
            StageKind::Approval => println!("    {} {}", stage.name.cyan(), "approval".yellow()),
            StageKind::Deploy => {
                let waves: Vec<String> = stage.waves.iter().map(|w| w.len().to_string()).collect();
                println!(
                    "    {} {} {}",
                    stage.name.cyan(),
                    stage.provider.dimmed(),
                    format!("accounts per wave: {}", waves.join(" / ")).dimmed()
                );
            }
        }
    }
}

fn write_plan(out: &Path, plan: &PipelinePlan) -> Result<()> {
    let dir = out.join(&plan.name);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let content = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
    let plan_path = dir.join("plan.json");
    std::fs::write(&plan_path, content)
        .with_context(|| format!("Failed to write {}", plan_path.display()))?;

    for resolved in &plan.parameters {
        ParameterFiles::write(&dir, resolved)
            .with_context(|| format!("Failed to write parameters of {}", resolved.file_stem()))?;
    }

    println!(
        "    {} {}",
        "written to".dimmed(),
        dir.display().to_string().dimmed()
    );
    Ok(())
}
