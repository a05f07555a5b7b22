//! Deployment run
//!
//! A run resolves every pipeline of a deployment map in parallel, sharing
//! one cache and one upload token. In deploy mode it also removes pipelines
//! that left the map and submits every plan.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use strata_core::deployment_map::DeploymentMap;
use strata_core::domain::plan::PipelinePlan;
use strata_core::{EngineError, Result};

use crate::config::EngineConfig;
use crate::repository::Backends;
use crate::scheduler::Dispatcher;
use crate::service::intrinsic::run_token;
use crate::service::{PipelineService, RunCache, StandardPipelineService};

/// What a run does with the resolved plans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Resolve only
    Plan,
    /// Resolve, record, submit and wait
    Deploy,
}

/// Result of one pipeline
#[derive(Debug)]
pub struct PipelineOutcome {
    pub pipeline: String,
    pub result: Result<PipelinePlan>,
}

/// Summary of a run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Stale pipelines removed before dispatching
    pub pruned: Vec<String>,
    /// One entry per pipeline, in map order
    pub outcomes: Vec<PipelineOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Plans of the pipelines that succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &PipelinePlan> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Pipelines that failed, with their error
    pub fn failed(&self) -> impl Iterator<Item = (&str, &EngineError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.pipeline.as_str(), e)))
    }

    /// All plans, or the failure of the first pipeline in map order
    pub fn into_result(self) -> Result<Vec<PipelinePlan>> {
        self.outcomes.into_iter().map(|o| o.result).collect()
    }
}

/// One resolution run over a deployment map
pub struct DeploymentRun {
    id: Uuid,
    service: Arc<dyn PipelineService>,
    dispatcher: Dispatcher,
}

impl DeploymentRun {
    /// Creates a run with a fresh cache and upload token
    pub fn new(config: EngineConfig, backends: Backends) -> Self {
        let dispatcher = Dispatcher::from_config(&config);
        let service = StandardPipelineService::new(
            config,
            backends,
            Arc::new(RunCache::new()),
            run_token(),
        );
        Self::with_service(Arc::new(service), dispatcher)
    }

    /// Creates a run driven by a custom pipeline service
    pub fn with_service(service: Arc<dyn PipelineService>, dispatcher: Dispatcher) -> Self {
        Self {
            id: Uuid::new_v4(),
            service,
            dispatcher,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Validates the map and processes every pipeline
    ///
    /// Pipeline failures do not stop the other pipelines; they are reported
    /// per pipeline once all of them are done. Map validation and pruning
    /// failures abort the run before anything is dispatched.
    pub async fn execute(&self, map: &DeploymentMap, mode: RunMode) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            "Starting run {} ({:?}) with {} pipeline(s)",
            self.id,
            mode,
            map.pipelines.len()
        );

        map.validate()?;

        let pruned = match mode {
            RunMode::Deploy => self.service.prune_stale(&map.names()).await?,
            RunMode::Plan => Vec::new(),
        };

        let units = map
            .pipelines
            .iter()
            .cloned()
            .map(|pipeline| {
                let service = Arc::clone(&self.service);
                let name = pipeline.name.clone();
                let unit = async move {
                    let plan = service.plan(&pipeline).await?;
                    if mode == RunMode::Deploy {
                        service.deploy(&plan).await?;
                    }
                    Ok::<_, EngineError>(plan)
                };
                (name, unit)
            })
            .collect();

        let report = self.dispatcher.dispatch(units).await;
        let outcomes: Vec<PipelineOutcome> = report
            .outcomes
            .into_iter()
            .map(|(pipeline, result)| PipelineOutcome { pipeline, result })
            .collect();

        let report = RunReport {
            run_id: self.id,
            started_at,
            finished_at: Utc::now(),
            pruned,
            outcomes,
        };

        let failed = report.failed().count();
        if failed > 0 {
            warn!("Run {} finished with {} failed pipeline(s)", self.id, failed);
        } else {
            info!("Run {} finished successfully", self.id);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryBackend, OrganizationSnapshot};
    use std::time::Duration;

    const SNAPSHOT: &str = r#"
root_id: r-1
organizational_units:
  - { id: ou-prod, name: prod, parent: r-1 }
  - { id: ou-empty, name: empty, parent: r-1 }
accounts:
  - { id: "111111111111", name: prod-1, parent: ou-prod }
parameters:
  eu-central-1:
    /deployment/retired/regions: '["eu-west-1"]'
"#;

    const MAP: &str = r#"
pipelines:
  - name: first
    targets:
      - /prod
  - name: broken
    targets:
      - /empty
  - name: second
    targets:
      - "111111111111"
"#;

    fn run(backend: Arc<InMemoryBackend>) -> DeploymentRun {
        let dir = std::env::temp_dir();
        let mut config = EngineConfig::new("999999999999".to_string(), "eu-central-1".to_string())
            .with_params_root(dir.join("strata-run-tests-missing"))
            .with_batch_delay(Duration::ZERO);
        config.poll_interval = Duration::from_millis(1);
        DeploymentRun::new(config, Backends::in_memory(backend))
    }

    fn backend() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::new(
            OrganizationSnapshot::from_yaml_str(SNAPSHOT).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_plan_run_reports_each_pipeline() {
        let map = DeploymentMap::from_yaml_str(MAP, "test").unwrap();
        let backend = backend();
        let report = run(backend.clone()).execute(&map, RunMode::Plan).await.unwrap();

        let succeeded: Vec<&str> = report.succeeded().map(|p| p.name.as_str()).collect();
        assert_eq!(succeeded, vec!["first", "second"]);

        let failed: Vec<&str> = report.failed().map(|(name, _)| name).collect();
        assert_eq!(failed, vec!["broken"]);
        assert!(report.started_at <= report.finished_at);
        assert!(report.pruned.is_empty());
        assert!(backend.submitted_pipelines().is_empty());

        assert!(matches!(
            report.into_result(),
            Err(EngineError::NoAccountsFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deploy_run_prunes_and_submits() {
        let map = DeploymentMap::from_yaml_str(MAP, "test").unwrap();
        let backend = backend();
        let report = run(backend.clone()).execute(&map, RunMode::Deploy).await.unwrap();

        assert_eq!(report.pruned, vec!["retired"]);
        assert_eq!(backend.deleted_pipelines(), vec!["retired"]);

        let mut submitted = backend.submitted_pipelines();
        submitted.sort();
        assert_eq!(submitted, vec!["first", "second"]);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_invalid_map_aborts_run() {
        let map = DeploymentMap::from_yaml_str(
            "pipelines:\n  - name: bad\n    targets:\n      - regions: eu-west-1\n",
            "test",
        )
        .unwrap();
        let result = run(backend()).execute(&map, RunMode::Plan).await;
        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }
}
