//! Pipeline service
//!
//! Handles one pipeline end to end:
//! - Building its waves from the target groups
//! - Resolving the parameters of every targeted (account, region) pair
//! - Recording the deployment bookkeeping entries
//! - Submitting the plan and waiting for the executor's verdict

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, info, warn};

use strata_core::deployment_map::PipelineDef;
use strata_core::domain::plan::PipelinePlan;
use strata_core::{EngineError, Result};

use super::cache::RunCache;
use super::intrinsic::IntrinsicResolver;
use super::organization::OrganizationNavigator;
use super::parameters::ParameterResolver;
use super::params_files::ParameterFiles;
use super::targets::TargetResolver;
use super::waves::WaveBuilder;
use crate::config::EngineConfig;
use crate::repository::{Backends, SubmissionStatus};

/// Configuration store prefix of the per-pipeline bookkeeping entries
pub const DEPLOYMENT_PREFIX: &str = "/deployment/";

/// Configuration store prefix of the notification endpoints
pub const NOTIFICATION_PREFIX: &str = "/notification_endpoint/";

/// Service trait for planning and deploying pipelines
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Resolves the waves and parameters of a pipeline
    async fn plan(&self, pipeline: &PipelineDef) -> Result<PipelinePlan>;

    /// Records and submits a plan, then waits for it to finish
    async fn deploy(&self, plan: &PipelinePlan) -> Result<()>;

    /// Removes pipelines that are no longer part of the map
    ///
    /// # Returns
    /// Names of the pipelines that were removed
    async fn prune_stale(&self, active: &[&str]) -> Result<Vec<String>>;
}

/// Standard implementation of PipelineService
pub struct StandardPipelineService {
    config: EngineConfig,
    backends: Backends,
    cache: Arc<RunCache>,
    waves: WaveBuilder,
    run_token: String,
}

impl StandardPipelineService {
    /// Creates a pipeline service
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `backends` - Capability implementations
    /// * `cache` - Cache shared by every pipeline of the run
    /// * `run_token` - Token shared by the uploads of the run
    pub fn new(
        config: EngineConfig,
        backends: Backends,
        cache: Arc<RunCache>,
        run_token: impl Into<String>,
    ) -> Self {
        let navigator = Arc::new(OrganizationNavigator::new(
            Arc::clone(&backends.organization),
            Arc::clone(&cache),
            config.max_ou_depth,
        ));
        let resolver = Arc::new(TargetResolver::new(
            navigator,
            Arc::clone(&backends.tags),
            config.allow_empty_target,
        ));
        let waves = WaveBuilder::new(
            resolver,
            config.deployment_account_id.clone(),
            config.deployment_region.clone(),
            config.default_wave_size,
        );

        Self {
            config,
            backends,
            cache,
            waves,
            run_token: run_token.into(),
        }
    }

    fn parameter_resolver(&self, upload_root: &std::path::Path) -> ParameterResolver {
        let intrinsics = IntrinsicResolver::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.backends.parameter_store),
            Arc::clone(&self.backends.stack_outputs),
            Arc::clone(&self.backends.credentials),
            Arc::clone(&self.backends.blobs),
            self.config.deployment_region.clone(),
        )
        .with_readonly_role(self.config.readonly_role_name.clone())
        .with_upload_root(upload_root)
        .with_run_token(self.run_token.clone());

        ParameterResolver::new(Arc::new(intrinsics))
    }

    fn encode<T: serde::Serialize>(pipeline: &str, value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| EngineError::DeploymentFailed {
            pipeline: pipeline.to_string(),
            reason: format!("cannot encode bookkeeping entry: {}", e),
        })
    }
}

#[async_trait]
impl PipelineService for StandardPipelineService {
    async fn plan(&self, pipeline: &PipelineDef) -> Result<PipelinePlan> {
        info!("Planning pipeline {}", pipeline.name);

        let waves = self.waves.build(pipeline).await?;

        let root = self.config.params_root.join(&pipeline.name);
        let files = ParameterFiles::new(&root, self.config.org_stage.clone());
        let resolver = self.parameter_resolver(&root);

        let mut parameters = Vec::new();
        for account in waves.target_accounts() {
            for region in &account.regions {
                let layers = files.layers_for(&account, region)?;
                parameters.push(resolver.resolve_for(&account, region, &layers).await?);
            }
        }

        let plan = PipelinePlan {
            name: pipeline.name.clone(),
            waves,
            parameters,
            notification_endpoint: pipeline.notification_endpoint(),
        };

        info!(
            "Planned pipeline {}: {} account(s), {} parameter document(s)",
            plan.name,
            plan.account_count(),
            plan.parameters.len()
        );
        Ok(plan)
    }

    async fn deploy(&self, plan: &PipelinePlan) -> Result<()> {
        let region = &self.config.deployment_region;
        let store = &self.backends.parameter_store;

        store
            .put(
                region,
                &format!("{}{}/regions", DEPLOYMENT_PREFIX, plan.name),
                &Self::encode(&plan.name, &plan.regions())?,
            )
            .await?;
        store
            .put(
                region,
                &format!("{}{}/account_ous", DEPLOYMENT_PREFIX, plan.name),
                &Self::encode(&plan.name, &plan.waves.account_ous())?,
            )
            .await?;
        if let Some(endpoint) = &plan.notification_endpoint {
            store
                .put(
                    region,
                    &format!("{}{}", NOTIFICATION_PREFIX, plan.name),
                    endpoint,
                )
                .await?;
        }

        let submission = self.backends.executor.submit(plan).await?;
        info!("Submitted pipeline {} as {}", plan.name, submission);

        loop {
            match self.backends.executor.status(&submission).await? {
                SubmissionStatus::InProgress => {
                    debug!("Pipeline {} still in progress", plan.name);
                    time::sleep(self.config.poll_interval).await;
                }
                SubmissionStatus::Succeeded => {
                    info!("Pipeline {} deployed", plan.name);
                    return Ok(());
                }
                SubmissionStatus::Failed(reason) => {
                    return Err(EngineError::DeploymentFailed {
                        pipeline: plan.name.clone(),
                        reason,
                    });
                }
            }
        }
    }

    async fn prune_stale(&self, active: &[&str]) -> Result<Vec<String>> {
        let region = &self.config.deployment_region;
        let store = &self.backends.parameter_store;

        let entries = store.list_by_path(region, DEPLOYMENT_PREFIX).await?;
        let mut stale = BTreeSet::new();

        for entry in entries {
            let Some(pipeline) = entry
                .strip_prefix(DEPLOYMENT_PREFIX)
                .and_then(|rest| rest.split('/').next())
                .filter(|name| !name.is_empty())
            else {
                continue;
            };
            if active.contains(&pipeline) {
                continue;
            }
            stale.insert(pipeline.to_string());
            store.delete(region, &entry).await?;
        }

        for pipeline in &stale {
            warn!("Removing pipeline {} which is no longer in the map", pipeline);
            self.backends.executor.delete(pipeline).await?;
            if let Err(e) = store
                .delete(region, &format!("{}{}", NOTIFICATION_PREFIX, pipeline))
                .await
            {
                if !e.is_not_found() {
                    return Err(e.into());
                }
            }
        }

        Ok(stale.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryBackend, OrganizationSnapshot};
    use serde_json::json;
    use std::time::Duration;
    use strata_core::deployment_map::DeploymentMap;

    const SNAPSHOT: &str = r#"
root_id: r-1
organizational_units:
  - { id: ou-prod, name: prod, parent: r-1 }
accounts:
  - { id: "111111111111", name: prod-1, parent: ou-prod }
  - { id: "222222222222", name: prod-2, parent: ou-prod }
parameters:
  eu-central-1:
    /org/name: acme
    /deployment/retired/regions: '["eu-west-1"]'
    /deployment/retired/account_ous: '{}'
    /deployment/sample/regions: '["eu-west-1"]'
"#;

    const MAP: &str = r#"
pipelines:
  - name: sample
    regions: eu-west-1
    params:
      notification_endpoint: team@example.com
    targets:
      - path: /prod
        wave:
          size: 2
"#;

    fn setup(params_root: &std::path::Path) -> (Arc<InMemoryBackend>, StandardPipelineService) {
        let backend = Arc::new(InMemoryBackend::new(
            OrganizationSnapshot::from_yaml_str(SNAPSHOT).unwrap(),
        ));
        let mut config = EngineConfig::new("999999999999".to_string(), "eu-central-1".to_string())
            .with_params_root(params_root);
        config.poll_interval = Duration::from_millis(1);

        let service = StandardPipelineService::new(
            config,
            Backends::in_memory(backend.clone()),
            Arc::new(RunCache::new()),
            "tok123",
        );
        (backend, service)
    }

    fn sample() -> PipelineDef {
        DeploymentMap::from_yaml_str(MAP, "test")
            .unwrap()
            .pipelines
            .remove(0)
    }

    #[tokio::test]
    async fn test_plan_resolves_every_account_and_region() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("sample").join("params");
        std::fs::create_dir_all(&params).unwrap();
        std::fs::write(
            params.join("global.json"),
            r#"{"Parameters": {"Org": "resolve:/org/name", "Env": "dev"}}"#,
        )
        .unwrap();
        std::fs::write(params.join("prod.yml"), "Parameters:\n  Env: prod\n").unwrap();

        let (_, service) = setup(dir.path());
        let plan = service.plan(&sample()).await.unwrap();

        assert_eq!(plan.regions(), ["eu-central-1", "eu-west-1"]);
        assert_eq!(plan.waves.stages[0].waves.len(), 2);
        assert_eq!(plan.account_count(), 2);
        assert_eq!(plan.parameters.len(), 2);
        assert_eq!(plan.notification_endpoint.as_deref(), Some("team@example.com"));

        let first = &plan.parameters[0];
        assert_eq!(first.file_stem(), "prod-1_eu-west-1");
        assert_eq!(first.document.parameters.get("Org"), Some(&json!("acme")));
        assert_eq!(first.document.parameters.get("Env"), Some(&json!("prod")));
    }

    #[tokio::test]
    async fn test_deploy_records_bookkeeping_and_submits() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, service) = setup(dir.path());
        let plan = service.plan(&sample()).await.unwrap();

        service.deploy(&plan).await.unwrap();

        assert_eq!(
            backend.parameter("eu-central-1", "/deployment/sample/regions").as_deref(),
            Some(r#"["eu-central-1","eu-west-1"]"#)
        );
        assert_eq!(
            backend.parameter("eu-central-1", "/deployment/sample/account_ous").as_deref(),
            Some(r#"{"prod-1":"/prod","prod-2":"/prod"}"#)
        );
        assert_eq!(
            backend.parameter("eu-central-1", "/notification_endpoint/sample").as_deref(),
            Some("team@example.com")
        );
        assert_eq!(backend.submitted_pipelines(), vec!["sample"]);
    }

    #[tokio::test]
    async fn test_deploy_reports_executor_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, service) = setup(dir.path());
        backend.fail_pipeline("sample");
        let plan = service.plan(&sample()).await.unwrap();

        let result = service.deploy(&plan).await;
        assert!(matches!(
            result,
            Err(EngineError::DeploymentFailed { pipeline, .. }) if pipeline == "sample"
        ));
    }

    #[tokio::test]
    async fn test_prune_stale_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, service) = setup(dir.path());

        let removed = service.prune_stale(&["sample"]).await.unwrap();

        assert_eq!(removed, vec!["retired"]);
        assert_eq!(backend.deleted_pipelines(), vec!["retired"]);
        assert!(backend.parameter("eu-central-1", "/deployment/retired/regions").is_none());
        assert!(backend.parameter("eu-central-1", "/deployment/sample/regions").is_some());
    }
}
