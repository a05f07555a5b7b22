//! Wave builder
//!
//! Turns a pipeline's target groups into ordered stages. Each group becomes
//! one stage (approval markers become stages of their own) and the accounts
//! of a deploy stage are split into sequential waves sized by the number of
//! pipeline actions they generate.

use std::sync::Arc;
use tracing::{debug, info};

use strata_core::deployment_map::PipelineDef;
use strata_core::domain::account::{AccountDescriptor, sanitize_name};
use strata_core::domain::target::{TargetExpr, TargetGroup};
use strata_core::domain::wave::{DeploymentWaves, Stage, StageKind};
use strata_core::{EngineError, Result};

use super::targets::{TargetResolver, TargetScope};

/// Service building the wave plan of a pipeline
pub struct WaveBuilder {
    resolver: Arc<TargetResolver>,
    deployment_account_id: String,
    deployment_region: String,
    default_wave_size: usize,
}

impl WaveBuilder {
    pub fn new(
        resolver: Arc<TargetResolver>,
        deployment_account_id: impl Into<String>,
        deployment_region: impl Into<String>,
        default_wave_size: usize,
    ) -> Self {
        Self {
            resolver,
            deployment_account_id: deployment_account_id.into(),
            deployment_region: deployment_region.into(),
            default_wave_size,
        }
    }

    /// Builds the stages of a pipeline in declaration order
    ///
    /// The pipeline's regions are its top-level `regions`, or the union of
    /// every group's regions in first-seen order. The deployment region is
    /// put first when it is missing, both for the pipeline and for the
    /// deployment account's own descriptors.
    pub async fn build(&self, pipeline: &PipelineDef) -> Result<DeploymentWaves> {
        let groups = pipeline.target_groups()?;
        let mut stages: Vec<Stage> = Vec::new();
        let mut seen_regions: Vec<String> = Vec::new();

        for group in &groups {
            let regions = self.group_regions(pipeline, group);
            for region in &regions {
                if !seen_regions.contains(region) {
                    seen_regions.push(region.clone());
                }
            }

            if group.is_approval() {
                let name = stage_name(&stages, group, "approval");
                stages.push(Stage::approval(name));
                continue;
            }

            let scope = TargetScope::new(regions.clone()).with_exclude(group.exclude.clone());
            let mut pending: Vec<AccountDescriptor> = Vec::new();

            for expr in &group.expressions {
                if matches!(expr, TargetExpr::Approval) {
                    self.flush(&mut stages, group, &regions, &mut pending)?;
                    let name = format!("approval-{}", stages.len() + 1);
                    stages.push(Stage::approval(name));
                    continue;
                }
                let mut accounts = self.resolver.resolve(expr, &scope).await?;
                for account in &mut accounts {
                    self.place_deployment_region(account);
                }
                pending.extend(accounts);
            }

            self.flush(&mut stages, group, &regions, &mut pending)?;
        }

        let mut regions = pipeline
            .regions
            .clone()
            .filter(|regions| !regions.is_empty())
            .unwrap_or(seen_regions);
        if !regions.contains(&self.deployment_region) {
            regions.insert(0, self.deployment_region.clone());
        }

        let waves = DeploymentWaves { regions, stages };
        info!(
            "Pipeline {} has {} stage(s) and {} wave(s)",
            pipeline.name,
            waves.stages.len(),
            waves.sequences().len()
        );
        Ok(waves)
    }

    fn group_regions(&self, pipeline: &PipelineDef, group: &TargetGroup) -> Vec<String> {
        group
            .regions
            .clone()
            .or_else(|| pipeline.regions.clone())
            .filter(|regions| !regions.is_empty())
            .unwrap_or_else(|| vec![self.deployment_region.clone()])
    }

    fn place_deployment_region(&self, account: &mut AccountDescriptor) {
        if account.id == self.deployment_account_id
            && !account.regions.contains(&self.deployment_region)
        {
            account.regions.insert(0, self.deployment_region.clone());
        }
    }

    /// Appends the pending accounts as a deploy stage split into waves
    fn flush(
        &self,
        stages: &mut Vec<Stage>,
        group: &TargetGroup,
        regions: &[String],
        pending: &mut Vec<AccountDescriptor>,
    ) -> Result<()> {
        if pending.is_empty() {
            debug!("Target group {} produced no accounts", group.label());
            return Ok(());
        }

        let accounts = std::mem::take(pending);
        let wave_size = group.wave_size.unwrap_or(self.default_wave_size);
        let waves = split_waves(&group.label(), accounts, wave_size, |account| {
            group.actions_per_account(account.regions.len().max(regions.len()))
        })?;

        stages.push(Stage {
            name: stage_name(stages, group, "stage"),
            kind: StageKind::Deploy,
            provider: group.provider.clone(),
            properties: group.properties.clone(),
            waves,
        });
        Ok(())
    }
}

/// Names the next stage after the group, or after its position in the
/// pipeline. Stage names are unique within a pipeline.
fn stage_name(stages: &[Stage], group: &TargetGroup, prefix: &str) -> String {
    let position = stages.len() + 1;
    let name = group
        .name
        .as_deref()
        .map(sanitize_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}-{}", prefix, position));

    if stages.iter().any(|stage| stage.name == name) {
        format!("{}-{}", name, position)
    } else {
        name
    }
}

/// Splits accounts into consecutive waves whose total action count stays
/// within `wave_size`
fn split_waves<F>(
    target: &str,
    accounts: Vec<AccountDescriptor>,
    wave_size: usize,
    actions: F,
) -> Result<Vec<Vec<AccountDescriptor>>>
where
    F: Fn(&AccountDescriptor) -> usize,
{
    let mut waves = Vec::new();
    let mut current = Vec::new();
    let mut used = 0;

    for account in accounts {
        let required = actions(&account);
        if required > wave_size {
            return Err(EngineError::InsufficientWaveSize {
                target: target.to_string(),
                wave_size,
                required,
            });
        }
        if used + required > wave_size {
            waves.push(std::mem::take(&mut current));
            used = 0;
        }
        used += required;
        current.push(account);
    }

    if !current.is_empty() {
        waves.push(current);
    }
    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryBackend, OrganizationSnapshot};
    use crate::service::cache::RunCache;
    use crate::service::organization::OrganizationNavigator;
    use strata_core::deployment_map::DeploymentMap;

    const SNAPSHOT: &str = r#"
root_id: r-1
organizational_units:
  - { id: ou-dev, name: dev, parent: r-1 }
  - { id: ou-prod, name: prod, parent: r-1 }
accounts:
  - { id: "100000000001", name: dev-1, parent: ou-dev }
  - { id: "100000000002", name: dev-2, parent: ou-dev }
  - { id: "100000000003", name: dev-3, parent: ou-dev }
  - { id: "200000000001", name: prod-1, parent: ou-prod }
  - { id: "200000000002", name: prod-2, parent: ou-prod }
  - { id: "200000000003", name: prod-3, parent: ou-prod }
  - { id: "999999999999", name: deployment, parent: r-1 }
"#;

    fn builder() -> WaveBuilder {
        let backend = Arc::new(InMemoryBackend::new(
            OrganizationSnapshot::from_yaml_str(SNAPSHOT).unwrap(),
        ));
        let navigator = Arc::new(OrganizationNavigator::new(
            backend.clone(),
            Arc::new(RunCache::new()),
            32,
        ));
        let resolver = Arc::new(TargetResolver::new(navigator, backend, false));
        WaveBuilder::new(resolver, "999999999999", "eu-central-1", 50)
    }

    fn pipeline(yaml: &str) -> PipelineDef {
        DeploymentMap::from_yaml_str(yaml, "test")
            .unwrap()
            .pipelines
            .remove(0)
    }

    fn stage_ids(stage: &Stage) -> Vec<Vec<&str>> {
        stage
            .waves
            .iter()
            .map(|wave| wave.iter().map(|a| a.id.as_str()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_two_groups_keep_declared_order() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    regions: eu-west-1
    targets:
      - /dev
      - /prod
"#,
        );
        let waves = builder().build(&def).await.unwrap();

        assert_eq!(waves.stages.len(), 2);
        assert_eq!(
            stage_ids(&waves.stages[0]),
            vec![vec!["100000000001", "100000000002", "100000000003"]]
        );
        assert_eq!(
            stage_ids(&waves.stages[1]),
            vec![vec!["200000000001", "200000000002", "200000000003"]]
        );
        assert_eq!(waves.stages[0].name, "stage-1");
        assert_eq!(waves.regions, vec!["eu-central-1", "eu-west-1"]);
    }

    #[tokio::test]
    async fn test_approval_is_its_own_stage() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    targets:
      - path: /dev
        name: Dev Accounts
      - approval
      - path: /prod
        regions: [eu-west-1, us-east-1]
"#,
        );
        let waves = builder().build(&def).await.unwrap();

        let kinds: Vec<StageKind> = waves.stages.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StageKind::Deploy, StageKind::Approval, StageKind::Deploy]
        );
        assert_eq!(waves.stages[0].name, "DevAccounts");
        assert_eq!(waves.stages[1].name, "approval-2");
        assert_eq!(
            waves.regions,
            vec!["eu-central-1", "eu-west-1", "us-east-1"]
        );
    }

    #[tokio::test]
    async fn test_approval_inside_group_splits_stage_names() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    regions: eu-west-1
    targets:
      - [/dev, approval, /prod]
"#,
        );
        let waves = builder().build(&def).await.unwrap();

        let names: Vec<&str> = waves.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["stage-1", "approval-2", "stage-3"]);
        assert_eq!(
            stage_ids(&waves.stages[2]),
            vec![vec!["200000000001", "200000000002", "200000000003"]]
        );
    }

    #[tokio::test]
    async fn test_named_group_split_keeps_unique_names() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    regions: eu-west-1
    targets:
      - path: [/dev, approval, /prod]
        name: rollout
"#,
        );
        let waves = builder().build(&def).await.unwrap();

        let names: Vec<&str> = waves.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["rollout", "approval-2", "rollout-3"]);
    }

    #[tokio::test]
    async fn test_wave_size_splits_accounts() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    regions: eu-west-1
    targets:
      - path: /prod
        wave:
          size: 4
"#,
        );
        let waves = builder().build(&def).await.unwrap();
        assert_eq!(
            stage_ids(&waves.stages[0]),
            vec![
                vec!["200000000001", "200000000002"],
                vec!["200000000003"]
            ]
        );
    }

    #[tokio::test]
    async fn test_insufficient_wave_size() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    targets:
      - path: /prod
        regions: [eu-west-1, us-east-1]
        wave:
          size: 3
"#,
        );
        let result = builder().build(&def).await;
        assert!(matches!(
            result,
            Err(EngineError::InsufficientWaveSize {
                wave_size: 3,
                required: 4,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_deployment_account_gets_home_region_first() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    regions: eu-west-1
    targets:
      - "999999999999"
"#,
        );
        let waves = builder().build(&def).await.unwrap();
        let account = &waves.stages[0].waves[0][0];
        assert_eq!(account.regions, vec!["eu-central-1", "eu-west-1"]);
    }

    #[tokio::test]
    async fn test_region_only_target_adds_no_stage() {
        let def = pipeline(
            r#"
pipelines:
  - name: sample
    targets:
      - path: null
        regions: ap-southeast-2
"#,
        );
        let waves = builder().build(&def).await.unwrap();
        assert!(waves.stages.is_empty());
        assert_eq!(waves.regions, vec!["eu-central-1", "ap-southeast-2"]);
    }

    #[test]
    fn test_split_waves_unit_actions() {
        let accounts: Vec<AccountDescriptor> = (0..5)
            .map(|i| {
                AccountDescriptor::new(
                    format!("{:012}", i),
                    "a",
                    TargetExpr::RegionOnly,
                    Vec::new(),
                    Default::default(),
                )
            })
            .collect();
        let waves = split_waves("t", accounts, 2, |_| 1).unwrap();
        let sizes: Vec<usize> = waves.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }
}
