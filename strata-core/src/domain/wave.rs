//! Wave domain types
//!
//! A pipeline's targets become an ordered list of stages. Each stage holds
//! one or more waves: accounts inside a wave deploy in parallel, waves and
//! stages run strictly one after the other.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::account::AccountDescriptor;
use super::target::TargetProperties;

/// What a stage does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Approval,
    Deploy,
}

/// One pipeline stage, built from one target group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
    pub provider: String,
    pub properties: TargetProperties,
    pub waves: Vec<Vec<AccountDescriptor>>,
}

impl Stage {
    /// Single-action stage holding a manual approval
    pub fn approval(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Approval,
            provider: "approval".to_string(),
            properties: TargetProperties::default(),
            waves: vec![vec![AccountDescriptor::approval()]],
        }
    }

    /// Accounts of the stage in wave order
    pub fn accounts(&self) -> impl Iterator<Item = &AccountDescriptor> {
        self.waves.iter().flatten()
    }
}

/// Wave plan of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentWaves {
    /// Regions the pipeline deploys to, home region first when it was added
    pub regions: Vec<String>,
    pub stages: Vec<Stage>,
}

impl DeploymentWaves {
    /// Sequential view of the plan: one inner slice per wave, across stages
    pub fn sequences(&self) -> Vec<&[AccountDescriptor]> {
        self.stages
            .iter()
            .flat_map(|stage| stage.waves.iter().map(Vec::as_slice))
            .collect()
    }

    /// All descriptors in execution order, approvals included
    pub fn accounts(&self) -> impl Iterator<Item = &AccountDescriptor> {
        self.stages.iter().flat_map(Stage::accounts)
    }

    /// Deploy targets merged by account id
    ///
    /// Approval steps are dropped. An account targeted by several stages
    /// appears once, at its first position, with the sorted union of regions.
    pub fn target_accounts(&self) -> Vec<AccountDescriptor> {
        let mut merged: Vec<AccountDescriptor> = Vec::new();
        let mut regions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for account in self.accounts().filter(|a| !a.is_approval()) {
            if !regions.contains_key(&account.id) {
                merged.push(account.clone());
            }
            regions
                .entry(account.id.clone())
                .or_default()
                .extend(account.regions.iter().cloned());
        }

        for account in &mut merged {
            if let Some(set) = regions.remove(&account.id) {
                account.regions = set.into_iter().collect();
            }
        }
        merged
    }

    /// Account name to the target expression it was resolved from
    pub fn account_ous(&self) -> BTreeMap<String, String> {
        self.accounts()
            .filter(|a| !a.is_approval())
            .map(|a| (a.name.clone(), a.path()))
            .collect()
    }
}
