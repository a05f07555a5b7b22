//! Pipeline plan

use serde::{Deserialize, Serialize};

use super::parameters::ResolvedParameters;
use super::wave::DeploymentWaves;

/// Everything resolved for one pipeline: its waves and the parameter
/// documents of every (account, region) pair it deploys to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub name: String,
    pub waves: DeploymentWaves,
    pub parameters: Vec<ResolvedParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,
}

impl PipelinePlan {
    pub fn regions(&self) -> &[String] {
        &self.waves.regions
    }

    /// Number of distinct deploy targets
    pub fn account_count(&self) -> usize {
        self.waves.target_accounts().len()
    }
}
