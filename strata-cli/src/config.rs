//! Configuration module
//!
//! Handles CLI configuration: where the deployment map lives and how the
//! engine is configured.

use anyhow::{Context, Result};
use std::path::PathBuf;
use strata_core::deployment_map::DeploymentMap;
use strata_engine::EngineConfig;
use tracing::info;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the deployment map files
    pub map_root: PathBuf,
}

impl Config {
    /// Loads every deployment map file under the map root
    pub fn load_map(&self) -> Result<DeploymentMap> {
        DeploymentMap::load(&self.map_root).with_context(|| {
            format!(
                "Failed to load deployment map from {}",
                self.map_root.display()
            )
        })
    }

    /// Loads engine configuration from environment variables
    ///
    /// The deployment account and region have no defaults; a missing or
    /// malformed variable fails the command.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Self::engine_config_from(|name| std::env::var(name).ok())
    }

    fn engine_config_from<F>(lookup: F) -> Result<EngineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = EngineConfig::from_vars(lookup)
            .context("Failed to load engine configuration from the environment")?;
        config.validate().context("Invalid engine configuration")?;
        info!(
            "Deploying from account {} in {}",
            config.deployment_account_id, config.deployment_region
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_engine_config_keeps_deployment_account() {
        let config = Config::engine_config_from(vars(&[
            ("STRATA_DEPLOYMENT_ACCOUNT_ID", "123456789012"),
            ("STRATA_DEPLOYMENT_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.deployment_account_id, "123456789012");
        assert_eq!(config.deployment_region, "eu-west-1");
    }

    #[test]
    fn test_engine_config_malformed_variable_fails() {
        let err = Config::engine_config_from(vars(&[
            ("STRATA_DEPLOYMENT_ACCOUNT_ID", "123456789012"),
            ("STRATA_DEPLOYMENT_REGION", "eu-west-1"),
            ("STRATA_ALLOW_EMPTY_TARGET", "maybe"),
        ]))
        .unwrap_err();
        assert!(format!("{:#}", err).contains("STRATA_ALLOW_EMPTY_TARGET"));
    }

    #[test]
    fn test_engine_config_missing_account_fails() {
        let err = Config::engine_config_from(vars(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("STRATA_DEPLOYMENT_ACCOUNT_ID"));

        let err = Config::engine_config_from(vars(&[
            ("STRATA_DEPLOYMENT_ACCOUNT_ID", "12345"),
            ("STRATA_DEPLOYMENT_REGION", "eu-west-1"),
        ]))
        .unwrap_err();
        assert!(format!("{:#}", err).contains("12 digit"));
    }
}
