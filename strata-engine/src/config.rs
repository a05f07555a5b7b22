//! Engine configuration
//!
//! Defines all configurable parameters of a resolution run: the deployment
//! account and home region, parameter layering, role names and the limits
//! applied when fanning work out against the remote APIs.

use std::path::PathBuf;
use std::time::Duration;

/// Role assumed in target accounts to read stack outputs
pub const DEFAULT_READONLY_ROLE: &str = "strata-readonly-automation-role";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Account hosting the pipelines
    pub deployment_account_id: String,

    /// Home region: default region of lookups and first pipeline region
    pub deployment_region: String,

    /// Organization stage adding a `global_<stage>` parameter layer
    pub org_stage: Option<String>,

    /// Tolerate targets that expand to zero accounts
    pub allow_empty_target: bool,

    /// Role assumed for `import:` lookups
    pub readonly_role_name: String,

    /// Maximum number of pipelines resolved at the same time
    pub max_concurrency: usize,

    /// Number of workers launched before pausing
    pub batch_size: usize,

    /// Bounds of the randomized pause between batches
    pub batch_delay_min: Duration,
    pub batch_delay_max: Duration,

    /// Bound on parent-link walks through the organization
    pub max_ou_depth: usize,

    /// Actions per wave when a target group does not set `wave.size`
    pub default_wave_size: usize,

    /// How often the pipeline executor is polled after a submission
    pub poll_interval: Duration,

    /// Directory holding one `<pipeline>/params/` folder per pipeline
    pub params_root: PathBuf,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new(deployment_account_id: String, deployment_region: String) -> Self {
        Self {
            deployment_account_id,
            deployment_region,
            org_stage: None,
            allow_empty_target: false,
            readonly_role_name: DEFAULT_READONLY_ROLE.to_string(),
            max_concurrency: 10,
            batch_size: 10,
            batch_delay_min: Duration::from_secs(5),
            batch_delay_max: Duration::from_secs(11),
            max_ou_depth: 32,
            default_wave_size: strata_core::domain::target::DEFAULT_WAVE_SIZE,
            poll_interval: Duration::from_secs(15),
            params_root: PathBuf::from("."),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - STRATA_DEPLOYMENT_ACCOUNT_ID (required)
    /// - STRATA_DEPLOYMENT_REGION (required, falls back to AWS_REGION)
    /// - STRATA_ORG_STAGE (optional)
    /// - STRATA_ALLOW_EMPTY_TARGET (optional, default: false)
    /// - STRATA_READONLY_ROLE (optional)
    /// - STRATA_MAX_CONCURRENCY (optional, default: 10)
    /// - STRATA_BATCH_SIZE (optional, default: 10)
    /// - STRATA_BATCH_DELAY_MIN_SECS / STRATA_BATCH_DELAY_MAX_SECS (optional, default: 5 / 11)
    /// - STRATA_MAX_OU_DEPTH (optional, default: 32)
    /// - STRATA_DEFAULT_WAVE_SIZE (optional, default: 50)
    /// - STRATA_POLL_INTERVAL_SECS (optional, default: 15)
    /// - STRATA_PARAMS_ROOT (optional, default: .)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Creates configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let deployment_account_id = lookup("STRATA_DEPLOYMENT_ACCOUNT_ID").ok_or_else(|| {
            anyhow::anyhow!("STRATA_DEPLOYMENT_ACCOUNT_ID environment variable not set")
        })?;

        let deployment_region = lookup("STRATA_DEPLOYMENT_REGION")
            .or_else(|| lookup("AWS_REGION"))
            .ok_or_else(|| {
                anyhow::anyhow!("STRATA_DEPLOYMENT_REGION environment variable not set")
            })?;

        let mut config = Self::new(deployment_account_id, deployment_region);

        config.org_stage = lookup("STRATA_ORG_STAGE").filter(|s| !s.is_empty());

        if let Some(value) = lookup("STRATA_ALLOW_EMPTY_TARGET") {
            config.allow_empty_target = parse_bool(&value).ok_or_else(|| {
                anyhow::anyhow!("STRATA_ALLOW_EMPTY_TARGET must be true or false, got '{}'", value)
            })?;
        }

        if let Some(role) = lookup("STRATA_READONLY_ROLE") {
            config.readonly_role_name = role;
        }

        let number = |name: &str| -> anyhow::Result<Option<u64>> {
            match lookup(name) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", name, value)),
                None => Ok(None),
            }
        };

        if let Some(n) = number("STRATA_MAX_CONCURRENCY")? {
            config.max_concurrency = n as usize;
        }
        if let Some(n) = number("STRATA_BATCH_SIZE")? {
            config.batch_size = n as usize;
        }
        if let Some(n) = number("STRATA_BATCH_DELAY_MIN_SECS")? {
            config.batch_delay_min = Duration::from_secs(n);
        }
        if let Some(n) = number("STRATA_BATCH_DELAY_MAX_SECS")? {
            config.batch_delay_max = Duration::from_secs(n);
        }
        if let Some(n) = number("STRATA_MAX_OU_DEPTH")? {
            config.max_ou_depth = n as usize;
        }
        if let Some(n) = number("STRATA_DEFAULT_WAVE_SIZE")? {
            config.default_wave_size = n as usize;
        }
        if let Some(n) = number("STRATA_POLL_INTERVAL_SECS")? {
            config.poll_interval = Duration::from_secs(n);
        }

        if let Some(root) = lookup("STRATA_PARAMS_ROOT") {
            config.params_root = PathBuf::from(root);
        }

        Ok(config)
    }

    /// Sets the parameter root directory
    pub fn with_params_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.params_root = root.into();
        self
    }

    /// Sets the pause between batches to a fixed duration
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_min = delay;
        self.batch_delay_max = delay;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.deployment_account_id.len() != 12
            || !self.deployment_account_id.bytes().all(|b| b.is_ascii_digit())
        {
            anyhow::bail!(
                "deployment_account_id must be a 12 digit account id, got '{}'",
                self.deployment_account_id
            );
        }

        if self.deployment_region.is_empty() {
            anyhow::bail!("deployment_region cannot be empty");
        }

        if self.readonly_role_name.is_empty() {
            anyhow::bail!("readonly_role_name cannot be empty");
        }

        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.batch_delay_min > self.batch_delay_max {
            anyhow::bail!("batch delay minimum cannot exceed the maximum");
        }

        if self.max_ou_depth == 0 {
            anyhow::bail!("max_ou_depth must be greater than 0");
        }

        if self.default_wave_size == 0 {
            anyhow::bail!("default_wave_size must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
