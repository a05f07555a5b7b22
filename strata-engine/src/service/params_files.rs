//! Parameter files
//!
//! Locates the override layers of an (account, region) pair on disk and
//! writes resolved documents back out as `params/<account>_<region>.json`.

use std::path::{Path, PathBuf};
use tracing::debug;

use strata_core::domain::account::AccountDescriptor;
use strata_core::domain::parameters::{
    OverrideDocument, PARAMS_DIR, ResolvedParameters, clean_params_filename, layer_sources,
};
use strata_core::{EngineError, Result};

/// Override files of one pipeline
#[derive(Debug, Clone)]
pub struct ParameterFiles {
    root: PathBuf,
    org_stage: Option<String>,
}

impl ParameterFiles {
    /// # Arguments
    /// * `root` - Directory containing the `params/` folder
    /// * `org_stage` - Organization stage adding a `global_<stage>` layer
    pub fn new(root: impl Into<PathBuf>, org_stage: Option<String>) -> Self {
        Self {
            root: root.into(),
            org_stage,
        }
    }

    /// Loads every layer of an account and region, lowest precedence first
    ///
    /// The OU layers are only present when the account was targeted through
    /// an OU id or path.
    pub fn layers_for(
        &self,
        account: &AccountDescriptor,
        region: &str,
    ) -> Result<Vec<OverrideDocument>> {
        let ou_stem = account.source.ou_layer_stem();
        layer_sources(
            &account.name,
            region,
            ou_stem.as_deref(),
            self.org_stage.as_deref(),
        )
        .iter()
        .map(|source| OverrideDocument::load(&self.root, &source.stem))
        .collect()
    }

    /// Writes a resolved document under `out_dir/params/`
    pub fn write(out_dir: &Path, resolved: &ResolvedParameters) -> Result<PathBuf> {
        let dir = out_dir.join(PARAMS_DIR);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", clean_params_filename(&resolved.file_stem())));
        let content = serde_json::to_string_pretty(&resolved.document).map_err(|e| {
            EngineError::ParameterFile {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        std::fs::write(&path, content)?;

        debug!("Wrote {}", path.display());
        Ok(path)
    }
}
