//! Parameter override documents and layers
//!
//! Override files live under `<root>/params/` and are named after the layer
//! they feed: `global`, `global_<stage>`, `global_<region>`, `<ou>`,
//! `<ou>_<region>`, `<account>` and `<account>_<region>`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Sub-directory holding override files
pub const PARAMS_DIR: &str = "params";

/// Parameters and tags of one layer, or of a merged result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideDocument {
    #[serde(rename = "Parameters", default)]
    pub parameters: BTreeMap<String, JsonValue>,
    #[serde(rename = "Tags", default)]
    pub tags: BTreeMap<String, JsonValue>,
}

impl OverrideDocument {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.tags.is_empty()
    }

    /// Builder helper used when assembling documents in code
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Builder helper used when assembling documents in code
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Reads the override file for `stem` below `root/params`
    ///
    /// `<stem>.json` is tried first, then `<stem>.yml`. A missing file is an
    /// empty layer; an unreadable or malformed one is an error.
    pub fn load(root: &Path, stem: &str) -> Result<Self> {
        let base = root.join(PARAMS_DIR).join(clean_params_filename(stem));

        let json_path = base.with_extension("json");
        if let Some(content) = read_optional(&json_path)? {
            debug!("Read {}", json_path.display());
            return parse_layer(&json_path, &content, |c| {
                serde_json::from_str(c).map_err(|e| e.to_string())
            });
        }

        let yaml_path = base.with_extension("yml");
        if let Some(content) = read_optional(&yaml_path)? {
            debug!("Read {}", yaml_path.display());
            return parse_layer(&yaml_path, &content, |c| {
                serde_yaml::from_str(c).map_err(|e| e.to_string())
            });
        }

        debug!(
            "No parameter file for {}, defaulting to empty",
            base.display()
        );
        Ok(Self::default())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_layer<F>(path: &Path, content: &str, parse: F) -> Result<OverrideDocument>
where
    F: FnOnce(&str) -> std::result::Result<Option<OverrideDocument>, String>,
{
    if content.trim().is_empty() {
        return Ok(OverrideDocument::default());
    }
    parse(content)
        .map(Option::unwrap_or_default)
        .map_err(|message| EngineError::ParameterFile {
            path: path.display().to_string(),
            message,
        })
}

/// Replaces every run of characters outside `[0-9A-Za-z_\-/]` with `_`
pub fn clean_params_filename(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/') {
            cleaned.push(c);
            in_run = false;
        } else if !in_run {
            cleaned.push('_');
            in_run = true;
        }
    }
    cleaned
}

/// Precedence layer of an override document, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLayer {
    Global,
    GlobalStage,
    GlobalRegion,
    Ou,
    OuRegion,
    Account,
    AccountRegion,
}

/// A layer together with the file stem it is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSource {
    pub layer: ParamLayer,
    pub stem: String,
}

/// Layer stems for one (account, region) pair, lowest precedence first
///
/// # Arguments
/// * `account_name` - Sanitized account name
/// * `region` - Target region
/// * `ou_stem` - OU layer stem, when the account was targeted through an OU
/// * `org_stage` - Organization stage adding a `global_<stage>` layer
pub fn layer_sources(
    account_name: &str,
    region: &str,
    ou_stem: Option<&str>,
    org_stage: Option<&str>,
) -> Vec<LayerSource> {
    let mut sources = vec![LayerSource {
        layer: ParamLayer::Global,
        stem: "global".to_string(),
    }];

    if let Some(stage) = org_stage.filter(|s| !s.is_empty()) {
        sources.push(LayerSource {
            layer: ParamLayer::GlobalStage,
            stem: format!("global_{}", stage),
        });
    }

    sources.push(LayerSource {
        layer: ParamLayer::GlobalRegion,
        stem: format!("global_{}", region),
    });

    if let Some(ou) = ou_stem {
        sources.push(LayerSource {
            layer: ParamLayer::Ou,
            stem: ou.to_string(),
        });
        sources.push(LayerSource {
            layer: ParamLayer::OuRegion,
            stem: format!("{}_{}", ou, region),
        });
    }

    sources.push(LayerSource {
        layer: ParamLayer::Account,
        stem: account_name.to_string(),
    });
    sources.push(LayerSource {
        layer: ParamLayer::AccountRegion,
        stem: format!("{}_{}", account_name, region),
    });

    sources
}

/// Final document for one (account, region) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    pub account_id: String,
    pub account_name: String,
    pub region: String,
    pub document: OverrideDocument,
}

impl ResolvedParameters {
    /// File stem the document is written under: `<account_name>_<region>`
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.account_name, self.region)
    }
}
