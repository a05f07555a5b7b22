//! Target expressions and target groups
//!
//! A deployment map names its targets with loosely shaped values: account
//! ids, OU ids, OU paths, tag mappings or the `approval` marker. They are
//! classified once into [`TargetExpr`] when the map is read; everything
//! downstream matches on the variant.

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use super::account::APPROVAL;
use crate::error::{EngineError, Result};

/// Suffix on an OU path requesting all descendant OUs as well
pub const RECURSIVE_SUFFIX: &str = "/**/*";

/// Maximum number of actions in one wave when a group does not set `wave.size`
pub const DEFAULT_WAVE_SIZE: usize = 50;

/// Provider used when a target group does not name one
pub const CLOUDFORMATION_PROVIDER: &str = "cloudformation";

/// Tag key to accepted values
pub type TagFilter = BTreeMap<String, Vec<String>>;

/// Classified target expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetExpr {
    /// Manual approval step
    Approval,
    /// A single 12 digit account id
    AccountId(String),
    /// Accounts directly under an OU, by id
    OuId(String),
    /// Accounts under an OU addressed by its name path from the root
    OuPath { path: String, recursive: bool },
    /// Accounts (or OUs) carrying the given tags
    Tags(TagFilter),
    /// No accounts, only regions
    RegionOnly,
}

impl TargetExpr {
    /// Classifies a textual target expression
    ///
    /// Classification is purely syntactic. Anything that is not `approval`,
    /// an `ou-` id, a 12 digit account id or a `/` path is rejected.
    pub fn classify(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if raw == APPROVAL {
            return Ok(Self::Approval);
        }

        if raw.starts_with("ou-") {
            return Ok(Self::OuId(raw.to_string()));
        }

        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if raw.len() == 12 {
                return Ok(Self::AccountId(raw.to_string()));
            }
            warn_numeric_target(raw);
            return Err(EngineError::InvalidTarget(raw.to_string()));
        }

        if raw.starts_with('/') {
            let expr = match raw.strip_suffix(RECURSIVE_SUFFIX) {
                Some(base) => Self::OuPath {
                    path: if base.is_empty() { "/" } else { base }.to_string(),
                    recursive: true,
                },
                None => Self::OuPath {
                    path: raw.to_string(),
                    recursive: false,
                },
            };
            return Ok(expr);
        }

        Err(EngineError::InvalidTarget(raw.to_string()))
    }

    /// Classifies a target value as it appears in a deployment map
    ///
    /// `null` means the group only carries regions, a mapping is a tag filter
    /// and scalars are classified as text.
    pub fn from_yaml(value: &YamlValue) -> Result<Self> {
        match value {
            YamlValue::Null => Ok(Self::RegionOnly),
            YamlValue::Mapping(_) => Ok(Self::Tags(tag_filter(value)?)),
            other => match scalar_string(other) {
                Some(text) => Self::classify(&text),
                None => Err(EngineError::InvalidTarget(format!("{:?}", other))),
            },
        }
    }

    /// Stem of the OU parameter layer for accounts expanded from this expression
    ///
    /// Only OU ids and OU paths name an OU layer; the root path has none.
    pub fn ou_layer_stem(&self) -> Option<String> {
        match self {
            Self::OuId(id) => Some(id.clone()),
            Self::OuPath { path, .. } => {
                let stem = path.strip_prefix('/').unwrap_or(path);
                let stem = stem.trim_end_matches('/');
                if stem.is_empty() {
                    None
                } else {
                    Some(stem.to_string())
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for TargetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approval => write!(f, "{}", APPROVAL),
            Self::AccountId(id) | Self::OuId(id) => write!(f, "{}", id),
            Self::OuPath { path, recursive } => {
                if *recursive {
                    write!(f, "{}{}", path.trim_end_matches('/'), RECURSIVE_SUFFIX)
                } else {
                    write!(f, "{}", path)
                }
            }
            Self::Tags(filter) => {
                let parts: Vec<String> = filter
                    .iter()
                    .map(|(key, values)| format!("{}={}", key, values.join("|")))
                    .collect();
                write!(f, "tags({})", parts.join(","))
            }
            Self::RegionOnly => write!(f, "regions-only"),
        }
    }
}

fn warn_numeric_target(raw: &str) {
    let octal = raw
        .parse::<u64>()
        .map(|n| format!("0{:o}", n))
        .unwrap_or_else(|_| "?".to_string());
    warn!(
        "The specified path is numeric, but is not 12 chars long. This typically happens \
         when the account id is written as a number while it starts with a zero. Wrap the \
         account id in quotes to make it a string. The current path is interpreted as '{}', \
         read as an octal it would be '{}'.",
        raw, octal
    );
}

/// Extra settings of a target group passed through to the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub change_set_approval: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One entry of a pipeline's `targets` list, i.e. one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub name: Option<String>,
    pub expressions: Vec<TargetExpr>,
    pub regions: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub wave_size: Option<usize>,
    pub provider: String,
    pub properties: TargetProperties,
}

impl TargetGroup {
    fn with_expressions(expressions: Vec<TargetExpr>) -> Self {
        Self {
            name: None,
            expressions,
            regions: None,
            exclude: Vec::new(),
            wave_size: None,
            provider: CLOUDFORMATION_PROVIDER.to_string(),
            properties: TargetProperties::default(),
        }
    }

    /// Builds a target group from a map entry
    ///
    /// Accepted shapes: a scalar expression, a list of scalar expressions,
    /// or a mapping with `path` (or its alias `target`) plus optional
    /// `name`, `regions`, `tags`, `exclude`, `wave.size`, `provider` and
    /// `properties`.
    pub fn from_yaml(pipeline: &str, entry: &YamlValue) -> Result<Self> {
        let mapping = match entry {
            YamlValue::Mapping(mapping) => mapping,
            YamlValue::Sequence(items) => {
                let expressions = items
                    .iter()
                    .map(|item| list_item(pipeline, item))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Self::with_expressions(expressions));
            }
            scalar => return Ok(Self::with_expressions(vec![TargetExpr::from_yaml(scalar)?])),
        };

        let path = mapping
            .get("path")
            .or_else(|| mapping.get("target"))
            .ok_or_else(|| EngineError::validation(pipeline, "target entry is missing 'path'"))?;

        let mut expressions = match path {
            YamlValue::Sequence(items) => items
                .iter()
                .map(|item| list_item(pipeline, item))
                .collect::<Result<Vec<_>>>()?,
            other => vec![TargetExpr::from_yaml(other)?],
        };

        if let Some(tags) = mapping.get("tags") {
            expressions.push(TargetExpr::Tags(tag_filter(tags)?));
        }

        let wave_size = match mapping.get("wave").and_then(|wave| wave.get("size")) {
            Some(size) => {
                let size = size
                    .as_u64()
                    .filter(|size| *size > 0)
                    .ok_or_else(|| {
                        EngineError::validation(pipeline, "wave.size must be a positive integer")
                    })?;
                Some(size as usize)
            }
            None => None,
        };

        let properties = match mapping.get("properties") {
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                EngineError::validation(pipeline, format!("invalid target properties: {}", e))
            })?,
            None => TargetProperties::default(),
        };

        Ok(Self {
            name: mapping.get("name").and_then(scalar_string),
            expressions,
            regions: mapping.get("regions").map(string_list),
            exclude: mapping.get("exclude").map(string_list).unwrap_or_default(),
            wave_size,
            provider: mapping
                .get("provider")
                .and_then(scalar_string)
                .unwrap_or_else(|| CLOUDFORMATION_PROVIDER.to_string()),
            properties,
        })
    }

    /// Whether the group only holds approval markers
    pub fn is_approval(&self) -> bool {
        !self.expressions.is_empty()
            && self
                .expressions
                .iter()
                .all(|expr| matches!(expr, TargetExpr::Approval))
    }

    /// Human readable label: the group name or its expressions
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .expressions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Number of pipeline actions generated for one account of this group
    ///
    /// CloudFormation deployments without an explicit action use a change set
    /// (create + execute, plus an approval when requested) in every region.
    pub fn actions_per_account(&self, region_count: usize) -> usize {
        let mut per_region = 1;
        if self.provider == CLOUDFORMATION_PROVIDER && self.properties.action.is_none() {
            per_region += 1 + usize::from(self.properties.change_set_approval);
        }
        per_region * region_count.max(1)
    }
}

/// Classifies one item of a target list
///
/// Items are scalars, `null`, a `{tags: ...}` mapping or a single-key
/// `{path: ...}` mapping holding a scalar. Anything else is rejected.
fn list_item(pipeline: &str, item: &YamlValue) -> Result<TargetExpr> {
    let mapping = match item {
        YamlValue::Mapping(mapping) => mapping,
        YamlValue::Sequence(_) => {
            return Err(EngineError::validation(
                pipeline,
                "target lists cannot be nested",
            ));
        }
        scalar => return TargetExpr::from_yaml(scalar),
    };

    if mapping.len() == 1 {
        if let Some(tags) = mapping.get("tags") {
            return Ok(TargetExpr::Tags(tag_filter(tags)?));
        }
        if let Some(path) = mapping.get("path").or_else(|| mapping.get("target")) {
            if !matches!(path, YamlValue::Mapping(_) | YamlValue::Sequence(_)) {
                return TargetExpr::from_yaml(path);
            }
        }
    }

    Err(EngineError::validation(
        pipeline,
        format!("unsupported target in list: {:?}", item),
    ))
}

/// Converts a scalar YAML value to text
pub(crate) fn scalar_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads a scalar or a list of scalars as a list of strings
pub(crate) fn string_list(value: &YamlValue) -> Vec<String> {
    match value {
        YamlValue::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

fn tag_filter(value: &YamlValue) -> Result<TagFilter> {
    let YamlValue::Mapping(mapping) = value else {
        return Err(EngineError::InvalidTarget(format!("{:?}", value)));
    };

    let mut filter = TagFilter::new();
    for (key, values) in mapping {
        let key = scalar_string(key).ok_or_else(|| EngineError::InvalidTarget(format!("{:?}", key)))?;
        filter.insert(key, string_list(values));
    }
    Ok(filter)
}
