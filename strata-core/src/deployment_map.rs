//! Deployment map loading and validation
//!
//! The map is read from `deployment_map.yml` at the map root plus every
//! `*.yml` file below `deployment_maps/`. Validation only checks the
//! structure of each pipeline entry; whether targets exist in the
//! organization is discovered later, during target resolution.

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::target::{TargetGroup, scalar_string};
use crate::error::{EngineError, Result};

/// Main map file at the map root
pub const MAP_FILE: &str = "deployment_map.yml";

/// Directory holding additional map files
pub const MAP_DIR: &str = "deployment_maps";

/// Sample file shipped next to real maps, never loaded
const EXAMPLE_MAP_FILE: &str = "example-deployment_map.yml";

/// Parsed deployment map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentMap {
    #[serde(default)]
    pub pipelines: Vec<PipelineDef>,
}

/// One pipeline entry of the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Top-level regions, overriding the union of target regions
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub regions: Option<Vec<String>>,

    /// Raw target entries, classified by [`PipelineDef::target_groups`]
    #[serde(default)]
    pub targets: Vec<YamlValue>,

    /// Free-form pipeline parameters
    #[serde(default)]
    pub params: YamlValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        OneOrMany::One(region) => vec![region],
        OneOrMany::Many(regions) => regions,
    }))
}

impl PipelineDef {
    /// Classifies the raw target entries, one group per stage
    pub fn target_groups(&self) -> Result<Vec<TargetGroup>> {
        self.targets
            .iter()
            .map(|entry| TargetGroup::from_yaml(&self.name, entry))
            .collect()
    }

    /// Notification endpoint, either top-level or under `params`
    pub fn notification_endpoint(&self) -> Option<String> {
        self.notification_endpoint
            .clone()
            .or_else(|| self.params.get("notification_endpoint").and_then(scalar_string))
    }

    fn validate(&self, index: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::validation(
                format!("#{}", index),
                "pipeline has no name",
            ));
        }

        if self.targets.is_empty() {
            return Err(EngineError::validation(
                &self.name,
                "pipeline has no targets",
            ));
        }

        for (position, target) in self.targets.iter().enumerate() {
            match target {
                YamlValue::Mapping(mapping) => {
                    if !mapping.contains_key("path") && !mapping.contains_key("target") {
                        return Err(EngineError::validation(
                            &self.name,
                            format!("target #{} is missing the 'path' key", position + 1),
                        ));
                    }
                }
                YamlValue::Sequence(items) => {
                    let shapeless = items.iter().any(|item| match item {
                        YamlValue::Mapping(mapping) => {
                            mapping.len() != 1
                                || !["path", "target", "tags"]
                                    .iter()
                                    .any(|key| mapping.contains_key(*key))
                        }
                        YamlValue::Sequence(_) => true,
                        _ => false,
                    });
                    if shapeless {
                        return Err(EngineError::validation(
                            &self.name,
                            format!("target #{} holds an unsupported list item", position + 1),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl DeploymentMap {
    /// Parses a single map document
    ///
    /// # Arguments
    /// * `content` - YAML text of the document
    /// * `source` - Name used in error messages
    pub fn from_yaml_str(content: &str, source: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(EngineError::Load(format!("{} is empty", source)));
        }
        serde_yaml::from_str(content).map_err(|e| EngineError::Load(format!("{}: {}", source, e)))
    }

    /// Loads every map file under `root`
    ///
    /// Pipelines are concatenated in file order: the main map first, then
    /// the files of `deployment_maps/` sorted by name.
    pub fn load(root: &Path) -> Result<Self> {
        let mut files = Vec::new();

        let main = root.join(MAP_FILE);
        if main.is_file() {
            files.push(main);
        }
        files.extend(map_dir_files(&root.join(MAP_DIR))?);

        let mut map = DeploymentMap::default();
        for file in files {
            let content = std::fs::read_to_string(&file)?;
            let source = file.display().to_string();
            let document = Self::from_yaml_str(&content, &source)?;
            info!(
                "Loaded deployment map {} ({} pipeline(s))",
                source,
                document.pipelines.len()
            );
            map.pipelines.extend(document.pipelines);
        }

        if map.pipelines.is_empty() {
            return Err(EngineError::Load(format!(
                "No pipelines defined in the deployment maps under {}",
                root.display()
            )));
        }

        Ok(map)
    }

    /// Checks the structure of every pipeline entry
    ///
    /// Stops at the first violation: a pipeline without a name, without
    /// targets, with a mapping target lacking `path`, or reusing a name.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, pipeline) in self.pipelines.iter().enumerate() {
            pipeline.validate(index + 1)?;
            if !seen.insert(pipeline.name.as_str()) {
                return Err(EngineError::validation(
                    &pipeline.name,
                    "pipeline name is defined more than once",
                ));
            }
        }
        debug!("Validated {} pipeline(s)", self.pipelines.len());
        Ok(())
    }

    /// Finds a pipeline by name
    pub fn pipeline(&self, name: &str) -> Option<&PipelineDef> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }
}

fn map_dir_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path.extension().is_some_and(|ext| ext == "yml" || ext == "yaml");
        let is_example = path.file_name().is_some_and(|name| name == EXAMPLE_MAP_FILE);
        if path.is_file() && is_yaml && !is_example {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::target::TargetExpr;

    const SAMPLE: &str = r#"
pipelines:
  - name: network
    regions: eu-west-1
    params:
      notification_endpoint: team@example.com
    targets:
      - /banking/testing
      - approval
      - path: /banking/production
        regions: [eu-west-1, us-east-1]
  - name: iam
    targets:
      - ['111111111111', '222222222222']
"#;

    #[test]
    fn test_parse_and_validate() {
        let map = DeploymentMap::from_yaml_str(SAMPLE, "sample").unwrap();
        assert!(map.validate().is_ok());
        assert_eq!(map.names(), vec!["network", "iam"]);

        let network = map.pipeline("network").unwrap();
        assert_eq!(network.regions, Some(vec!["eu-west-1".to_string()]));
        assert_eq!(
            network.notification_endpoint().as_deref(),
            Some("team@example.com")
        );

        let groups = network.target_groups().unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups[1].is_approval());
        assert_eq!(
            groups[2].regions,
            Some(vec!["eu-west-1".to_string(), "us-east-1".to_string()])
        );

        let iam = map.pipeline("iam").unwrap().target_groups().unwrap();
        assert_eq!(
            iam[0].expressions,
            vec![
                TargetExpr::AccountId("111111111111".to_string()),
                TargetExpr::AccountId("222222222222".to_string()),
            ]
        );
    }

    #[test]
    fn test_validation_reports_first_violation_only() {
        let map = DeploymentMap::from_yaml_str(
            r#"
pipelines:
  - name: first
    targets:
      - regions: [eu-west-1]
  - name: second
    targets:
      - tags: {team: core}
"#,
            "sample",
        )
        .unwrap();

        match map.validate() {
            Err(EngineError::Validation { pipeline, message }) => {
                assert_eq!(pipeline, "first");
                assert!(message.contains("path"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validation_rejects_missing_name_and_targets() {
        let no_name = DeploymentMap::from_yaml_str(
            "pipelines:\n  - targets: ['/banking']\n",
            "sample",
        )
        .unwrap();
        assert!(matches!(no_name.validate(), Err(EngineError::Validation { .. })));

        let no_targets =
            DeploymentMap::from_yaml_str("pipelines:\n  - name: empty\n", "sample").unwrap();
        assert!(matches!(
            no_targets.validate(),
            Err(EngineError::Validation { pipeline, .. }) if pipeline == "empty"
        ));
    }

    #[test]
    fn test_validation_rejects_duplicate_names() {
        let map = DeploymentMap::from_yaml_str(
            "pipelines:\n  - name: a\n    targets: ['/x']\n  - name: a\n    targets: ['/y']\n",
            "sample",
        )
        .unwrap();
        assert!(matches!(map.validate(), Err(EngineError::Validation { .. })));
    }

    #[test]
    fn test_validation_rejects_mappings_in_target_lists() {
        let map = DeploymentMap::from_yaml_str(
            "pipelines:\n  - name: a\n    targets:\n      - [/x, {regions: eu-west-1}]\n",
            "sample",
        )
        .unwrap();
        match map.validate() {
            Err(EngineError::Validation { pipeline, message }) => {
                assert_eq!(pipeline, "a");
                assert!(message.contains("#1"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let map = DeploymentMap::from_yaml_str(
            "pipelines:\n  - name: a\n    targets:\n      - [/x, {tags: {team: core}}]\n",
            "sample",
        )
        .unwrap();
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_malformed_documents_fail_to_load() {
        assert!(matches!(
            DeploymentMap::from_yaml_str("", "empty.yml"),
            Err(EngineError::Load(_))
        ));
        assert!(matches!(
            DeploymentMap::from_yaml_str("pipelines: [", "broken.yml"),
            Err(EngineError::Load(_))
        ));
    }

    #[test]
    fn test_load_merges_map_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MAP_FILE),
            "pipelines:\n  - name: main\n    targets: ['/a']\n",
        )
        .unwrap();
        let extra = dir.path().join(MAP_DIR);
        std::fs::create_dir(&extra).unwrap();
        std::fs::write(
            extra.join("b.yml"),
            "pipelines:\n  - name: b\n    targets: ['/b']\n",
        )
        .unwrap();
        std::fs::write(
            extra.join("a.yml"),
            "pipelines:\n  - name: a\n    targets: ['/a']\n",
        )
        .unwrap();
        std::fs::write(
            extra.join(EXAMPLE_MAP_FILE),
            "pipelines:\n  - name: example\n    targets: ['/x']\n",
        )
        .unwrap();

        let map = DeploymentMap::load(dir.path()).unwrap();
        assert_eq!(map.names(), vec!["main", "a", "b"]);
    }

    #[test]
    fn test_load_without_pipelines_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DeploymentMap::load(dir.path()),
            Err(EngineError::Load(_))
        ));
    }
}
