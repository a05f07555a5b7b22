//! In-memory backend
//!
//! Implements every repository from an [`OrganizationSnapshot`], a YAML or
//! JSON description of an organization with its parameters and stack
//! outputs. Used by the CLI to plan against a captured organization and by
//! the tests as a fixture. Every call is counted per operation so callers
//! can assert how many remote calls a resolution performed.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use strata_core::CapabilityError;
use strata_core::domain::account::{Account, AccountStatus};
use strata_core::domain::organization::{OrganizationalUnit, Page, ParentKind, ParentRef};
use strata_core::domain::plan::PipelinePlan;
use strata_core::domain::target::TagFilter;

use super::{
    AccountTagRepository, BlobRepository, CapabilityResult, CredentialContext,
    CredentialRepository, OrganizationRepository, ParameterStoreRepository,
    PipelineExecutorRepository, StackOutputRepository, SubmissionStatus,
};

fn default_root_id() -> String {
    "r-root".to_string()
}

/// Captured organization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    #[serde(default = "default_root_id")]
    pub root_id: String,
    #[serde(default)]
    pub organizational_units: Vec<SnapshotOu>,
    #[serde(default)]
    pub accounts: Vec<SnapshotAccount>,
    /// Region to parameter name to value
    #[serde(default)]
    pub parameters: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub stack_outputs: Vec<SnapshotStack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOu {
    pub id: String,
    pub name: String,
    pub parent: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAccount {
    pub id: String,
    pub name: String,
    pub parent: String,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStack {
    pub account_id: String,
    pub region: String,
    pub stack_name: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl OrganizationSnapshot {
    /// Parses a snapshot from YAML (JSON is accepted as well)
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn ou(&self, id: &str) -> Option<&SnapshotOu> {
        self.organizational_units.iter().find(|ou| ou.id == id)
    }

    fn account(&self, id: &str) -> Option<&SnapshotAccount> {
        self.accounts.iter().find(|a| a.id == id)
    }

    fn is_parent(&self, id: &str) -> bool {
        id == self.root_id || self.ou(id).is_some()
    }

    fn parent_ref(&self, parent: &str) -> ParentRef {
        ParentRef {
            id: parent.to_string(),
            kind: if parent == self.root_id {
                ParentKind::Root
            } else {
                ParentKind::OrganizationalUnit
            },
        }
    }
}

fn tags_match(tags: &BTreeMap<String, String>, filter: &TagFilter) -> bool {
    !filter.is_empty()
        && filter.iter().all(|(key, values)| {
            tags.get(key)
                .is_some_and(|value| values.is_empty() || values.contains(value))
        })
}

#[derive(Debug, Clone)]
struct Submission {
    id: String,
    pipeline: String,
}

/// In-memory implementation of every repository
pub struct InMemoryBackend {
    snapshot: OrganizationSnapshot,
    page_size: usize,
    parameters: Mutex<BTreeMap<(String, String), String>>,
    objects: Mutex<BTreeMap<(String, String), PathBuf>>,
    submissions: Mutex<Vec<Submission>>,
    deleted_pipelines: Mutex<Vec<String>>,
    failing_pipelines: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBackend {
    /// Creates a backend serving the given snapshot
    pub fn new(snapshot: OrganizationSnapshot) -> Self {
        let parameters = snapshot
            .parameters
            .iter()
            .flat_map(|(region, values)| {
                values
                    .iter()
                    .map(move |(name, value)| ((region.clone(), name.clone()), value.clone()))
            })
            .collect();

        Self {
            snapshot,
            page_size: 20,
            parameters: Mutex::new(parameters),
            objects: Mutex::new(BTreeMap::new()),
            submissions: Mutex::new(Vec::new()),
            deleted_pipelines: Mutex::new(Vec::new()),
            failing_pipelines: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Reads a snapshot file and creates a backend for it
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot file: {}", path.display()))?;
        let snapshot = OrganizationSnapshot::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse snapshot file: {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    /// Sets the number of items returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes submissions of the named pipeline end in a failed state
    pub fn fail_pipeline(&self, pipeline: &str) {
        lock(&self.failing_pipelines).insert(pipeline.to_string());
    }

    /// Number of calls performed for one operation
    pub fn calls(&self, operation: &str) -> usize {
        lock(&self.calls).get(operation).copied().unwrap_or(0)
    }

    /// Current value of a configuration entry
    pub fn parameter(&self, region: &str, name: &str) -> Option<String> {
        lock(&self.parameters)
            .get(&(region.to_string(), name.to_string()))
            .cloned()
    }

    /// Keys of all stored objects as `bucket/key`
    pub fn object_keys(&self) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .map(|(bucket, key)| format!("{}/{}", bucket, key))
            .collect()
    }

    /// Names of submitted pipelines, in submission order
    pub fn submitted_pipelines(&self) -> Vec<String> {
        lock(&self.submissions)
            .iter()
            .map(|s| s.pipeline.clone())
            .collect()
    }

    /// Names of deleted pipelines, in deletion order
    pub fn deleted_pipelines(&self) -> Vec<String> {
        lock(&self.deleted_pipelines).clone()
    }

    fn record(&self, operation: &'static str) {
        *lock(&self.calls).entry(operation).or_insert(0) += 1;
    }

    fn paginate<T: Clone>(&self, items: Vec<T>, next_token: Option<String>) -> CapabilityResult<Page<T>> {
        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CapabilityError::Remote(format!("invalid next token: {}", token)))?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next_token = (end < items.len()).then(|| end.to_string());
        Ok(Page {
            items: page,
            next_token,
        })
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryBackend {
    async fn root_id(&self) -> CapabilityResult<String> {
        self.record("root_id");
        Ok(self.snapshot.root_id.clone())
    }

    async fn describe_ou(&self, ou_id: &str) -> CapabilityResult<OrganizationalUnit> {
        self.record("describe_ou");
        self.snapshot
            .ou(ou_id)
            .map(|ou| OrganizationalUnit {
                id: ou.id.clone(),
                name: ou.name.clone(),
            })
            .ok_or_else(|| CapabilityError::NotFound(format!("organizational unit {}", ou_id)))
    }

    async fn parent_of(&self, child_id: &str) -> CapabilityResult<ParentRef> {
        self.record("parent_of");
        let parent = self
            .snapshot
            .ou(child_id)
            .map(|ou| ou.parent.as_str())
            .or_else(|| self.snapshot.account(child_id).map(|a| a.parent.as_str()))
            .ok_or_else(|| CapabilityError::NotFound(format!("child {}", child_id)))?;
        Ok(self.snapshot.parent_ref(parent))
    }

    async fn list_child_ous(
        &self,
        parent_id: &str,
        next_token: Option<String>,
    ) -> CapabilityResult<Page<OrganizationalUnit>> {
        self.record("list_child_ous");
        if !self.snapshot.is_parent(parent_id) {
            return Err(CapabilityError::NotFound(format!("parent {}", parent_id)));
        }
        let children = self
            .snapshot
            .organizational_units
            .iter()
            .filter(|ou| ou.parent == parent_id)
            .map(|ou| OrganizationalUnit {
                id: ou.id.clone(),
                name: ou.name.clone(),
            })
            .collect();
        self.paginate(children, next_token)
    }

    async fn list_accounts_for_parent(
        &self,
        parent_id: &str,
        next_token: Option<String>,
    ) -> CapabilityResult<Page<Account>> {
        self.record("list_accounts_for_parent");
        if !self.snapshot.is_parent(parent_id) {
            return Err(CapabilityError::NotFound(format!("parent {}", parent_id)));
        }
        let accounts = self
            .snapshot
            .accounts
            .iter()
            .filter(|a| a.parent == parent_id)
            .map(|a| Account {
                id: a.id.clone(),
                name: a.name.clone(),
                status: a.status,
            })
            .collect();
        self.paginate(accounts, next_token)
    }

    async fn describe_account(&self, account_id: &str) -> CapabilityResult<Account> {
        self.record("describe_account");
        self.snapshot
            .account(account_id)
            .map(|a| Account {
                id: a.id.clone(),
                name: a.name.clone(),
                status: a.status,
            })
            .ok_or_else(|| CapabilityError::NotFound(format!("account {}", account_id)))
    }
}

#[async_trait]
impl AccountTagRepository for InMemoryBackend {
    async fn resources_for_tags(&self, filter: &TagFilter) -> CapabilityResult<Vec<String>> {
        self.record("resources_for_tags");
        let accounts = self
            .snapshot
            .accounts
            .iter()
            .filter(|a| tags_match(&a.tags, filter))
            .map(|a| a.id.clone());
        let ous = self
            .snapshot
            .organizational_units
            .iter()
            .filter(|ou| tags_match(&ou.tags, filter))
            .map(|ou| ou.id.clone());
        Ok(accounts.chain(ous).collect())
    }
}

#[async_trait]
impl CredentialRepository for InMemoryBackend {
    async fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
        session_name: &str,
    ) -> CapabilityResult<CredentialContext> {
        self.record("assume_role");
        if self.snapshot.account(account_id).is_none() {
            return Err(CapabilityError::AccessDenied(format!(
                "cannot assume {} in {}",
                role_name, account_id
            )));
        }
        Ok(CredentialContext {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            session_name: session_name.to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

#[async_trait]
impl ParameterStoreRepository for InMemoryBackend {
    async fn get(&self, region: &str, name: &str) -> CapabilityResult<String> {
        self.record("get_parameter");
        self.parameter(region, name)
            .ok_or_else(|| CapabilityError::NotFound(format!("parameter {} in {}", name, region)))
    }

    async fn put(&self, region: &str, name: &str, value: &str) -> CapabilityResult<()> {
        self.record("put_parameter");
        lock(&self.parameters).insert((region.to_string(), name.to_string()), value.to_string());
        Ok(())
    }

    async fn list_by_path(&self, region: &str, path: &str) -> CapabilityResult<Vec<String>> {
        self.record("list_parameters");
        Ok(lock(&self.parameters)
            .keys()
            .filter(|(r, name)| r == region && name.starts_with(path))
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn delete(&self, region: &str, name: &str) -> CapabilityResult<()> {
        self.record("delete_parameter");
        lock(&self.parameters)
            .remove(&(region.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| CapabilityError::NotFound(format!("parameter {} in {}", name, region)))
    }
}

#[async_trait]
impl StackOutputRepository for InMemoryBackend {
    async fn get_output(
        &self,
        credentials: &CredentialContext,
        region: &str,
        stack_name: &str,
        output_key: &str,
    ) -> CapabilityResult<String> {
        self.record("get_stack_output");
        let stack = self
            .snapshot
            .stack_outputs
            .iter()
            .find(|s| {
                s.account_id == credentials.account_id
                    && s.region == region
                    && s.stack_name == stack_name
            })
            .ok_or_else(|| {
                CapabilityError::NotFound(format!(
                    "stack {} in {} ({})",
                    stack_name, credentials.account_id, region
                ))
            })?;
        stack.outputs.get(output_key).cloned().ok_or_else(|| {
            CapabilityError::NotFound(format!("output {} of stack {}", output_key, stack_name))
        })
    }
}

#[async_trait]
impl BlobRepository for InMemoryBackend {
    async fn object_exists(
        &self,
        _region: &str,
        bucket: &str,
        key: &str,
    ) -> CapabilityResult<bool> {
        self.record("object_exists");
        Ok(lock(&self.objects).contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn put_object(
        &self,
        _region: &str,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> CapabilityResult<()> {
        self.record("put_object");
        if !local_path.is_file() {
            return Err(CapabilityError::NotFound(format!(
                "local file {}",
                local_path.display()
            )));
        }
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), local_path.to_path_buf());
        Ok(())
    }
}

#[async_trait]
impl PipelineExecutorRepository for InMemoryBackend {
    async fn submit(&self, plan: &PipelinePlan) -> CapabilityResult<String> {
        self.record("submit");
        let mut submissions = lock(&self.submissions);
        let id = format!("{}-{}", plan.name, submissions.len() + 1);
        submissions.push(Submission {
            id: id.clone(),
            pipeline: plan.name.clone(),
        });
        Ok(id)
    }

    async fn status(&self, submission_id: &str) -> CapabilityResult<SubmissionStatus> {
        self.record("status");
        let pipeline = lock(&self.submissions)
            .iter()
            .find(|s| s.id == submission_id)
            .map(|s| s.pipeline.clone())
            .ok_or_else(|| CapabilityError::NotFound(format!("submission {}", submission_id)))?;

        if lock(&self.failing_pipelines).contains(&pipeline) {
            Ok(SubmissionStatus::Failed(format!("stack creation failed for {}", pipeline)))
        } else {
            Ok(SubmissionStatus::Succeeded)
        }
    }

    async fn delete(&self, pipeline: &str) -> CapabilityResult<()> {
        self.record("delete_pipeline");
        lock(&self.deleted_pipelines).push(pipeline.to_string());
        Ok(())
    }
}
