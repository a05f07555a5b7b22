//! Organization navigator
//!
//! Walks the organization tree on behalf of target resolution: OU names
//! (memoized in the run cache), paginated child listings, root-to-leaf
//! paths and name-path lookups. Listings are never cached since they may
//! change between calls; only names by id are.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use strata_core::domain::account::Account;
use strata_core::domain::organization::{OrganizationalUnit, ROOT};
use strata_core::{EngineError, Result};

use super::cache::{CachedValue, RunCache};
use crate::repository::OrganizationRepository;

/// Read-through navigator over the organization repository
pub struct OrganizationNavigator {
    organization: Arc<dyn OrganizationRepository>,
    cache: Arc<RunCache>,
    max_depth: usize,
    root_id: OnceCell<String>,
}

impl OrganizationNavigator {
    /// Creates a navigator
    ///
    /// # Arguments
    /// * `organization` - Organization read capability
    /// * `cache` - Run cache memoizing OU names
    /// * `max_depth` - Bound on parent-link walks and recursive expansion
    pub fn new(
        organization: Arc<dyn OrganizationRepository>,
        cache: Arc<RunCache>,
        max_depth: usize,
    ) -> Self {
        Self {
            organization,
            cache,
            max_depth,
            root_id: OnceCell::new(),
        }
    }

    /// Id of the organization root, looked up once per navigator
    pub async fn root_id(&self) -> Result<String> {
        let root = self
            .root_id
            .get_or_try_init(|| async { Ok::<_, EngineError>(self.organization.root_id().await?) })
            .await?;
        Ok(root.clone())
    }

    /// Name of an OU
    ///
    /// The root is answered with the `ROOT` sentinel without a remote call.
    /// Other ids are described once per run and then served from the cache.
    pub async fn name_of(&self, ou_id: &str) -> Result<String> {
        if ou_id == self.root_id().await? {
            return Ok(ROOT.to_string());
        }

        let value = self
            .cache
            .get_or_try_fetch(ou_id, || async {
                let ou = self.organization.describe_ou(ou_id).await?;
                Ok::<_, EngineError>(CachedValue::Found(ou.name))
            })
            .await?;

        match value {
            CachedValue::Found(name) => Ok(name),
            CachedValue::Missing => Err(EngineError::NotFound(format!("organizational unit {}", ou_id))),
        }
    }

    /// All OUs directly under a parent, following pagination
    pub async fn child_ous(&self, parent_id: &str) -> Result<Vec<OrganizationalUnit>> {
        let mut children = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .organization
                .list_child_ous(parent_id, next_token)
                .await?;
            children.extend(page.items);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(children)
    }

    /// All accounts directly under a parent, following pagination
    pub async fn accounts_under(&self, parent_id: &str) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .organization
                .list_accounts_for_parent(parent_id, next_token)
                .await?;
            accounts.extend(page.items);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(accounts)
    }

    /// Path of the OUs above `id`, from the root down
    ///
    /// Returns `/a/b` for a node whose ancestors are `a` then `b`, and `ROOT`
    /// for a node directly under the root. Fails with `HierarchyTooDeep`
    /// when the walk does not reach the root within the configured depth,
    /// which also turns cyclic parent data into an error.
    pub async fn path_of(&self, id: &str) -> Result<String> {
        let mut segments = Vec::new();
        let mut current = id.to_string();

        loop {
            let parent = self.organization.parent_of(&current).await?;
            if parent.is_root() {
                break;
            }
            if segments.len() >= self.max_depth {
                return Err(EngineError::HierarchyTooDeep {
                    id: id.to_string(),
                    max: self.max_depth,
                });
            }
            segments.push(self.name_of(&parent.id).await?);
            current = parent.id;
        }

        if segments.is_empty() {
            return Ok(ROOT.to_string());
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Id of the OU addressed by a name path such as `/banking/prod`
    ///
    /// Empty segments are ignored, so `/` is the root itself.
    pub async fn resolve_ou_path(&self, path: &str) -> Result<String> {
        let mut current = self.root_id().await?;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let children = self.child_ous(&current).await?;
            let Some(child) = children.iter().find(|ou| ou.name == segment) else {
                return Err(EngineError::OuPathNotFound {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    siblings: children.into_iter().map(|ou| ou.name).collect(),
                });
            };
            if !self.cache.exists(&child.id) {
                self.cache
                    .add(child.id.clone(), CachedValue::Found(child.name.clone()));
            }
            current = child.id.clone();
        }

        debug!("Resolved OU path {} to {}", path, current);
        Ok(current)
    }

    /// Accounts under an OU, optionally including every descendant OU
    ///
    /// Accounts are returned in pre-order: the OU's own accounts, then each
    /// child OU's subtree in listing order.
    pub async fn accounts_in_ou(&self, ou_id: &str, recursive: bool) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        let mut pending = vec![(ou_id.to_string(), 0usize)];

        while let Some((current, depth)) = pending.pop() {
            if depth > self.max_depth {
                return Err(EngineError::HierarchyTooDeep {
                    id: ou_id.to_string(),
                    max: self.max_depth,
                });
            }

            accounts.extend(self.accounts_under(&current).await?);

            if recursive {
                let children = self.child_ous(&current).await?;
                pending.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|child| (child.id, depth + 1)),
                );
            }
        }

        Ok(accounts)
    }

    /// Accounts under the OU addressed by a name path
    pub async fn accounts_in_path(&self, path: &str, recursive: bool) -> Result<Vec<Account>> {
        let ou_id = self.resolve_ou_path(path).await?;
        if recursive {
            info!("Resolving OUs for {} ({})", path, ou_id);
        }
        self.accounts_in_ou(&ou_id, recursive).await
    }

    /// Describes a single account
    pub async fn describe_account(&self, account_id: &str) -> Result<Account> {
        Ok(self.organization.describe_account(account_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryBackend, OrganizationSnapshot};

    const SNAPSHOT: &str = r#"
root_id: r-1
organizational_units:
  - { id: ou-bank, name: banking, parent: r-1 }
  - { id: ou-prod, name: prod, parent: ou-bank }
  - { id: ou-eu, name: eu, parent: ou-prod }
  - { id: ou-dev, name: dev, parent: ou-bank }
  - { id: ou-loop-a, name: a, parent: ou-loop-b }
  - { id: ou-loop-b, name: b, parent: ou-loop-a }
accounts:
  - { id: "100000000000", name: top, parent: r-1 }
  - { id: "111111111111", name: prod-1, parent: ou-prod }
  - { id: "222222222222", name: prod-eu, parent: ou-eu }
  - { id: "333333333333", name: dev-1, parent: ou-dev }
  - { id: "444444444444", name: loop, parent: ou-loop-a }
"#;

    fn setup() -> (Arc<InMemoryBackend>, OrganizationNavigator) {
        let backend = Arc::new(
            InMemoryBackend::new(OrganizationSnapshot::from_yaml_str(SNAPSHOT).unwrap())
                .with_page_size(1),
        );
        let navigator =
            OrganizationNavigator::new(backend.clone(), Arc::new(RunCache::new()), 8);
        (backend, navigator)
    }

    #[tokio::test]
    async fn test_name_of_is_memoized() {
        let (backend, navigator) = setup();
        assert_eq!(navigator.name_of("ou-prod").await.unwrap(), "prod");
        assert_eq!(navigator.name_of("ou-prod").await.unwrap(), "prod");
        assert_eq!(backend.calls("describe_ou"), 1);
    }

    #[tokio::test]
    async fn test_name_of_root_returns_sentinel() {
        let (backend, navigator) = setup();
        assert_eq!(navigator.name_of("r-1").await.unwrap(), ROOT);
        assert_eq!(backend.calls("describe_ou"), 0);
    }

    #[tokio::test]
    async fn test_name_of_unknown_is_retried() {
        let (backend, navigator) = setup();
        assert!(navigator.name_of("ou-none").await.is_err());
        assert!(navigator.name_of("ou-none").await.is_err());
        assert_eq!(backend.calls("describe_ou"), 2);
    }

    #[tokio::test]
    async fn test_path_of() {
        let (_, navigator) = setup();
        assert_eq!(navigator.path_of("222222222222").await.unwrap(), "/banking/prod/eu");
        assert_eq!(navigator.path_of("111111111111").await.unwrap(), "/banking/prod");
        assert_eq!(navigator.path_of("ou-eu").await.unwrap(), "/banking/prod");
        assert_eq!(navigator.path_of("100000000000").await.unwrap(), ROOT);
        assert_eq!(navigator.path_of("ou-bank").await.unwrap(), ROOT);
    }

    #[tokio::test]
    async fn test_path_of_cycle_is_bounded() {
        let (_, navigator) = setup();
        assert!(matches!(
            navigator.path_of("444444444444").await,
            Err(EngineError::HierarchyTooDeep { max: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_path_lookups_share_the_name_cache() {
        let (backend, navigator) = setup();
        navigator.path_of("222222222222").await.unwrap();
        navigator.path_of("111111111111").await.unwrap();
        assert_eq!(backend.calls("describe_ou"), 3);
    }

    #[tokio::test]
    async fn test_resolve_ou_path() {
        let (_, navigator) = setup();
        assert_eq!(navigator.resolve_ou_path("/banking/prod").await.unwrap(), "ou-prod");
        assert_eq!(navigator.resolve_ou_path("/banking/prod/").await.unwrap(), "ou-prod");
        assert_eq!(navigator.resolve_ou_path("/").await.unwrap(), "r-1");
    }

    #[tokio::test]
    async fn test_resolve_ou_path_reports_siblings() {
        let (_, navigator) = setup();
        match navigator.resolve_ou_path("/banking/qa").await {
            Err(EngineError::OuPathNotFound {
                segment, siblings, ..
            }) => {
                assert_eq!(segment, "qa");
                assert_eq!(siblings, vec!["prod", "dev"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolved_names_are_cached() {
        let (backend, navigator) = setup();
        navigator.resolve_ou_path("/banking/prod").await.unwrap();
        assert_eq!(navigator.name_of("ou-prod").await.unwrap(), "prod");
        assert_eq!(backend.calls("describe_ou"), 0);
    }

    #[tokio::test]
    async fn test_accounts_in_path() {
        let (_, navigator) = setup();

        let direct = navigator.accounts_in_path("/banking/prod", false).await.unwrap();
        let ids: Vec<&str> = direct.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["111111111111"]);

        let all = navigator.accounts_in_path("/banking", true).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["111111111111", "222222222222", "333333333333"]);
    }
}
