//! Target resolver
//!
//! Expands one classified target expression into the active accounts it
//! addresses. OU and path expansions go through the
//! [`OrganizationNavigator`]; tag expansions go through the account tag
//! index.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use strata_core::domain::account::{Account, AccountDescriptor};
use strata_core::domain::target::{TagFilter, TargetExpr};
use strata_core::{EngineError, Result};

use super::organization::OrganizationNavigator;
use crate::repository::AccountTagRepository;

/// Per-group settings applied to every expanded account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetScope {
    /// Regions every produced descriptor deploys to
    pub regions: Vec<String>,
    /// Account ids dropped from the expansion
    pub exclude: Vec<String>,
}

impl TargetScope {
    pub fn new(regions: Vec<String>) -> Self {
        Self {
            regions,
            exclude: Vec::new(),
        }
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }
}

/// Service turning target expressions into account descriptors
pub struct TargetResolver {
    navigator: Arc<OrganizationNavigator>,
    tags: Arc<dyn AccountTagRepository>,
    allow_empty_target: bool,
}

impl TargetResolver {
    /// Creates a resolver
    ///
    /// With `allow_empty_target`, expansions yielding no account (including
    /// unknown accounts and OUs) produce an empty result instead of failing.
    pub fn new(
        navigator: Arc<OrganizationNavigator>,
        tags: Arc<dyn AccountTagRepository>,
        allow_empty_target: bool,
    ) -> Self {
        Self {
            navigator,
            tags,
            allow_empty_target,
        }
    }

    /// Resolves one expression
    ///
    /// `Approval` yields the approval sentinel and `RegionOnly` yields
    /// nothing. Every other kind yields the active, non-excluded accounts it
    /// addresses, in listing order; an empty result is `NoAccountsFound`.
    pub async fn resolve(
        &self,
        expr: &TargetExpr,
        scope: &TargetScope,
    ) -> Result<Vec<AccountDescriptor>> {
        let accounts = match expr {
            TargetExpr::Approval => return Ok(vec![AccountDescriptor::approval()]),
            TargetExpr::RegionOnly => return Ok(Vec::new()),
            _ => match self.expand(expr).await {
                Ok(accounts) => accounts,
                Err(e) if self.allow_empty_target && tolerated(&e) => {
                    info!("Target {} could not be expanded, skipping: {}", expr, e);
                    Vec::new()
                }
                Err(e) => return Err(e),
            },
        };

        let mut seen = HashSet::new();
        let descriptors: Vec<AccountDescriptor> = accounts
            .into_iter()
            .filter(|account| account.is_active())
            .filter(|account| !scope.exclude.contains(&account.id))
            .filter(|account| seen.insert(account.id.clone()))
            .map(|account| {
                AccountDescriptor::new(
                    account.id,
                    &account.name,
                    expr.clone(),
                    scope.regions.clone(),
                    account.status,
                )
            })
            .collect();

        if descriptors.is_empty() {
            if self.allow_empty_target {
                info!("Target {} resolved to no active accounts, allowed", expr);
                return Ok(descriptors);
            }
            return Err(EngineError::NoAccountsFound(expr.to_string()));
        }

        debug!("Target {} resolved to {} account(s)", expr, descriptors.len());
        Ok(descriptors)
    }

    async fn expand(&self, expr: &TargetExpr) -> Result<Vec<Account>> {
        match expr {
            TargetExpr::AccountId(id) => Ok(vec![self.navigator.describe_account(id).await?]),
            TargetExpr::OuId(id) => self.navigator.accounts_in_ou(id, false).await,
            TargetExpr::OuPath { path, recursive } => {
                self.navigator.accounts_in_path(path, *recursive).await
            }
            TargetExpr::Tags(filter) => self.expand_tags(filter).await,
            TargetExpr::Approval | TargetExpr::RegionOnly => Ok(Vec::new()),
        }
    }

    /// Tag matches may name accounts or OUs; OUs contribute their direct
    /// accounts
    async fn expand_tags(&self, filter: &TagFilter) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        for id in self.tags.resources_for_tags(filter).await? {
            if id.starts_with("ou-") {
                accounts.extend(self.navigator.accounts_under(&id).await?);
            } else {
                accounts.push(self.navigator.describe_account(&id).await?);
            }
        }
        Ok(accounts)
    }
}

fn tolerated(error: &EngineError) -> bool {
    error.is_not_found() || matches!(error, EngineError::OuPathNotFound { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryBackend, OrganizationSnapshot};
    use crate::service::cache::RunCache;
    use std::collections::BTreeMap;
    use strata_core::domain::account::AccountStatus;

    const SNAPSHOT: &str = r#"
root_id: r-1
organizational_units:
  - { id: ou-bank, name: banking, parent: r-1 }
  - { id: ou-prod, name: prod, parent: ou-bank, tags: { team: payments } }
  - { id: ou-frozen, name: frozen, parent: r-1 }
accounts:
  - { id: "111111111111", name: "Prod One", parent: ou-prod }
  - { id: "222222222222", name: prod-two, parent: ou-prod }
  - { id: "333333333333", name: old, parent: ou-frozen, status: SUSPENDED }
  - { id: "444444444444", name: shared, parent: ou-bank, tags: { team: payments } }
"#;

    fn setup(allow_empty: bool) -> (Arc<InMemoryBackend>, TargetResolver) {
        let backend = Arc::new(InMemoryBackend::new(
            OrganizationSnapshot::from_yaml_str(SNAPSHOT).unwrap(),
        ));
        let navigator = Arc::new(OrganizationNavigator::new(
            backend.clone(),
            Arc::new(RunCache::new()),
            32,
        ));
        let resolver = TargetResolver::new(navigator, backend.clone(), allow_empty);
        (backend, resolver)
    }

    fn scope() -> TargetScope {
        TargetScope::new(vec!["eu-west-1".to_string()])
    }

    fn ids(descriptors: &[AccountDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_resolve_account_id() {
        let (_, resolver) = setup(false);
        let expr = TargetExpr::classify("111111111111").unwrap();
        let result = resolver.resolve(&expr, &scope()).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "ProdOne");
        assert_eq!(result[0].regions, vec!["eu-west-1"]);
        assert_eq!(result[0].source, expr);
        assert_eq!(result[0].status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_resolve_ou_id_and_path() {
        let (_, resolver) = setup(false);
        let by_id = resolver
            .resolve(&TargetExpr::OuId("ou-prod".to_string()), &scope())
            .await
            .unwrap();
        let by_path = resolver
            .resolve(&TargetExpr::classify("/banking/prod").unwrap(), &scope())
            .await
            .unwrap();

        assert_eq!(ids(&by_id), vec!["111111111111", "222222222222"]);
        assert_eq!(ids(&by_path), ids(&by_id));
    }

    #[tokio::test]
    async fn test_resolve_recursive_path() {
        let (_, resolver) = setup(false);
        let result = resolver
            .resolve(&TargetExpr::classify("/banking/**/*").unwrap(), &scope())
            .await
            .unwrap();
        assert_eq!(
            ids(&result),
            vec!["444444444444", "111111111111", "222222222222"]
        );
    }

    #[tokio::test]
    async fn test_suspended_only_ou_has_no_accounts() {
        let (_, resolver) = setup(false);
        let result = resolver
            .resolve(&TargetExpr::OuId("ou-frozen".to_string()), &scope())
            .await;
        assert!(matches!(result, Err(EngineError::NoAccountsFound(_))));
    }

    #[tokio::test]
    async fn test_allow_empty_target() {
        let (_, resolver) = setup(true);
        let frozen = resolver
            .resolve(&TargetExpr::OuId("ou-frozen".to_string()), &scope())
            .await
            .unwrap();
        let missing = resolver
            .resolve(&TargetExpr::classify("/banking/qa").unwrap(), &scope())
            .await
            .unwrap();
        assert!(frozen.is_empty());
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_tags() {
        let (backend, resolver) = setup(false);
        let filter: TagFilter =
            BTreeMap::from([("team".to_string(), vec!["payments".to_string()])]);
        let result = resolver
            .resolve(&TargetExpr::Tags(filter), &scope())
            .await
            .unwrap();

        assert_eq!(
            ids(&result),
            vec!["444444444444", "111111111111", "222222222222"]
        );
        assert_eq!(backend.calls("resources_for_tags"), 1);
    }

    #[tokio::test]
    async fn test_exclude_and_sentinels() {
        let (_, resolver) = setup(false);
        let scope = scope().with_exclude(vec!["111111111111".to_string()]);
        let result = resolver
            .resolve(&TargetExpr::OuId("ou-prod".to_string()), &scope)
            .await
            .unwrap();
        assert_eq!(ids(&result), vec!["222222222222"]);

        let approval = resolver.resolve(&TargetExpr::Approval, &scope).await.unwrap();
        assert!(approval[0].is_approval());
        let regions_only = resolver.resolve(&TargetExpr::RegionOnly, &scope).await.unwrap();
        assert!(regions_only.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_path_resolution_reuses_names() {
        let (backend, resolver) = setup(false);
        let expr = TargetExpr::classify("/banking/prod").unwrap();
        resolver.resolve(&expr, &scope()).await.unwrap();
        resolver.resolve(&expr, &scope()).await.unwrap();
        assert_eq!(backend.calls("describe_ou"), 0);
        assert_eq!(backend.calls("root_id"), 1);
    }
}
