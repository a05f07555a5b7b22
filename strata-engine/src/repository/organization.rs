//! Organization repository
//!
//! Read access to the organization tree:
//! - Root lookup
//! - OU and account descriptions
//! - Parent links
//! - Paginated child listings

use async_trait::async_trait;
use strata_core::domain::account::Account;
use strata_core::domain::organization::{OrganizationalUnit, Page, ParentRef};

use super::CapabilityResult;

/// Repository trait for reading the organization hierarchy
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Returns the id of the organization root
    async fn root_id(&self) -> CapabilityResult<String>;

    /// Describes an organizational unit
    ///
    /// Fails with `NotFound` for unknown ids, including the root id.
    async fn describe_ou(&self, ou_id: &str) -> CapabilityResult<OrganizationalUnit>;

    /// Returns the parent of an OU or account
    async fn parent_of(&self, child_id: &str) -> CapabilityResult<ParentRef>;

    /// Lists one page of OUs directly under a parent
    ///
    /// # Arguments
    /// * `parent_id` - Root or OU id
    /// * `next_token` - Continuation token of the previous page
    async fn list_child_ous(
        &self,
        parent_id: &str,
        next_token: Option<String>,
    ) -> CapabilityResult<Page<OrganizationalUnit>>;

    /// Lists one page of accounts directly under a parent
    ///
    /// # Arguments
    /// * `parent_id` - Root or OU id
    /// * `next_token` - Continuation token of the previous page
    async fn list_accounts_for_parent(
        &self,
        parent_id: &str,
        next_token: Option<String>,
    ) -> CapabilityResult<Page<Account>>;

    /// Describes a single account
    async fn describe_account(&self, account_id: &str) -> CapabilityResult<Account>;
}
