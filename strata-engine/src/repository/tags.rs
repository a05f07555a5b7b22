//! Account tag repository

use async_trait::async_trait;
use strata_core::domain::target::TagFilter;

use super::CapabilityResult;

/// Index of tagged organization resources
#[async_trait]
pub trait AccountTagRepository: Send + Sync {
    /// Returns ids of the accounts and OUs matching every key of `filter`
    ///
    /// A resource matches a key when its tag value is one of the listed
    /// values. OU ids are returned as is (`ou-` prefix) so the caller can
    /// expand them.
    async fn resources_for_tags(&self, filter: &TagFilter) -> CapabilityResult<Vec<String>>;
}
