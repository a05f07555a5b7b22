//! Configuration store repository
//!
//! Region-scoped named values:
//! - Reading values looked up by `resolve:` references
//! - Writing deployment bookkeeping
//! - Listing and deleting stale entries

use async_trait::async_trait;

use super::CapabilityResult;

/// Repository trait for the configuration store
#[async_trait]
pub trait ParameterStoreRepository: Send + Sync {
    /// Reads a value, failing with `NotFound` when it does not exist
    async fn get(&self, region: &str, name: &str) -> CapabilityResult<String>;

    /// Creates or overwrites a value
    async fn put(&self, region: &str, name: &str, value: &str) -> CapabilityResult<()>;

    /// Lists the names of all values below a path prefix
    async fn list_by_path(&self, region: &str, path: &str) -> CapabilityResult<Vec<String>>;

    /// Deletes a value; deleting a missing value fails with `NotFound`
    async fn delete(&self, region: &str, name: &str) -> CapabilityResult<()>;
}
