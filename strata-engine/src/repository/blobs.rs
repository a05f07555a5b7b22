//! Blob storage repository

use async_trait::async_trait;
use std::path::Path;

use super::CapabilityResult;

/// Repository trait for object storage
#[async_trait]
pub trait BlobRepository: Send + Sync {
    /// Checks whether an object exists
    async fn object_exists(
        &self,
        region: &str,
        bucket: &str,
        key: &str,
    ) -> CapabilityResult<bool>;

    /// Uploads a local file as an object
    ///
    /// # Arguments
    /// * `region` - Region of the bucket
    /// * `bucket` - Bucket name
    /// * `key` - Object key
    /// * `local_path` - File to upload
    async fn put_object(
        &self,
        region: &str,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> CapabilityResult<()>;
}
