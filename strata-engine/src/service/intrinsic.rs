//! Intrinsic evaluation
//!
//! Evaluates the `resolve:`, `import:` and `upload:` references embedded in
//! parameter and tag values. Every lookup goes through the run cache, so a
//! key is fetched at most once per run no matter how many documents use it.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use strata_core::domain::intrinsic::{IMPORT_PREFIX, IntrinsicExpr, UploadStyle};
use strata_core::{EngineError, Result};

use super::cache::{CachedValue, RunCache};
use crate::repository::{
    BlobRepository, CredentialRepository, ParameterStoreRepository, StackOutputRepository,
};

/// Prefix of every object key written by `upload:` references
pub const UPLOAD_KEY_PREFIX: &str = "uploads";

/// Configuration entry holding the regional bucket name, per region
pub const REGIONAL_BUCKET_PARAM: &str = "/cross_region/s3_regional_bucket";

/// Session name used when assuming the read-only role for imports
const IMPORT_SESSION: &str = "strata-importer";

type BoxedResult<'a> = Pin<Box<dyn Future<Output = Result<JsonValue>> + Send + 'a>>;

/// Random six character token shared by the uploads of one run
pub fn run_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Evaluator for intrinsic references
pub struct IntrinsicResolver {
    cache: Arc<RunCache>,
    parameter_store: Arc<dyn ParameterStoreRepository>,
    stack_outputs: Arc<dyn StackOutputRepository>,
    credentials: Arc<dyn CredentialRepository>,
    blobs: Arc<dyn BlobRepository>,
    home_region: String,
    readonly_role: String,
    upload_root: PathBuf,
    run_token: String,
}

impl IntrinsicResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    /// * `home_region` - Region used by references that name none
    pub fn new(
        cache: Arc<RunCache>,
        parameter_store: Arc<dyn ParameterStoreRepository>,
        stack_outputs: Arc<dyn StackOutputRepository>,
        credentials: Arc<dyn CredentialRepository>,
        blobs: Arc<dyn BlobRepository>,
        home_region: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            parameter_store,
            stack_outputs,
            credentials,
            blobs,
            home_region: home_region.into(),
            readonly_role: crate::config::DEFAULT_READONLY_ROLE.to_string(),
            upload_root: PathBuf::from("."),
            run_token: run_token(),
        }
    }

    /// Role assumed in the target account of `import:` references
    pub fn with_readonly_role(mut self, role: impl Into<String>) -> Self {
        self.readonly_role = role.into();
        self
    }

    /// Directory `upload:` object keys are relative to
    pub fn with_upload_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.upload_root = root.into();
        self
    }

    pub fn with_run_token(mut self, token: impl Into<String>) -> Self {
        self.run_token = token.into();
        self
    }

    /// Evaluates every string leaf of a value
    ///
    /// Arrays and objects are walked; strings without a known prefix and all
    /// other scalars are returned unchanged.
    pub fn resolve_value<'a>(&'a self, value: &'a JsonValue) -> BoxedResult<'a> {
        Box::pin(async move {
            match value {
                JsonValue::String(text) => match IntrinsicExpr::parse(text)? {
                    Some(expr) => Ok(JsonValue::String(self.evaluate(text, &expr).await?)),
                    None => Ok(value.clone()),
                },
                JsonValue::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item).await?);
                    }
                    Ok(JsonValue::Array(resolved))
                }
                JsonValue::Object(map) => {
                    let mut resolved = serde_json::Map::with_capacity(map.len());
                    for (key, item) in map {
                        resolved.insert(key.clone(), self.resolve_value(item).await?);
                    }
                    Ok(JsonValue::Object(resolved))
                }
                other => Ok(other.clone()),
            }
        })
    }

    /// Evaluates one parsed reference to its textual value
    pub async fn evaluate(&self, raw: &str, expr: &IntrinsicExpr) -> Result<String> {
        match expr {
            IntrinsicExpr::ParamStore {
                region,
                path,
                optional,
            } => {
                let region = region.as_deref().unwrap_or(&self.home_region);
                self.parameter(region, path, *optional).await
            }
            IntrinsicExpr::StackOutput {
                account_id,
                region,
                stack_name,
                output_key,
                optional,
            } => {
                match self
                    .stack_output(account_id, region, stack_name, output_key)
                    .await
                {
                    Ok(value) => Ok(value),
                    Err(e) if *optional => {
                        warn!("Optional import {} could not be resolved: {}", raw, e);
                        Ok(String::new())
                    }
                    Err(e) => Err(e),
                }
            }
            IntrinsicExpr::Upload {
                region,
                style,
                object_key,
            } => {
                let region = region.as_deref().unwrap_or(&self.home_region);
                self.upload(region, *style, object_key).await
            }
        }
    }

    async fn parameter(&self, region: &str, path: &str, optional: bool) -> Result<String> {
        let key = format!("{}/{}", region, path);
        let value = self
            .cache
            .get_or_try_fetch(&key, || async {
                match self.parameter_store.get(region, path).await {
                    Ok(value) => Ok(CachedValue::Found(value)),
                    Err(e) if e.is_not_found() => Ok(CachedValue::Missing),
                    Err(e) => Err(EngineError::from(e)),
                }
            })
            .await?;

        match value {
            CachedValue::Found(value) => Ok(value),
            CachedValue::Missing if optional => {
                warn!(
                    "Optional parameter {} not found in {}, using an empty value",
                    path, region
                );
                Ok(String::new())
            }
            CachedValue::Missing => Err(EngineError::NotFound(format!(
                "parameter {} in {}",
                path, region
            ))),
        }
    }

    async fn stack_output(
        &self,
        account_id: &str,
        region: &str,
        stack_name: &str,
        output_key: &str,
    ) -> Result<String> {
        let key = format!(
            "{}{}:{}:{}:{}",
            IMPORT_PREFIX, account_id, region, stack_name, output_key
        );
        let value = self
            .cache
            .get_or_try_fetch(&key, || async {
                let credentials = self
                    .credentials
                    .assume_role(account_id, &self.readonly_role, IMPORT_SESSION)
                    .await?;
                match self
                    .stack_outputs
                    .get_output(&credentials, region, stack_name, output_key)
                    .await
                {
                    Ok(value) => Ok(CachedValue::Found(value)),
                    Err(e) if e.is_not_found() => Ok(CachedValue::Missing),
                    Err(e) => Err(EngineError::from(e)),
                }
            })
            .await?;

        match value {
            CachedValue::Found(value) => Ok(value),
            CachedValue::Missing => Err(EngineError::NotFound(format!(
                "output {} of stack {} in {} ({})",
                output_key, stack_name, account_id, region
            ))),
        }
    }

    async fn upload(&self, region: &str, style: UploadStyle, object_key: &str) -> Result<String> {
        let local_path = self.upload_root.join(object_key);
        let key = format!("upload:{}:{}@{}", region, style, local_path.display());

        let value = self
            .cache
            .get_or_try_fetch(&key, || async {
                let bucket = self.regional_bucket(region).await?;
                let object = format!("{}/{}/{}", UPLOAD_KEY_PREFIX, object_key, self.run_token);
                self.put_once(region, &bucket, &object, &local_path).await?;
                Ok::<_, EngineError>(CachedValue::Found(style.render(&bucket, region, &object)))
            })
            .await?;

        match value {
            CachedValue::Found(rendered) => Ok(rendered),
            CachedValue::Missing => Err(EngineError::NotFound(format!(
                "upload of {}",
                local_path.display()
            ))),
        }
    }

    async fn regional_bucket(&self, region: &str) -> Result<String> {
        let path = format!("{}/{}", REGIONAL_BUCKET_PARAM, region);
        match self.parameter(&self.home_region, &path, false).await {
            Ok(bucket) => Ok(bucket),
            Err(e) if e.is_not_found() => Err(EngineError::Configuration(format!(
                "no upload bucket configured for {} ({} in {})",
                region, path, self.home_region
            ))),
            Err(e) => Err(e),
        }
    }

    async fn put_once(&self, region: &str, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        if self.blobs.object_exists(region, bucket, key).await? {
            debug!("Object {}/{} already exists", bucket, key);
            return Ok(());
        }
        self.blobs.put_object(region, bucket, key, local_path).await?;
        info!("Uploaded {} to {}/{}", local_path.display(), bucket, key);
        Ok(())
    }
}
