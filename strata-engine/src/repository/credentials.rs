//! Credential repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CapabilityResult;

/// Scoped credentials for calls into another account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialContext {
    pub account_id: String,
    pub role_name: String,
    pub session_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Repository trait for obtaining cross-account credentials
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Assumes `role_name` in `account_id`
    ///
    /// # Arguments
    /// * `account_id` - Account owning the role
    /// * `role_name` - Role to assume
    /// * `session_name` - Session label recorded by the identity service
    async fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
        session_name: &str,
    ) -> CapabilityResult<CredentialContext>;
}
