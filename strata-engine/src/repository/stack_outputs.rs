//! Stack output repository

use async_trait::async_trait;

use super::{CapabilityResult, CredentialContext};

/// Repository trait for reading outputs of deployed stacks
#[async_trait]
pub trait StackOutputRepository: Send + Sync {
    /// Reads one output of a stack in the credentials' account
    ///
    /// Fails with `NotFound` when the stack or the output key does not exist.
    async fn get_output(
        &self,
        credentials: &CredentialContext,
        region: &str,
        stack_name: &str,
        output_key: &str,
    ) -> CapabilityResult<String>;
}
