//! Backend bundle
//!
//! Groups one handle per capability so services can be wired from a single
//! value.

use std::sync::Arc;

use super::{
    AccountTagRepository, BlobRepository, CredentialRepository, InMemoryBackend,
    OrganizationRepository, ParameterStoreRepository, PipelineExecutorRepository,
    StackOutputRepository,
};

/// Every capability the engine consumes
#[derive(Clone)]
pub struct Backends {
    pub organization: Arc<dyn OrganizationRepository>,
    pub tags: Arc<dyn AccountTagRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub parameter_store: Arc<dyn ParameterStoreRepository>,
    pub stack_outputs: Arc<dyn StackOutputRepository>,
    pub blobs: Arc<dyn BlobRepository>,
    pub executor: Arc<dyn PipelineExecutorRepository>,
}

impl Backends {
    /// Serves every capability from one in-memory backend
    pub fn in_memory(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            organization: backend.clone(),
            tags: backend.clone(),
            credentials: backend.clone(),
            parameter_store: backend.clone(),
            stack_outputs: backend.clone(),
            blobs: backend.clone(),
            executor: backend,
        }
    }
}
