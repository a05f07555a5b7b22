//! Repository layer
//!
//! Repositories are the capability interfaces the engine consumes: the
//! organization tree, the tag index, credentials, the configuration store,
//! stack outputs, blob storage and the pipeline executor. They carry no
//! resolution logic; retries and backoff belong to the implementations.
//!
//! All repositories are trait-based to enable testing and alternative
//! backends. [`InMemoryBackend`] implements every one of them from an
//! organization snapshot.

mod backends;
mod blobs;
mod credentials;
mod executor;
mod memory;
mod organization;
mod parameter_store;
mod stack_outputs;
mod tags;

use strata_core::CapabilityError;

/// Result type alias for capability calls
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

// Re-export traits
pub use blobs::BlobRepository;
pub use credentials::CredentialRepository;
pub use executor::PipelineExecutorRepository;
pub use organization::OrganizationRepository;
pub use parameter_store::ParameterStoreRepository;
pub use stack_outputs::StackOutputRepository;
pub use tags::AccountTagRepository;

// Re-export value types
pub use backends::Backends;
pub use credentials::CredentialContext;
pub use executor::SubmissionStatus;

// Re-export implementations
pub use memory::{
    InMemoryBackend, OrganizationSnapshot, SnapshotAccount, SnapshotOu, SnapshotStack,
};
