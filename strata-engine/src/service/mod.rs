//! Service layer
//!
//! Services contain the resolution logic of the engine. They orchestrate
//! the repositories to navigate the organization, expand targets into
//! waves, merge parameter layers and evaluate intrinsic references.
//!
//! The pipeline service is trait-based so runs can be driven by
//! alternative implementations in tests.

pub mod cache;
pub mod intrinsic;
pub mod organization;
pub mod parameters;
pub mod params_files;
pub mod pipeline;
pub mod targets;
pub mod waves;

// Re-export traits
pub use pipeline::PipelineService;

// Re-export implementations
pub use cache::{CachedValue, RunCache};
pub use intrinsic::IntrinsicResolver;
pub use organization::OrganizationNavigator;
pub use parameters::ParameterResolver;
pub use params_files::ParameterFiles;
pub use pipeline::StandardPipelineService;
pub use targets::{TargetResolver, TargetScope};
pub use waves::WaveBuilder;
