//! Strata Engine
//!
//! Resolves deployment maps into pipeline plans.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: Capability interfaces for the organization, tags,
//!   credentials, configuration store, stack outputs, blobs and the
//!   pipeline executor, plus an in-memory implementation of all of them
//! - Services: Organization navigation, target expansion, wave building,
//!   parameter merging and intrinsic evaluation
//! - Scheduler: Bounded, batched dispatch of pipelines
//!
//! A [`run::DeploymentRun`] ties these together for one deployment map.

pub mod config;
pub mod repository;
pub mod run;
pub mod scheduler;
pub mod service;

pub use config::EngineConfig;
pub use run::{DeploymentRun, PipelineOutcome, RunMode, RunReport};
