//! Strata Core
//!
//! Core types and abstractions for the Strata deployment resolution engine.
//!
//! This crate contains:
//! - Domain types: accounts, organization nodes, target expressions, waves,
//!   override documents and intrinsic expressions
//! - Deployment map: loading and structural validation of the map documents
//! - Errors: the error taxonomy shared by the engine and the CLI

pub mod deployment_map;
pub mod domain;
pub mod error;

pub use error::{CapabilityError, EngineError, Result};
