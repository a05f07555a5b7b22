//! Core domain types
//!
//! This module contains the structures shared by the engine (for resolution)
//! and the CLI (for presentation). They are plain value objects: built,
//! transformed and discarded within a single pipeline's resolution.

pub mod account;
pub mod intrinsic;
pub mod organization;
pub mod parameters;
pub mod plan;
pub mod target;
pub mod wave;
