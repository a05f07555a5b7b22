//! Scheduler layer for the engine
//!
//! This layer fans work out over a bounded pool of tasks, launched in
//! batches with a pause in between so the remote APIs are not hit in
//! bursts. Failures are collected and reported once every task is done.

pub mod dispatcher;

pub use dispatcher::{DispatchReport, Dispatcher};
