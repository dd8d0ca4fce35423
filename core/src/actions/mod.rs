//! Execute operations: single-flight slots, the executor state machine and
//! the build and deployment pipelines it runs

pub mod build;
pub mod deployment;
pub mod executor;
pub mod state;
