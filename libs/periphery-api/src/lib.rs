//! Periphery API
//!
//! Wire models for the contract between the dockhand core and the periphery
//! agent running on every managed host.

pub mod models;

pub use models::*;

/// Path of the agent health endpoint
pub const HEALTH_PATH: &str = "/health";

/// Path of the container listing endpoint
pub const CONTAINERS_PATH: &str = "/containers";

/// Path of the action dispatch endpoint
pub const EXECUTE_PATH: &str = "/execute";
