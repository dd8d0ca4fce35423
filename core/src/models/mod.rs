//! Domain models

pub mod build;
pub mod deployment;
pub mod permission;
pub mod server;
pub mod update;
pub mod user;
pub mod version;

use crate::models::update::ResourceTarget;

/// Common view over servers, builds and deployments
pub trait Resource: Send + Sync {
    /// The (type, id) pair identifying this resource
    fn target(&self) -> ResourceTarget;

    /// Human readable name
    fn name(&self) -> &str;

    /// Users that always resolve to `Update` on this resource
    fn owners(&self) -> &[String];
}
