//! Utility functions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version information for the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Normalize a resource name into a docker image / container name
pub fn to_docker_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Check for an empty or whitespace-only string
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
