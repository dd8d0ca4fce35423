//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::logs::LogLevel;

/// Core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily rolling log files into this directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Inbound HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// Periphery client configuration
    #[serde(default)]
    pub periphery: PeripherySettings,

    /// Interval between server health sweeps
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Page size of update listings
    #[serde(default = "default_updates_page_size")]
    pub updates_page_size: usize,

    /// Secret signing user tokens
    #[serde(default)]
    pub jwt_secret: String,

    /// Lifetime of issued user tokens
    #[serde(default = "default_jwt_ttl")]
    pub jwt_ttl_secs: u64,

    /// Collection snapshot directory, relative to the base dir. `null` keeps
    /// every collection in memory.
    #[serde(default = "default_data_dir")]
    pub data_dir: Option<PathBuf>,

    /// Admin user created at startup when missing
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn default_health_check_interval() -> u64 {
    15
}

fn default_updates_page_size() -> usize {
    100
}

fn default_jwt_ttl() -> u64 {
    86400
}

fn default_data_dir() -> Option<PathBuf> {
    Some(PathBuf::from("data"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            periphery: PeripherySettings::default(),
            health_check_interval_secs: default_health_check_interval(),
            updates_page_size: default_updates_page_size(),
            jwt_secret: String::new(),
            jwt_ttl_secs: default_jwt_ttl(),
            data_dir: default_data_dir(),
            bootstrap_admin: None,
        }
    }
}

impl Settings {
    /// Reject settings the core cannot start with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(CoreError::ConfigError("jwt_secret must be set".to_string()));
        }
        if self.updates_page_size == 0 {
            return Err(CoreError::ConfigError(
                "updates_page_size must be positive".to_string(),
            ));
        }
        if self.health_check_interval_secs == 0 {
            return Err(CoreError::ConfigError(
                "health_check_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inbound HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9120
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Periphery client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeripherySettings {
    /// Bound on a single health check
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,

    /// Bound on a single dispatched action
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

fn default_health_timeout() -> u64 {
    3000
}

fn default_operation_timeout() -> u64 {
    1800
}

impl Default for PeripherySettings {
    fn default() -> Self {
        Self {
            health_timeout_ms: default_health_timeout(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

/// Admin account seeded at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub id: String,
    pub username: String,
}
