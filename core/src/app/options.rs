//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::periphery::client;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{BootstrapAdmin, Settings};
use crate::workers::health;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Inbound HTTP server configuration
    pub server: ServerOptions,

    /// Periphery client options
    pub periphery: client::Options,

    /// Health monitor options
    pub health_worker: health::Options,

    /// User token options
    pub auth: AuthOptions,

    /// Page size of update listings
    pub updates_page_size: usize,

    /// Admin user created at startup when missing
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppOptions {
    /// Options derived from a settings file
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout,
                data_dir: settings.data_dir.clone(),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            periphery: client::Options {
                health_timeout: Duration::from_millis(settings.periphery.health_timeout_ms),
                operation_timeout: Duration::from_secs(settings.periphery.operation_timeout_secs),
            },
            health_worker: health::Options {
                interval: Duration::from_secs(settings.health_check_interval_secs),
                ..Default::default()
            },
            auth: AuthOptions {
                jwt_secret: SecretString::from(settings.jwt_secret.clone()),
                jwt_ttl_secs: settings.jwt_ttl_secs,
            },
            updates_page_size: settings.updates_page_size,
            bootstrap_admin: settings.bootstrap_admin.clone(),
        }
    }
}

/// Lifecycle options for the core
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Collection snapshot directory; `None` keeps collections in memory
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            data_dir: Some(PathBuf::from("data")),
        }
    }
}

/// Inbound HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9120,
        }
    }
}

/// User token options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub jwt_secret: SecretString,
    pub jwt_ttl_secs: u64,
}
