//! Server models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::CoreError;
use crate::models::update::ResourceTarget;
use crate::models::Resource;
use crate::utils::{is_blank, now};

/// Last known reachability of a server's periphery agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Ok,
    #[default]
    NotOk,
}

/// A host running a periphery agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,

    /// `host:port` or a full `http(s)://` URL
    pub address: String,

    /// Shared secret sent as the `Authorization` header
    pub passkey: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// The core process itself, always reachable
    #[serde(default)]
    pub is_core: bool,

    #[serde(default)]
    pub owners: Vec<String>,

    #[serde(default)]
    pub status: ServerStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Server {
    /// Base URL of the periphery agent
    pub fn base_url(&self) -> Result<Url, CoreError> {
        parse_address(&self.address)
    }

    /// Copy safe to return from read operations
    pub fn redacted(&self) -> Self {
        Self {
            passkey: "#".repeat(8),
            ..self.clone()
        }
    }
}

impl Resource for Server {
    fn target(&self) -> ResourceTarget {
        ResourceTarget::server(&self.id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn owners(&self) -> &[String] {
        &self.owners
    }
}

/// Server configuration. On update, absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub passkey: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub is_core: Option<bool>,
}

impl ServerConfig {
    /// Build a new server owned by `owner`
    pub fn into_server(self, id: String, owner: &str) -> Result<Server, CoreError> {
        let name = self
            .name
            .filter(|name| !is_blank(name))
            .ok_or_else(|| CoreError::ValidationError("server name is required".to_string()))?;
        let address = self.address.ok_or_else(|| {
            CoreError::ValidationError("server address is required".to_string())
        })?;
        parse_address(&address)?;
        let ts = now();
        Ok(Server {
            id,
            name: name.trim().to_string(),
            address,
            passkey: self.passkey.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            is_core: self.is_core.unwrap_or(false),
            owners: vec![owner.to_string()],
            status: ServerStatus::NotOk,
            created_at: ts,
            updated_at: ts,
        })
    }

    /// Apply the present fields to an existing server
    pub fn apply(self, server: &mut Server) -> Result<(), CoreError> {
        if let Some(name) = self.name {
            if is_blank(&name) {
                return Err(CoreError::ValidationError(
                    "server name must not be empty".to_string(),
                ));
            }
            server.name = name.trim().to_string();
        }
        if let Some(address) = self.address {
            parse_address(&address)?;
            server.address = address;
        }
        if let Some(passkey) = self.passkey {
            server.passkey = passkey;
        }
        if let Some(enabled) = self.enabled {
            server.enabled = enabled;
        }
        if let Some(is_core) = self.is_core {
            server.is_core = is_core;
        }
        server.updated_at = now();
        Ok(())
    }
}

/// Parse a server address, defaulting the scheme to `http`
pub fn parse_address(address: &str) -> Result<Url, CoreError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(CoreError::ValidationError(
            "server address must not be empty".to_string(),
        ));
    }
    let with_scheme = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let url = Url::parse(&with_scheme).map_err(|e| {
        CoreError::ValidationError(format!("invalid server address {}: {}", address, e))
    })?;
    if url.host_str().is_none() {
        return Err(CoreError::ValidationError(format!(
            "server address {} has no host",
            address
        )));
    }
    Ok(url)
}
