//! Deployment models

use chrono::{DateTime, Utc};
use periphery_api::{EnvironmentVar, PortMapping, RestartMode, VolumeMapping};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::update::ResourceTarget;
use crate::models::Resource;
use crate::utils::{is_blank, now, to_docker_name};

/// Container status, derived from the periphery agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Running,
    Stopped,
    NotDeployed,
    Unknown,
}

/// Repository attached to a deployment, used by reclone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRepo {
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// A container running on a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub server_id: String,

    /// When set, deploys the latest version of this build
    #[serde(default)]
    pub build_id: Option<String>,

    /// Image reference used when no build is attached
    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub volumes: Vec<VolumeMapping>,
    #[serde(default)]
    pub environment: Vec<EnvironmentVar>,
    #[serde(default)]
    pub restart: RestartMode,

    #[serde(default)]
    pub repo: Option<DeploymentRepo>,

    #[serde(default)]
    pub owners: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Name of the docker container backing this deployment
    pub fn container_name(&self) -> String {
        to_docker_name(&self.name)
    }

    /// Copy safe to return from read operations
    pub fn redacted(&self) -> Self {
        let mut deployment = self.clone();
        if let Some(repo) = deployment.repo.as_mut() {
            repo.access_token = repo.access_token.as_ref().map(|_| "#".repeat(8));
        }
        deployment
    }
}

impl Resource for Deployment {
    fn target(&self) -> ResourceTarget {
        ResourceTarget::deployment(&self.id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn owners(&self) -> &[String] {
        &self.owners
    }
}

/// Deployment configuration. On update, absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub ports: Option<Vec<PortMapping>>,
    #[serde(default)]
    pub volumes: Option<Vec<VolumeMapping>>,
    #[serde(default)]
    pub environment: Option<Vec<EnvironmentVar>>,
    #[serde(default)]
    pub restart: Option<RestartMode>,
    #[serde(default)]
    pub repo: Option<DeploymentRepo>,
}

impl DeploymentConfig {
    /// Build a new deployment owned by `owner`
    pub fn into_deployment(self, id: String, owner: &str) -> Result<Deployment, CoreError> {
        let name = self
            .name
            .filter(|name| !is_blank(name))
            .map(|name| name.trim().to_string())
            .ok_or_else(|| CoreError::ValidationError("deployment name is required".to_string()))?;
        let server_id = self
            .server_id
            .filter(|id| !is_blank(id))
            .ok_or_else(|| CoreError::ValidationError("deployment server is required".to_string()))?;
        let ts = now();
        let deployment = Deployment {
            id,
            name,
            server_id,
            build_id: self.build_id.filter(|id| !is_blank(id)),
            image: self.image.unwrap_or_default(),
            ports: self.ports.unwrap_or_default(),
            volumes: self.volumes.unwrap_or_default(),
            environment: self.environment.unwrap_or_default(),
            restart: self.restart.unwrap_or_default(),
            repo: self.repo,
            owners: vec![owner.to_string()],
            created_at: ts,
            updated_at: ts,
        };
        validate(&deployment)?;
        Ok(deployment)
    }

    /// Apply the present fields to an existing deployment
    pub fn apply(self, deployment: &mut Deployment) -> Result<(), CoreError> {
        let mut next = deployment.clone();
        if let Some(name) = self.name {
            next.name = name.trim().to_string();
        }
        if let Some(server_id) = self.server_id {
            next.server_id = server_id;
        }
        if let Some(build_id) = self.build_id {
            next.build_id = Some(build_id).filter(|id| !is_blank(id));
        }
        if let Some(image) = self.image {
            next.image = image;
        }
        if let Some(ports) = self.ports {
            next.ports = ports;
        }
        if let Some(volumes) = self.volumes {
            next.volumes = volumes;
        }
        if let Some(environment) = self.environment {
            next.environment = environment;
        }
        if let Some(restart) = self.restart {
            next.restart = restart;
        }
        if let Some(repo) = self.repo {
            next.repo = Some(repo);
        }
        validate(&next)?;
        next.updated_at = now();
        *deployment = next;
        Ok(())
    }
}

fn validate(deployment: &Deployment) -> Result<(), CoreError> {
    if is_blank(&deployment.name) {
        return Err(CoreError::ValidationError(
            "deployment name must not be empty".to_string(),
        ));
    }
    if is_blank(&deployment.server_id) {
        return Err(CoreError::ValidationError(
            "deployment server must not be empty".to_string(),
        ));
    }
    for port in &deployment.ports {
        for side in [&port.local, &port.container] {
            if side.trim().parse::<u16>().is_err() {
                return Err(CoreError::ValidationError(format!(
                    "invalid port mapping {}:{}",
                    port.local, port.container
                )));
            }
        }
    }
    for volume in &deployment.volumes {
        if is_blank(&volume.local) || is_blank(&volume.container) {
            return Err(CoreError::ValidationError(format!(
                "invalid volume mapping {}:{}",
                volume.local, volume.container
            )));
        }
    }
    for env in &deployment.environment {
        if is_blank(&env.variable) {
            return Err(CoreError::ValidationError(
                "environment variable name must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}
