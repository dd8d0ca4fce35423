//! Periphery wire models

use serde::{Deserialize, Serialize};

/// Result of one command executed by the periphery agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub output: String,
    pub is_error: bool,
}

impl CommandResult {
    /// A successful result
    pub fn ok(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// A failed result
    pub fn error(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            is_error: true,
        }
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub docker_reachable: bool,
}

/// Container state as reported by the docker engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Restarting,
    Running,
    Removing,
    Paused,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

/// One entry of the container list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    #[serde(default)]
    pub status: Option<String>,
}

/// Port mapping, `local:container`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub local: String,
    pub container: String,
}

/// Volume mapping, `local:container`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
    pub local: String,
    pub container: String,
}

/// Environment variable passed to a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVar {
    pub variable: String,
    pub value: String,
}

/// Container restart policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
    #[default]
    No,
    OnFailure,
    Always,
    UnlessStopped,
}

/// Clone a repository onto the agent host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRepo {
    pub name: String,
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Build an image from a previously cloned repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildImage {
    pub repo_name: String,
    pub image: String,
    pub build_path: String,
    pub dockerfile_path: String,
}

/// Push a built image to the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushImage {
    pub image: String,
}

/// Pull an image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullImage {
    pub image: String,
}

/// Replace the named container with a new one running `image`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployContainer {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub volumes: Vec<VolumeMapping>,
    #[serde(default)]
    pub environment: Vec<EnvironmentVar>,
    #[serde(default)]
    pub restart: RestartMode,
}

/// Identifies a container by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerTarget {
    pub name: String,
}

/// Action dispatched to `POST /execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum PeripheryRequest {
    CloneRepo(CloneRepo),
    BuildImage(BuildImage),
    PushImage(PushImage),
    PullImage(PullImage),
    DeployContainer(DeployContainer),
    StartContainer(ContainerTarget),
    StopContainer(ContainerTarget),
    RemoveContainer(ContainerTarget),
}

impl PeripheryRequest {
    /// The request type name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            PeripheryRequest::CloneRepo(_) => "CloneRepo",
            PeripheryRequest::BuildImage(_) => "BuildImage",
            PeripheryRequest::PushImage(_) => "PushImage",
            PeripheryRequest::PullImage(_) => "PullImage",
            PeripheryRequest::DeployContainer(_) => "DeployContainer",
            PeripheryRequest::StartContainer(_) => "StartContainer",
            PeripheryRequest::StopContainer(_) => "StopContainer",
            PeripheryRequest::RemoveContainer(_) => "RemoveContainer",
        }
    }
}
