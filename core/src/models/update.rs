//! Update (audit log) models

use std::fmt;

use chrono::{DateTime, Utc};
use periphery_api::CommandResult;
use serde::{Deserialize, Serialize};

use crate::models::version::Version;
use crate::utils::now;

/// Resource type half of a resource target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Server,
    Build,
    Deployment,
    User,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A (type, id) pair identifying a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceTarget {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub id: String,
}

impl ResourceTarget {
    pub fn server(id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::Server,
            id: id.into(),
        }
    }

    pub fn build(id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::Build,
            id: id.into(),
        }
    }

    pub fn deployment(id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::Deployment,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::User,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resource_type, self.id)
    }
}

/// Operation recorded by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    // Execute
    RunBuild,
    Deploy,
    StartContainer,
    StopContainer,
    RemoveContainer,
    PullImage,
    RecloneRepo,
    DeleteDeployment,

    // Write
    CreateServer,
    UpdateServer,
    DeleteServer,
    CreateBuild,
    UpdateBuild,
    DeleteBuild,
    CreateDeployment,
    UpdateDeployment,
    SetPermission,
    CreateUser,
    UpdateUser,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Update lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    #[default]
    InProgress,
    Complete,
}

/// One log stage of an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub stage: String,
    pub command: String,
    pub output: String,
    pub is_error: bool,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

impl Log {
    /// Stage built from a periphery command result
    pub fn from_command(stage: &str, result: CommandResult, start_ts: DateTime<Utc>) -> Self {
        Self {
            stage: stage.to_string(),
            command: result.command,
            output: result.output,
            is_error: result.is_error,
            start_ts,
            end_ts: now(),
        }
    }

    /// Informational stage that ran no command
    pub fn simple(stage: &str, output: impl Into<String>) -> Self {
        let ts = now();
        Self {
            stage: stage.to_string(),
            command: String::new(),
            output: output.into(),
            is_error: false,
            start_ts: ts,
            end_ts: ts,
        }
    }

    /// Failed stage that ran no command
    pub fn error(stage: &str, output: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::simple(stage, output)
        }
    }
}

/// One audit record for one invocation of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub id: String,
    pub operation: Operation,
    pub target: ResourceTarget,
    pub operator: String,
    pub start_ts: DateTime<Utc>,
    #[serde(default)]
    pub end_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: UpdateStatus,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub version: Option<Version>,
}

impl Update {
    pub fn is_complete(&self) -> bool {
        self.status == UpdateStatus::Complete
    }
}
