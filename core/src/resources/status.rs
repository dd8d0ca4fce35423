//! Deployment status, derived from the periphery container list

use periphery_api::{ContainerState, ContainerSummary};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::models::server::Server;
use crate::periphery::Periphery;

/// Status of a deployment together with its container, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    pub status: DeploymentStatus,
    #[serde(default)]
    pub container: Option<ContainerSummary>,
}

/// Map the container (or its absence) to a deployment status
pub fn status_of(container: Option<&ContainerSummary>) -> DeploymentStatus {
    match container.map(|container| container.state) {
        None => DeploymentStatus::NotDeployed,
        Some(ContainerState::Running) => DeploymentStatus::Running,
        Some(ContainerState::Unknown) => DeploymentStatus::Unknown,
        Some(_) => DeploymentStatus::Stopped,
    }
}

/// Ask the deployment's server for its container
pub async fn deployment_state(
    periphery: &dyn Periphery,
    server: &Server,
    deployment: &Deployment,
) -> DeploymentState {
    match periphery.container_list(server).await {
        Ok(containers) => {
            let name = deployment.container_name();
            let container = containers.into_iter().find(|c| c.name == name);
            DeploymentState {
                status: status_of(container.as_ref()),
                container,
            }
        }
        Err(e) => {
            debug!("Status of deployment {} unknown: {}", deployment.name, e);
            DeploymentState {
                status: DeploymentStatus::Unknown,
                container: None,
            }
        }
    }
}
