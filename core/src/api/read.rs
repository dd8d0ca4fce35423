//! Read operations

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::state::ActionStateFlags;
use crate::app::state::AppState;
use crate::errors::CoreError;
use crate::models::permission::PermissionLevel;
use crate::models::server::ServerStatus;
use crate::models::update::{ResourceTarget, ResourceType};
use crate::models::user::User;
use crate::models::Resource;
use crate::resources::status::deployment_state;
use crate::updates::log::UpdateQuery;

/// Body of `POST /read`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum ReadRequest {
    ListServers,
    GetServer { id: String },
    GetServerStatus { id: String },
    ListBuilds,
    GetBuild { id: String },
    ListDeployments,
    GetDeployment { id: String },
    GetDeploymentStatus { id: String },
    ListUpdates(UpdateQuery),
    GetUpdate { id: String },
    GetActionState { target: ResourceTarget },
}

/// Live reachability of a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatusResponse {
    pub id: String,
    pub status: ServerStatus,
}

/// In-flight actions on a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStateResponse {
    pub target: ResourceTarget,
    #[serde(flatten)]
    pub flags: ActionStateFlags,
}

/// Serve a read request
pub async fn handle(state: &AppState, user: &User, request: ReadRequest) -> Result<Value, CoreError> {
    let value = match request {
        ReadRequest::ListServers => {
            let servers = readable(state, user, state.registry.servers.list().await?).await?;
            to_value(servers.iter().map(|server| server.redacted()).collect::<Vec<_>>())?
        }
        ReadRequest::GetServer { id } => {
            let server = state.registry.get_server(&id).await?;
            require_read(state, user, &server).await?;
            to_value(server.redacted())?
        }
        ReadRequest::GetServerStatus { id } => {
            let server = state.registry.get_server(&id).await?;
            require_read(state, user, &server).await?;
            let status = if state.periphery.check_health(&server).await {
                ServerStatus::Ok
            } else {
                ServerStatus::NotOk
            };
            to_value(ServerStatusResponse { id, status })?
        }
        ReadRequest::ListBuilds => {
            let builds = readable(state, user, state.registry.builds.list().await?).await?;
            to_value(builds.iter().map(|build| build.redacted()).collect::<Vec<_>>())?
        }
        ReadRequest::GetBuild { id } => {
            let build = state.registry.get_build(&id).await?;
            require_read(state, user, &build).await?;
            to_value(build.redacted())?
        }
        ReadRequest::ListDeployments => {
            let deployments =
                readable(state, user, state.registry.deployments.list().await?).await?;
            to_value(
                deployments
                    .iter()
                    .map(|deployment| deployment.redacted())
                    .collect::<Vec<_>>(),
            )?
        }
        ReadRequest::GetDeployment { id } => {
            let deployment = state.registry.get_deployment(&id).await?;
            require_read(state, user, &deployment).await?;
            to_value(deployment.redacted())?
        }
        ReadRequest::GetDeploymentStatus { id } => {
            let deployment = state.registry.get_deployment(&id).await?;
            require_read(state, user, &deployment).await?;
            let server = state.registry.get_server(&deployment.server_id).await?;
            to_value(deployment_state(state.periphery.as_ref(), &server, &deployment).await)?
        }
        ReadRequest::ListUpdates(query) => {
            let page = if user.admin {
                state.updates.list(&query, |_| true).await?
            } else {
                let targets = readable_targets(state, user).await?;
                state
                    .updates
                    .list(&query, |update| {
                        update.operator == user.id || targets.contains(&update.target)
                    })
                    .await?
            };
            to_value(page)?
        }
        ReadRequest::GetUpdate { id } => {
            let update = state.updates.get(&id).await?;
            if !can_read_update(state, user, &update.target, &update.operator).await? {
                return Err(CoreError::PermissionDenied(format!(
                    "user {} cannot read update {}",
                    user.username, id
                )));
            }
            to_value(update)?
        }
        ReadRequest::GetActionState { target } => {
            let resource = state.registry.resource(&target).await?;
            require_read(state, user, &resource).await?;
            let flags = state.action_states.flags(&target.id);
            to_value(ActionStateResponse { target, flags })?
        }
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, CoreError> {
    Ok(serde_json::to_value(value)?)
}

async fn require_read(
    state: &AppState,
    user: &User,
    resource: &dyn Resource,
) -> Result<(), CoreError> {
    state
        .permissions
        .require(user, resource, PermissionLevel::Read)
        .await
        .map(|_| ())
}

/// Keep the resources `user` can read
async fn readable<T: Resource>(
    state: &AppState,
    user: &User,
    resources: Vec<T>,
) -> Result<Vec<T>, CoreError> {
    let mut visible = Vec::with_capacity(resources.len());
    for resource in resources {
        if state.permissions.resolve(user, &resource).await? >= PermissionLevel::Read {
            visible.push(resource);
        }
    }
    Ok(visible)
}

async fn readable_targets(
    state: &AppState,
    user: &User,
) -> Result<HashSet<ResourceTarget>, CoreError> {
    let resources = readable(state, user, state.registry.all_resources().await?).await?;
    Ok(resources.iter().map(|resource| resource.target()).collect())
}

/// Whether `user` may see updates of `target` started by `operator`.
/// Updates of deleted resources remain visible to admins and to their
/// operator.
pub async fn can_read_update(
    state: &AppState,
    user: &User,
    target: &ResourceTarget,
    operator: &str,
) -> Result<bool, CoreError> {
    if user.admin || operator == user.id {
        return Ok(true);
    }
    if target.resource_type == ResourceType::User {
        return Ok(false);
    }
    match state.registry.resource(target).await {
        Ok(resource) => {
            Ok(state.permissions.resolve(user, &resource).await? >= PermissionLevel::Read)
        }
        Err(CoreError::ResourceNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
