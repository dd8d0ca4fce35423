//! Write operations
//!
//! Configuration changes run synchronously. Each successful write is recorded
//! as a completed update carrying one log stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::actions::state::ActionKind;
use crate::app::state::AppState;
use crate::errors::CoreError;
use crate::models::build::{Build, BuildConfig};
use crate::models::deployment::{Deployment, DeploymentConfig};
use crate::models::permission::PermissionLevel;
use crate::models::server::{Server, ServerConfig};
use crate::models::update::{Log, Operation, ResourceTarget};
use crate::models::user::{User, UserConfig};
use crate::models::Resource;
use crate::utils::generate_uuid;

/// Body of `POST /write`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum WriteRequest {
    CreateServer(ServerConfig),
    UpdateServer {
        id: String,
        config: ServerConfig,
    },
    DeleteServer {
        id: String,
    },
    CreateBuild(BuildConfig),
    UpdateBuild {
        id: String,
        config: BuildConfig,
    },
    DeleteBuild {
        id: String,
    },
    CreateDeployment(DeploymentConfig),
    UpdateDeployment {
        id: String,
        config: DeploymentConfig,
    },
    SetPermission {
        user_id: String,
        target: ResourceTarget,
        level: PermissionLevel,
    },
    CreateUser(UserConfig),
    UpdateUser {
        id: String,
        config: UserConfig,
    },
}

/// Serve a write request
pub async fn handle(
    state: &AppState,
    user: &User,
    request: WriteRequest,
) -> Result<Value, CoreError> {
    match request {
        WriteRequest::CreateServer(config) => {
            state.permissions.require_admin(user)?;
            let server = config.into_server(generate_uuid(), &user.id)?;
            state.registry.servers.insert(server.clone()).await?;
            record(
                state,
                user,
                Operation::CreateServer,
                server.target(),
                format!("created server {} at {}", server.name, server.address),
            )
            .await?;
            Ok(serde_json::to_value(server.redacted())?)
        }
        WriteRequest::UpdateServer { id, config } => {
            let server = state.registry.get_server(&id).await?;
            state
                .permissions
                .require(user, &server, PermissionLevel::Update)
                .await?;
            let server = state
                .registry
                .servers
                .update(&id, Box::new(move |server: &mut Server| config.apply(server)))
                .await?;
            record(
                state,
                user,
                Operation::UpdateServer,
                server.target(),
                format!("updated server {}", server.name),
            )
            .await?;
            Ok(serde_json::to_value(server.redacted())?)
        }
        WriteRequest::DeleteServer { id } => {
            let server = state.registry.get_server(&id).await?;
            state
                .permissions
                .require(user, &server, PermissionLevel::Update)
                .await?;
            state.registry.ensure_server_unused(&id).await?;
            state.registry.servers.delete(&id).await?;
            state.permissions.remove_for_target(&server.target()).await?;
            record(
                state,
                user,
                Operation::DeleteServer,
                server.target(),
                format!("deleted server {}", server.name),
            )
            .await?;
            Ok(serde_json::to_value(server.redacted())?)
        }
        WriteRequest::CreateBuild(config) => {
            let builder_id = config.builder_server_id.clone().unwrap_or_default();
            let builder = state.registry.get_server(&builder_id).await?;
            state
                .permissions
                .require(user, &builder, PermissionLevel::Execute)
                .await?;
            let build = config.into_build(generate_uuid(), &user.id)?;
            state.registry.builds.insert(build.clone()).await?;
            record(
                state,
                user,
                Operation::CreateBuild,
                build.target(),
                format!("created build {} on server {}", build.name, builder.name),
            )
            .await?;
            Ok(serde_json::to_value(build.redacted())?)
        }
        WriteRequest::UpdateBuild { id, config } => {
            let build = state.registry.get_build(&id).await?;
            state
                .permissions
                .require(user, &build, PermissionLevel::Update)
                .await?;
            if let Some(builder_id) = &config.builder_server_id {
                if builder_id != &build.builder_server_id {
                    let builder = state.registry.get_server(builder_id).await?;
                    state
                        .permissions
                        .require(user, &builder, PermissionLevel::Execute)
                        .await?;
                }
            }
            let build = state
                .registry
                .builds
                .update(&id, Box::new(move |build: &mut Build| config.apply(build)))
                .await?;
            record(
                state,
                user,
                Operation::UpdateBuild,
                build.target(),
                format!("updated build {}", build.name),
            )
            .await?;
            Ok(serde_json::to_value(build.redacted())?)
        }
        WriteRequest::DeleteBuild { id } => {
            let build = state.registry.get_build(&id).await?;
            state
                .permissions
                .require(user, &build, PermissionLevel::Update)
                .await?;
            // held until the build is gone so no run can start against it
            let Some(_guard) = state.action_states.acquire(&id, ActionKind::Build) else {
                return Err(CoreError::ActionInProgress {
                    target: build.target(),
                    action: ActionKind::Build,
                });
            };
            state.registry.ensure_build_unused(&id).await?;
            state.registry.builds.delete(&id).await?;
            state.permissions.remove_for_target(&build.target()).await?;
            record(
                state,
                user,
                Operation::DeleteBuild,
                build.target(),
                format!("deleted build {}", build.name),
            )
            .await?;
            Ok(serde_json::to_value(build.redacted())?)
        }
        WriteRequest::CreateDeployment(config) => {
            let server_id = config.server_id.clone().unwrap_or_default();
            let server = state.registry.get_server(&server_id).await?;
            state
                .permissions
                .require(user, &server, PermissionLevel::Execute)
                .await?;
            if let Some(build_id) = &config.build_id {
                let build = state.registry.get_build(build_id).await?;
                state
                    .permissions
                    .require(user, &build, PermissionLevel::Read)
                    .await?;
            }
            let deployment = config.into_deployment(generate_uuid(), &user.id)?;
            state.registry.deployments.insert(deployment.clone()).await?;
            record(
                state,
                user,
                Operation::CreateDeployment,
                deployment.target(),
                format!(
                    "created deployment {} on server {}",
                    deployment.name, server.name
                ),
            )
            .await?;
            Ok(serde_json::to_value(deployment.redacted())?)
        }
        WriteRequest::UpdateDeployment { id, config } => {
            let deployment = state.registry.get_deployment(&id).await?;
            state
                .permissions
                .require(user, &deployment, PermissionLevel::Update)
                .await?;
            if let Some(server_id) = &config.server_id {
                if server_id != &deployment.server_id {
                    let server = state.registry.get_server(server_id).await?;
                    state
                        .permissions
                        .require(user, &server, PermissionLevel::Execute)
                        .await?;
                }
            }
            if let Some(build_id) = &config.build_id {
                let build = state.registry.get_build(build_id).await?;
                state
                    .permissions
                    .require(user, &build, PermissionLevel::Read)
                    .await?;
            }
            let deployment = state
                .registry
                .deployments
                .update(
                    &id,
                    Box::new(move |deployment: &mut Deployment| config.apply(deployment)),
                )
                .await?;
            record(
                state,
                user,
                Operation::UpdateDeployment,
                deployment.target(),
                format!("updated deployment {}", deployment.name),
            )
            .await?;
            Ok(serde_json::to_value(deployment.redacted())?)
        }
        WriteRequest::SetPermission {
            user_id,
            target,
            level,
        } => {
            state.permissions.require_admin(user)?;
            let grantee = state.registry.get_user(&user_id).await?;
            let resource = state.registry.resource(&target).await?;
            let permission = state
                .permissions
                .set(&grantee.id, target.clone(), level)
                .await?;
            record(
                state,
                user,
                Operation::SetPermission,
                target,
                format!(
                    "set {} permission for {} on {}",
                    level,
                    grantee.username,
                    resource.name()
                ),
            )
            .await?;
            Ok(serde_json::to_value(permission)?)
        }
        WriteRequest::CreateUser(config) => {
            state.permissions.require_admin(user)?;
            let created = config.into_user(generate_uuid())?;
            ensure_username_free(state, &created.username, &created.id).await?;
            state.registry.users.insert(created.clone()).await?;
            record(
                state,
                user,
                Operation::CreateUser,
                ResourceTarget::user(&created.id),
                format!("created user {}", created.username),
            )
            .await?;
            Ok(serde_json::to_value(created)?)
        }
        WriteRequest::UpdateUser { id, config } => {
            state.permissions.require_admin(user)?;
            if id == user.id && config.revokes_admin(user) {
                return Err(CoreError::ValidationError(
                    "admins cannot revoke their own access".to_string(),
                ));
            }
            if let Some(username) = &config.username {
                ensure_username_free(state, username.trim(), &id).await?;
            }
            let updated = state
                .registry
                .users
                .update(&id, Box::new(move |target: &mut User| config.apply(target)))
                .await?;
            record(
                state,
                user,
                Operation::UpdateUser,
                ResourceTarget::user(&updated.id),
                format!(
                    "updated user {} (admin: {}, enabled: {})",
                    updated.username, updated.admin, updated.enabled
                ),
            )
            .await?;
            Ok(serde_json::to_value(updated)?)
        }
    }
}

async fn ensure_username_free(
    state: &AppState,
    username: &str,
    id: &str,
) -> Result<(), CoreError> {
    let taken = state
        .registry
        .users
        .list()
        .await?
        .into_iter()
        .any(|other| other.username == username && other.id != id);
    if taken {
        return Err(CoreError::ValidationError(format!(
            "username {} is already taken",
            username
        )));
    }
    Ok(())
}

async fn record(
    state: &AppState,
    user: &User,
    operation: Operation,
    target: ResourceTarget,
    output: String,
) -> Result<(), CoreError> {
    info!("{} by {}: {}", operation, user.id, output);
    let stage = operation_stage(operation);
    state
        .updates
        .record(operation, target, &user.id, Log::simple(stage, output))
        .await?;
    Ok(())
}

fn operation_stage(operation: Operation) -> &'static str {
    match operation {
        Operation::CreateServer
        | Operation::CreateBuild
        | Operation::CreateDeployment
        | Operation::CreateUser => "create",
        Operation::UpdateServer
        | Operation::UpdateBuild
        | Operation::UpdateDeployment
        | Operation::UpdateUser => "update",
        Operation::DeleteServer | Operation::DeleteBuild | Operation::DeleteDeployment => {
            "delete"
        }
        Operation::SetPermission => "set permission",
        _ => "write",
    }
}
