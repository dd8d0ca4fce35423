//! Deployment pipelines and the periphery requests they send

use periphery_api::{CloneRepo, ContainerTarget, DeployContainer, PeripheryRequest, PullImage};
use tracing::info;

use crate::actions::executor::{ActionContext, RunResult};
use crate::actions::state::ActionKind;
use crate::errors::CoreError;
use crate::models::deployment::Deployment;
use crate::models::update::Log;
use crate::models::version::Version;
use crate::models::Resource;
use crate::resources::registry::ResourceRegistry;
use crate::utils::is_blank;

/// Image a deployment runs: its build's latest version, or its own image
pub async fn resolve_image(
    registry: &ResourceRegistry,
    deployment: &Deployment,
) -> Result<(String, Option<Version>), CoreError> {
    match &deployment.build_id {
        Some(build_id) => {
            let build = registry.get_build(build_id).await?;
            if build.version.is_none() {
                return Err(CoreError::ValidationError(format!(
                    "build {} has never been built",
                    build.name
                )));
            }
            Ok((build.image_tag(&build.version), Some(build.version)))
        }
        None if is_blank(&deployment.image) => Err(CoreError::ValidationError(format!(
            "deployment {} has neither a build nor an image",
            deployment.name
        ))),
        None => Ok((deployment.image.trim().to_string(), None)),
    }
}

pub fn pull_request(image: String) -> PeripheryRequest {
    PeripheryRequest::PullImage(PullImage { image })
}

pub fn reclone_request(deployment: &Deployment) -> Result<PeripheryRequest, CoreError> {
    let repo = deployment.repo.as_ref().ok_or_else(|| {
        CoreError::ValidationError(format!("deployment {} has no repo", deployment.name))
    })?;
    Ok(PeripheryRequest::CloneRepo(CloneRepo {
        name: deployment.container_name(),
        repo: repo.repo.clone(),
        branch: repo.branch.clone(),
        access_token: repo.access_token.clone(),
    }))
}

/// Stage name of a single container action
pub fn container_stage(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Start => "docker start",
        ActionKind::Stop => "docker stop",
        ActionKind::Remove => "docker rm",
        _ => "docker",
    }
}

/// Periphery request of a single container action
pub fn container_request(
    kind: ActionKind,
    deployment: &Deployment,
) -> Result<PeripheryRequest, CoreError> {
    let target = ContainerTarget {
        name: deployment.container_name(),
    };
    match kind {
        ActionKind::Start => Ok(PeripheryRequest::StartContainer(target)),
        ActionKind::Stop => Ok(PeripheryRequest::StopContainer(target)),
        ActionKind::Remove => Ok(PeripheryRequest::RemoveContainer(target)),
        kind => Err(CoreError::Internal(format!(
            "{} is not a container action",
            kind
        ))),
    }
}

/// Replace the deployment's container with one running `image`
pub async fn run_deploy(
    context: &ActionContext,
    deployment: &Deployment,
    image: String,
    version: Option<Version>,
) -> RunResult {
    context
        .stage(
            "deploy container",
            PeripheryRequest::DeployContainer(DeployContainer {
                name: deployment.container_name(),
                image,
                ports: deployment.ports.clone(),
                volumes: deployment.volumes.clone(),
                environment: deployment.environment.clone(),
                restart: deployment.restart,
            }),
        )
        .await?;
    Ok(version)
}

/// Remove the container, then the deployment and its permission entries
pub async fn run_full_delete(context: &ActionContext, deployment: Deployment) -> RunResult {
    context
        .stage(
            "docker rm",
            PeripheryRequest::RemoveContainer(ContainerTarget {
                name: deployment.container_name(),
            }),
        )
        .await?;

    context.registry.deployments.delete(&deployment.id).await?;
    let removed = context
        .permissions
        .remove_for_target(&deployment.target())
        .await?;
    context
        .log(Log::simple(
            "delete deployment",
            format!(
                "deleted deployment {} and {} permission entries",
                deployment.name, removed
            ),
        ))
        .await?;
    info!(
        "User {} deleted deployment {}",
        context.operator, deployment.name
    );
    Ok(None)
}
