//! Build pipeline: clone, build, optionally push

use periphery_api::{BuildImage, CloneRepo, PeripheryRequest, PushImage};
use tracing::info;

use crate::actions::executor::{ActionContext, RunResult};
use crate::models::build::Build;
use crate::utils::to_docker_name;

/// Run a build on its builder server. On success the build advances to the
/// next patch version.
pub async fn run_build(context: &ActionContext, build: Build) -> RunResult {
    let version = build.version.increment();
    let image = build.image_tag(&version);
    let repo_name = to_docker_name(&build.name);

    context
        .stage(
            "clone repo",
            PeripheryRequest::CloneRepo(CloneRepo {
                name: repo_name.clone(),
                repo: build.repo.clone(),
                branch: build.branch.clone(),
                access_token: build.access_token.clone(),
            }),
        )
        .await?;

    context
        .stage(
            "docker build",
            PeripheryRequest::BuildImage(BuildImage {
                repo_name,
                image: image.clone(),
                build_path: build.build_path.clone(),
                dockerfile_path: build.dockerfile_path.clone(),
            }),
        )
        .await?;

    if build.pushes() {
        context
            .stage(
                "docker push",
                PeripheryRequest::PushImage(PushImage {
                    image: image.clone(),
                }),
            )
            .await?;
    }

    let build = context
        .registry
        .record_build_success(&build.id, version)
        .await?;
    info!("Built {} ({})", build.name, image);
    Ok(Some(build.version))
}
