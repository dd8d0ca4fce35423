//! Action executor
//!
//! Turns an execute request into a run: resolve the resource, check the
//! caller's permission, validate, take the action slot, open an update and
//! hand the pipeline to a background task. The task's finalizer always
//! releases the slot and then completes the update, whatever the pipeline
//! did (success, failed stage, error, cancellation, panic).

use std::sync::Arc;

use periphery_api::{CommandResult, PeripheryRequest};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::actions::state::{ActionGuard, ActionKind, ActionStates};
use crate::actions::{build, deployment};
use crate::errors::CoreError;
use crate::models::build::Build;
use crate::models::deployment::Deployment;
use crate::models::permission::PermissionLevel;
use crate::models::server::Server;
use crate::models::update::{Log, ResourceTarget, ResourceType};
use crate::models::user::User;
use crate::models::version::Version;
use crate::models::Resource;
use crate::periphery::Periphery;
use crate::permissions::resolver::PermissionResolver;
use crate::resources::registry::ResourceRegistry;
use crate::updates::log::UpdateLog;
use crate::utils::now;

/// Execute operation requested by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum ExecuteRequest {
    RunBuild { build_id: String },
    Deploy { deployment_id: String },
    StartContainer { deployment_id: String },
    StopContainer { deployment_id: String },
    RemoveContainer { deployment_id: String },
    PullImage { deployment_id: String },
    RecloneRepo { deployment_id: String },
    DeleteDeployment { deployment_id: String },
    Cancel { target: ResourceTarget, action: ActionKind },
}

/// Outcome of an accepted execute request
#[derive(Debug)]
pub enum Execution {
    /// The run continues in the background
    Started(ActionHandle),

    /// The in-flight run was signalled
    Cancelled {
        target: ResourceTarget,
        action: ActionKind,
    },
}

/// Handle of a background run
#[derive(Debug)]
pub struct ActionHandle {
    pub update_id: String,
    task: JoinHandle<()>,
}

impl ActionHandle {
    /// Wait for the run's finalizer to finish
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            error!("Action task for update {} failed: {}", self.update_id, e);
        }
    }
}

/// Why a run did not succeed
#[derive(Debug)]
pub enum RunError {
    /// A stage reported an error; it is already in the update's logs
    StageFailed,

    /// The run's cancellation token fired
    Cancelled,

    /// The run could not continue
    Error(CoreError),
}

impl From<CoreError> for RunError {
    fn from(err: CoreError) -> Self {
        RunError::Error(err)
    }
}

/// Result of a pipeline: the version it advanced to, if any
pub type RunResult = Result<Option<Version>, RunError>;

/// Everything a pipeline needs while its slot is held
pub struct ActionContext {
    pub update_id: String,
    pub operator: String,
    pub server: Server,
    pub cancel: CancellationToken,
    pub registry: Arc<ResourceRegistry>,
    pub permissions: Arc<PermissionResolver>,
    updates: Arc<UpdateLog>,
    periphery: Arc<dyn Periphery>,
}

impl ActionContext {
    /// Run one periphery call as a log stage
    pub async fn stage(
        &self,
        stage: &str,
        request: PeripheryRequest,
    ) -> Result<CommandResult, RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let start_ts = now();
        let result = self.periphery.dispatch(&self.server, request, &self.cancel).await;
        let failed = result.is_error;
        self.updates
            .append_stage(&self.update_id, Log::from_command(stage, result.clone(), start_ts))
            .await?;
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        if failed {
            return Err(RunError::StageFailed);
        }
        Ok(result)
    }

    /// Append a stage that ran no periphery command
    pub async fn log(&self, log: Log) -> Result<(), RunError> {
        self.updates.append_stage(&self.update_id, log).await?;
        Ok(())
    }
}

/// A validated run, ready to take its slot
struct Prepared {
    kind: ActionKind,
    target: ResourceTarget,
    server: Server,
    plan: Plan,
}

enum Plan {
    Build(Build),
    Deploy {
        deployment: Deployment,
        image: String,
        version: Option<Version>,
    },
    Container {
        stage: &'static str,
        request: PeripheryRequest,
    },
    FullDelete(Deployment),
}

/// Runs execute operations against periphery agents
pub struct ActionExecutor {
    registry: Arc<ResourceRegistry>,
    permissions: Arc<PermissionResolver>,
    states: Arc<ActionStates>,
    updates: Arc<UpdateLog>,
    periphery: Arc<dyn Periphery>,
    tasks: TaskTracker,
}

impl ActionExecutor {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        permissions: Arc<PermissionResolver>,
        states: Arc<ActionStates>,
        updates: Arc<UpdateLog>,
        periphery: Arc<dyn Periphery>,
    ) -> Self {
        Self {
            registry,
            permissions,
            states,
            updates,
            periphery,
            tasks: TaskTracker::new(),
        }
    }

    pub fn states(&self) -> &Arc<ActionStates> {
        &self.states
    }

    /// Accept an execute request
    pub async fn execute(&self, user: &User, request: ExecuteRequest) -> Result<Execution, CoreError> {
        if let ExecuteRequest::Cancel { target, action } = request {
            self.cancel(user, &target, action).await?;
            return Ok(Execution::Cancelled { target, action });
        }
        let prepared = self.prepare(user, request).await?;
        self.start(user, prepared).await.map(Execution::Started)
    }

    /// Signal the in-flight `action` on `target`
    pub async fn cancel(
        &self,
        user: &User,
        target: &ResourceTarget,
        action: ActionKind,
    ) -> Result<(), CoreError> {
        if matches!(
            target.resource_type,
            ResourceType::Server | ResourceType::User
        ) {
            return Err(CoreError::ValidationError(format!(
                "{} targets do not run actions",
                target.resource_type
            )));
        }
        let resource = self.registry.resource(target).await?;
        self.permissions
            .require(user, &resource, PermissionLevel::Execute)
            .await?;
        if !self.states.cancel(&target.id, action) {
            return Err(CoreError::ValidationError(format!(
                "no {} action in progress on {}",
                action, target
            )));
        }
        info!("User {} cancelled {} on {}", user.id, action, target);
        Ok(())
    }

    async fn prepare(&self, user: &User, request: ExecuteRequest) -> Result<Prepared, CoreError> {
        let (deployment_id, kind) = match request {
            ExecuteRequest::RunBuild { build_id } => {
                let build = self.registry.get_build(&build_id).await?;
                self.permissions
                    .require(user, &build, PermissionLevel::Execute)
                    .await?;
                let server = self.registry.get_server(&build.builder_server_id).await?;
                return Ok(Prepared {
                    kind: ActionKind::Build,
                    target: build.target(),
                    server,
                    plan: Plan::Build(build),
                });
            }
            ExecuteRequest::Cancel { .. } => {
                return Err(CoreError::Internal("cancel is not a run".to_string()))
            }
            ExecuteRequest::Deploy { deployment_id } => (deployment_id, ActionKind::Deploy),
            ExecuteRequest::StartContainer { deployment_id } => (deployment_id, ActionKind::Start),
            ExecuteRequest::StopContainer { deployment_id } => (deployment_id, ActionKind::Stop),
            ExecuteRequest::RemoveContainer { deployment_id } => {
                (deployment_id, ActionKind::Remove)
            }
            ExecuteRequest::PullImage { deployment_id } => (deployment_id, ActionKind::Pull),
            ExecuteRequest::RecloneRepo { deployment_id } => (deployment_id, ActionKind::Reclone),
            ExecuteRequest::DeleteDeployment { deployment_id } => {
                (deployment_id, ActionKind::FullDelete)
            }
        };

        let deployment = self.registry.get_deployment(&deployment_id).await?;
        let required = if kind == ActionKind::FullDelete {
            PermissionLevel::Update
        } else {
            PermissionLevel::Execute
        };
        self.permissions.require(user, &deployment, required).await?;
        let server = self.registry.get_server(&deployment.server_id).await?;
        let target = deployment.target();

        let plan = match kind {
            ActionKind::Deploy => {
                let (image, version) =
                    deployment::resolve_image(&self.registry, &deployment).await?;
                Plan::Deploy {
                    deployment,
                    image,
                    version,
                }
            }
            ActionKind::Pull => {
                let (image, _) = deployment::resolve_image(&self.registry, &deployment).await?;
                Plan::Container {
                    stage: "pull image",
                    request: deployment::pull_request(image),
                }
            }
            ActionKind::Reclone => Plan::Container {
                stage: "clone repo",
                request: deployment::reclone_request(&deployment)?,
            },
            ActionKind::FullDelete => Plan::FullDelete(deployment),
            kind => Plan::Container {
                stage: deployment::container_stage(kind),
                request: deployment::container_request(kind, &deployment)?,
            },
        };

        Ok(Prepared {
            kind,
            target,
            server,
            plan,
        })
    }

    async fn start(&self, user: &User, prepared: Prepared) -> Result<ActionHandle, CoreError> {
        let Prepared {
            kind,
            target,
            server,
            plan,
        } = prepared;

        let guard = self
            .states
            .acquire(&target.id, kind)
            .ok_or_else(|| CoreError::ActionInProgress {
                target: target.clone(),
                action: kind,
            })?;
        // a delete may have won the race for the slot
        self.registry.resource(&target).await?;

        // the guard releases the slot if opening the update fails
        let update_id = self
            .updates
            .open(kind.operation(), target.clone(), &user.id)
            .await?;

        if !server.enabled {
            warn!(
                "Rejecting {} on {}: server {} is disabled",
                kind, target, server.name
            );
            let appended = self
                .updates
                .append_stage(
                    &update_id,
                    Log::error("preflight", format!("server {} is disabled", server.name)),
                )
                .await;
            guard.release();
            if let Err(e) = appended {
                error!("Failed to record preflight of update {}: {}", update_id, e);
            }
            // completes even without the preflight stage so the update never stays open
            self.updates.complete(&update_id, false, None).await?;
            return Err(CoreError::PeripheryUnreachable(format!(
                "server {} is disabled",
                server.name
            )));
        }

        info!(
            "Starting {} on {} for user {} (update {})",
            kind, target, user.id, update_id
        );
        let context = ActionContext {
            update_id: update_id.clone(),
            operator: user.id.clone(),
            server,
            cancel: guard.token(),
            registry: self.registry.clone(),
            permissions: self.permissions.clone(),
            updates: self.updates.clone(),
            periphery: self.periphery.clone(),
        };
        let updates = self.updates.clone();
        let task = self.tasks.spawn(finalize(guard, updates, context, plan));

        Ok(ActionHandle { update_id, task })
    }

    /// Cancel every in-flight run and wait for their finalizers
    pub async fn shutdown(&self) {
        let cancelled = self.states.cancel_all();
        if cancelled > 0 {
            info!("Cancelling {} in-flight actions...", cancelled);
        }
        self.tasks.close();
        self.tasks.wait().await;
    }
}

async fn run_plan(context: Arc<ActionContext>, plan: Plan) -> RunResult {
    match plan {
        Plan::Build(build) => build::run_build(&context, build).await,
        Plan::Deploy {
            deployment,
            image,
            version,
        } => deployment::run_deploy(&context, &deployment, image, version).await,
        Plan::Container { stage, request } => {
            context.stage(stage, request).await?;
            Ok(None)
        }
        Plan::FullDelete(deployment) => deployment::run_full_delete(&context, deployment).await,
    }
}

/// Run the pipeline on its own task so a panic surfaces as a join error, then
/// release the slot and complete the update
async fn finalize(
    guard: ActionGuard,
    updates: Arc<UpdateLog>,
    context: ActionContext,
    plan: Plan,
) {
    let context = Arc::new(context);
    let update_id = context.update_id.clone();
    let kind = guard.kind();

    let outcome = match tokio::spawn(run_plan(context.clone(), plan)).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            error!("{} run for update {} panicked", kind, update_id);
            Err(RunError::Error(CoreError::Internal(
                "action panicked".to_string(),
            )))
        }
        Err(e) => Err(RunError::Error(CoreError::Internal(e.to_string()))),
    };

    let trailing = match &outcome {
        Ok(_) | Err(RunError::StageFailed) => None,
        Err(RunError::Cancelled) => Some(Log::error(
            "cancel",
            format!("{} cancelled", kind),
        )),
        Err(RunError::Error(e)) => Some(Log::error("error", e.to_string())),
    };
    if let Some(log) = trailing {
        if let Err(e) = updates.append_stage(&update_id, log).await {
            error!("Failed to record final stage of update {}: {}", update_id, e);
        }
    }

    let (success, version) = match outcome {
        Ok(version) => (true, version),
        Err(_) => (false, None),
    };

    guard.release();
    match updates.complete(&update_id, success, version).await {
        Ok(update) => info!(
            "Finished {} on {} (update {}, success={})",
            kind, update.target, update_id, success
        ),
        Err(e) => error!("Failed to complete update {}: {}", update_id, e),
    }
}
