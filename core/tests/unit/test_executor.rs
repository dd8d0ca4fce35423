//! Action executor tests

use std::time::Duration;

use dockhand::actions::executor::{ExecuteRequest, Execution};
use dockhand::actions::state::ActionKind;
use dockhand::api::write::{self, WriteRequest};
use dockhand::app::state::Collections;
use dockhand::errors::CoreError;
use dockhand::models::build::BuildConfig;
use dockhand::models::permission::PermissionLevel;
use dockhand::models::update::{Operation, ResourceTarget, Update, UpdateStatus};
use dockhand::models::version::Version;
use dockhand::models::Resource;
use dockhand::utils::now;

use crate::common::{finish, fixture, fixture_with, started};

fn run_build(id: &str) -> ExecuteRequest {
    ExecuteRequest::RunBuild {
        build_id: id.to_string(),
    }
}

fn stop(id: &str) -> ExecuteRequest {
    ExecuteRequest::StopContainer {
        deployment_id: id.to_string(),
    }
}

fn deploy(id: &str) -> ExecuteRequest {
    ExecuteRequest::Deploy {
        deployment_id: id.to_string(),
    }
}

#[tokio::test]
async fn test_run_build_is_single_flight() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.build("b1", "s1", &fx.alice).await;
    let executor = &fx.state.executor;
    let mut events = fx.state.channel.subscribe(vec![Operation::RunBuild]);

    fx.periphery.hold();
    let handle = started(executor.execute(&fx.alice, run_build("b1")).await.unwrap());
    let update = fx.state.updates.get(&handle.update_id).await.unwrap();
    assert_eq!(update.status, UpdateStatus::InProgress);
    assert!(fx.state.action_states.flags("b1").building);

    let second = executor.execute(&fx.alice, run_build("b1")).await;
    match second {
        Err(CoreError::ActionInProgress { target, action }) => {
            assert_eq!(target, ResourceTarget::build("b1"));
            assert_eq!(action, ActionKind::Build);
        }
        other => panic!("expected ActionInProgress, got {:?}", other),
    }
    assert_eq!(fx.all_updates().await.len(), 1);

    fx.periphery.open();
    let update_id = handle.update_id.clone();
    finish(handle).await;

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.is_complete());
    assert!(update.success);
    assert_eq!(update.version, Some(Version::new(0, 0, 1)));
    let stages: Vec<&str> = update.logs.iter().map(|log| log.stage.as_str()).collect();
    assert_eq!(stages, vec!["clone repo", "docker build"]);

    let build = fx.state.registry.get_build("b1").await.unwrap();
    assert!(build.last_built_at.is_some());
    assert_eq!(build.version, Version::new(0, 0, 1));
    assert!(fx.state.action_states.is_empty());

    let completed = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.complete {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed.operation, Operation::RunBuild);
    assert_eq!(completed.target, ResourceTarget::build("b1"));
    assert!(completed.success);
}

#[tokio::test]
async fn test_failed_stage_releases_the_slot() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.deployment("d1", "s1", &fx.alice).await;
    fx.periphery.fail("StopContainer");

    let handle = started(fx.state.executor.execute(&fx.alice, stop("d1")).await.unwrap());
    let update_id = handle.update_id.clone();
    finish(handle).await;

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.is_complete());
    assert!(!update.success);
    assert!(update.logs[0].is_error);
    assert!(!fx.state.action_states.is_busy("d1", ActionKind::Stop));

    // the next request is accepted
    let handle = started(fx.state.executor.execute(&fx.alice, stop("d1")).await.unwrap());
    finish(handle).await;
    assert_eq!(fx.periphery.calls(), vec!["StopContainer", "StopContainer"]);
}

#[tokio::test]
async fn test_disabled_server_fails_in_the_call() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.deployment("d1", "s1", &fx.alice).await;
    fx.disable_server("s1").await;

    let result = fx.state.executor.execute(&fx.alice, stop("d1")).await;
    assert!(matches!(result, Err(CoreError::PeripheryUnreachable(_))));
    assert!(fx.state.action_states.is_empty());
    assert!(fx.periphery.calls().is_empty());

    let updates = fx.all_updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].operation, Operation::StopContainer);
    assert!(updates[0].is_complete());
    assert!(!updates[0].success);
    assert_eq!(updates[0].logs[0].stage, "preflight");
}

#[tokio::test]
async fn test_permission_denied_creates_no_update() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    let deployment = fx.deployment("d1", "s1", &fx.alice).await;

    let request = ExecuteRequest::DeleteDeployment {
        deployment_id: "d1".to_string(),
    };
    let result = fx.state.executor.execute(&fx.bob, request.clone()).await;
    assert!(matches!(result, Err(CoreError::PermissionDenied(_))));

    // execute is not enough to delete
    fx.state
        .permissions
        .set(&fx.bob.id, deployment.target(), PermissionLevel::Execute)
        .await
        .unwrap();
    let result = fx.state.executor.execute(&fx.bob, request).await;
    assert!(matches!(result, Err(CoreError::PermissionDenied(_))));

    assert!(fx.all_updates().await.is_empty());
    assert!(fx.state.action_states.is_empty());
}

#[tokio::test]
async fn test_read_permission_cannot_execute() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    let deployment = fx.deployment("d1", "s1", &fx.alice).await;
    fx.state
        .permissions
        .set(&fx.bob.id, deployment.target(), PermissionLevel::Read)
        .await
        .unwrap();

    let result = fx.state.executor.execute(&fx.bob, deploy("d1")).await;
    assert!(matches!(result, Err(CoreError::PermissionDenied(_))));

    fx.state
        .permissions
        .set(&fx.bob.id, deployment.target(), PermissionLevel::Execute)
        .await
        .unwrap();
    let handle = started(fx.state.executor.execute(&fx.bob, deploy("d1")).await.unwrap());
    finish(handle).await;
}

#[tokio::test]
async fn test_deploy_uses_the_latest_build() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.build("b1", "s1", &fx.alice).await;
    let mut deployment = fx.deployment("d1", "s1", &fx.alice).await;
    deployment.build_id = Some("b1".to_string());
    fx.state
        .registry
        .deployments
        .replace(deployment)
        .await
        .unwrap();

    // never built
    let result = fx.state.executor.execute(&fx.alice, deploy("d1")).await;
    assert!(matches!(result, Err(CoreError::ValidationError(_))));
    assert!(fx.all_updates().await.is_empty());

    let handle = started(fx.state.executor.execute(&fx.alice, run_build("b1")).await.unwrap());
    finish(handle).await;

    let handle = started(fx.state.executor.execute(&fx.alice, deploy("d1")).await.unwrap());
    let update_id = handle.update_id.clone();
    finish(handle).await;

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.success);
    assert_eq!(update.version, Some(Version::new(0, 0, 1)));
    assert_eq!(update.logs[0].stage, "deploy container");
}

#[tokio::test]
async fn test_cancel_records_a_cancel_stage() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.deployment("d1", "s1", &fx.alice).await;
    let target = ResourceTarget::deployment("d1");

    let nothing = fx
        .state
        .executor
        .execute(
            &fx.alice,
            ExecuteRequest::Cancel {
                target: target.clone(),
                action: ActionKind::Deploy,
            },
        )
        .await;
    assert!(matches!(nothing, Err(CoreError::ValidationError(_))));

    fx.periphery.hold();
    let handle = started(fx.state.executor.execute(&fx.alice, deploy("d1")).await.unwrap());
    let update_id = handle.update_id.clone();

    // bob cannot cancel alice's deployment
    let denied = fx
        .state
        .executor
        .execute(
            &fx.bob,
            ExecuteRequest::Cancel {
                target: target.clone(),
                action: ActionKind::Deploy,
            },
        )
        .await;
    assert!(matches!(denied, Err(CoreError::PermissionDenied(_))));

    let cancelled = fx
        .state
        .executor
        .execute(
            &fx.alice,
            ExecuteRequest::Cancel {
                target: target.clone(),
                action: ActionKind::Deploy,
            },
        )
        .await
        .unwrap();
    assert!(matches!(cancelled, Execution::Cancelled { .. }));
    finish(handle).await;

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.is_complete());
    assert!(!update.success);
    assert_eq!(update.logs.last().unwrap().stage, "cancel");
    assert!(fx.state.action_states.is_empty());
}

#[tokio::test]
async fn test_full_delete_removes_the_deployment() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    let deployment = fx.deployment("d1", "s1", &fx.alice).await;
    fx.state
        .permissions
        .set(&fx.bob.id, deployment.target(), PermissionLevel::Read)
        .await
        .unwrap();

    let handle = started(
        fx.state
            .executor
            .execute(
                &fx.alice,
                ExecuteRequest::DeleteDeployment {
                    deployment_id: "d1".to_string(),
                },
            )
            .await
            .unwrap(),
    );
    let update_id = handle.update_id.clone();
    finish(handle).await;

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.success);
    let stages: Vec<&str> = update.logs.iter().map(|log| log.stage.as_str()).collect();
    assert_eq!(stages, vec!["docker rm", "delete deployment"]);
    assert!(matches!(
        fx.state.registry.get_deployment("d1").await,
        Err(CoreError::ResourceNotFound(_))
    ));
    assert_eq!(
        fx.state
            .permissions
            .resolve(&fx.bob, &deployment)
            .await
            .unwrap(),
        PermissionLevel::None
    );
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_runs() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.build("b1", "s1", &fx.alice).await;

    fx.periphery.hold();
    let handle = started(fx.state.executor.execute(&fx.alice, run_build("b1")).await.unwrap());
    let update_id = handle.update_id.clone();

    tokio::time::timeout(Duration::from_secs(5), fx.state.shutdown())
        .await
        .unwrap()
        .unwrap();

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.is_complete());
    assert!(!update.success);
    assert!(fx.state.action_states.is_empty());
}

#[tokio::test]
async fn test_startup_reconciles_interrupted_updates() {
    let collections = Collections::in_memory();
    let orphan = Update {
        id: "u1".to_string(),
        operation: Operation::Deploy,
        target: ResourceTarget::deployment("d1"),
        operator: "alice".to_string(),
        start_ts: now(),
        end_ts: None,
        status: UpdateStatus::InProgress,
        success: false,
        logs: Vec::new(),
        version: None,
    };
    let updates = collections.updates.clone();
    updates.insert(orphan).await.unwrap();

    let fx = fixture_with(collections).await;
    let update = fx.state.updates.get("u1").await.unwrap();
    assert!(update.is_complete());
    assert!(!update.success);
    assert_eq!(update.logs[0].stage, "interrupted");
}

#[tokio::test]
async fn test_panicking_pipeline_releases_the_slot() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.deployment("d1", "s1", &fx.alice).await;
    fx.periphery.panic_on("StopContainer");

    let handle = started(fx.state.executor.execute(&fx.alice, stop("d1")).await.unwrap());
    let update_id = handle.update_id.clone();
    finish(handle).await;

    let update = fx.state.updates.get(&update_id).await.unwrap();
    assert!(update.is_complete());
    assert!(!update.success);
    let last = update.logs.last().unwrap();
    assert_eq!(last.stage, "error");
    assert!(last.is_error);
    assert!(fx.state.action_states.is_empty());

    // the slot is free for the next run
    let result = fx.state.executor.execute(&fx.alice, stop("d1")).await;
    assert!(matches!(result, Ok(Execution::Started(_))));
}

#[tokio::test]
async fn test_config_update_during_a_build_keeps_the_new_version() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.build("b1", "s1", &fx.alice).await;

    fx.periphery.hold();
    let handle = started(fx.state.executor.execute(&fx.alice, run_build("b1")).await.unwrap());
    let change_branch = WriteRequest::UpdateBuild {
        id: "b1".to_string(),
        config: BuildConfig {
            branch: Some("release".to_string()),
            ..Default::default()
        },
    };
    write::handle(&fx.state, &fx.alice, change_branch).await.unwrap();
    fx.periphery.open();
    finish(handle).await;

    let build = fx.state.registry.get_build("b1").await.unwrap();
    assert_eq!(build.branch, "release");
    assert_eq!(build.version, Version::new(0, 0, 1));

    // a later config write does not roll the version back
    let rename = WriteRequest::UpdateBuild {
        id: "b1".to_string(),
        config: BuildConfig {
            name: Some("renamed".to_string()),
            ..Default::default()
        },
    };
    write::handle(&fx.state, &fx.alice, rename).await.unwrap();
    let build = fx.state.registry.get_build("b1").await.unwrap();
    assert_eq!(build.name, "renamed");
    assert_eq!(build.version, Version::new(0, 0, 1));
}

#[tokio::test]
async fn test_delete_build_holds_the_build_slot() {
    let fx = fixture().await;
    fx.server("s1", &fx.admin).await;
    fx.build("b1", "s1", &fx.alice).await;
    let delete = || WriteRequest::DeleteBuild {
        id: "b1".to_string(),
    };

    let guard = fx
        .state
        .action_states
        .acquire("b1", ActionKind::Build)
        .unwrap();
    let result = write::handle(&fx.state, &fx.alice, delete()).await;
    assert!(matches!(
        result,
        Err(CoreError::ActionInProgress {
            action: ActionKind::Build,
            ..
        })
    ));
    assert!(fx.state.registry.get_build("b1").await.is_ok());
    drop(guard);

    write::handle(&fx.state, &fx.alice, delete()).await.unwrap();
    assert!(fx.state.action_states.is_empty());

    // a run against the deleted build never starts
    let result = fx.state.executor.execute(&fx.alice, run_build("b1")).await;
    assert!(matches!(result, Err(CoreError::ResourceNotFound(_))));
    assert!(fx.state.action_states.is_empty());
}
