//! Update log tests

use std::sync::Arc;
use std::time::Duration;

use dockhand::errors::CoreError;
use dockhand::models::update::{Log, Operation, ResourceTarget, UpdateStatus};
use dockhand::models::version::Version;
use dockhand::storage::collection::MemoryCollection;
use dockhand::updates::channel::UpdateChannel;
use dockhand::updates::log::{UpdateLog, UpdateQuery};

fn update_log(page_size: usize) -> (UpdateLog, Arc<UpdateChannel>) {
    let channel = Arc::new(UpdateChannel::default());
    let log = UpdateLog::new(
        MemoryCollection::shared("updates"),
        channel.clone(),
        page_size,
    );
    (log, channel)
}

#[tokio::test]
async fn test_complete_is_idempotent_for_identical_outcome() {
    let (log, _) = update_log(10);
    let id = log
        .open(Operation::RunBuild, ResourceTarget::build("b1"), "alice")
        .await
        .unwrap();

    let version = Some(Version::new(0, 0, 1));
    let first = log.complete(&id, true, version).await.unwrap();
    assert_eq!(first.status, UpdateStatus::Complete);
    assert!(first.end_ts.is_some());

    let again = log.complete(&id, true, version).await.unwrap();
    assert_eq!(again, first);

    let conflicting = log.complete(&id, false, None).await;
    assert!(matches!(
        conflicting,
        Err(CoreError::UpdateAlreadyComplete(_))
    ));
}

#[tokio::test]
async fn test_stages_are_rejected_after_completion() {
    let (log, _) = update_log(10);
    let id = log
        .open(Operation::Deploy, ResourceTarget::deployment("d1"), "alice")
        .await
        .unwrap();
    log.append_stage(&id, Log::simple("deploy container", "ok"))
        .await
        .unwrap();
    log.complete(&id, true, None).await.unwrap();

    let late = log.append_stage(&id, Log::simple("late", "")).await;
    assert!(matches!(late, Err(CoreError::UpdateAlreadyComplete(_))));
    assert_eq!(log.get(&id).await.unwrap().logs.len(), 1);
}

#[tokio::test]
async fn test_record_completes_with_the_stage_outcome() {
    let (log, _) = update_log(10);
    let ok = log
        .record(
            Operation::CreateServer,
            ResourceTarget::server("s1"),
            "admin",
            Log::simple("create", "created"),
        )
        .await
        .unwrap();
    assert!(ok.is_complete());
    assert!(ok.success);

    let failed = log
        .record(
            Operation::UpdateServer,
            ResourceTarget::server("s1"),
            "admin",
            Log::error("update", "nope"),
        )
        .await
        .unwrap();
    assert!(!failed.success);
}

#[tokio::test]
async fn test_list_is_newest_first_and_paginated() {
    let (log, _) = update_log(2);
    let mut ids = Vec::new();
    for i in 0..5 {
        let id = log
            .open(
                Operation::StartContainer,
                ResourceTarget::deployment(format!("d{}", i % 2)),
                "alice",
            )
            .await
            .unwrap();
        ids.push(id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let first = log.list(&UpdateQuery::default(), |_| true).await.unwrap();
    assert_eq!(first.updates.len(), 2);
    assert_eq!(first.updates[0].id, ids[4]);
    assert_eq!(first.updates[1].id, ids[3]);
    assert_eq!(first.next_page, Some(1));

    let last = log
        .list(
            &UpdateQuery {
                page: 2,
                ..Default::default()
            },
            |_| true,
        )
        .await
        .unwrap();
    assert_eq!(last.updates.len(), 1);
    assert_eq!(last.updates[0].id, ids[0]);
    assert_eq!(last.next_page, None);

    let d0 = log
        .list(
            &UpdateQuery {
                target: Some(ResourceTarget::deployment("d0")),
                ..Default::default()
            },
            |_| true,
        )
        .await
        .unwrap();
    assert_eq!(d0.updates.len(), 2);
    assert!(d0
        .updates
        .iter()
        .all(|update| update.target == ResourceTarget::deployment("d0")));
}

#[tokio::test]
async fn test_events_follow_the_update_lifecycle() {
    let (log, channel) = update_log(10);
    let mut subscription = channel.subscribe(vec![Operation::RunBuild]);

    // filtered out by the subscription
    log.record(
        Operation::CreateBuild,
        ResourceTarget::build("b1"),
        "alice",
        Log::simple("create", ""),
    )
    .await
    .unwrap();

    let id = log
        .open(Operation::RunBuild, ResourceTarget::build("b1"), "alice")
        .await
        .unwrap();
    log.append_stage(&id, Log::simple("clone repo", "cloned"))
        .await
        .unwrap();
    log.complete(&id, true, Some(Version::new(0, 0, 1)))
        .await
        .unwrap();

    let opened = subscription.recv().await.unwrap();
    assert_eq!(opened.update_id, id);
    assert!(!opened.complete);
    assert!(opened.stage.is_none());

    let stage = subscription.recv().await.unwrap();
    assert_eq!(stage.stage.unwrap().stage, "clone repo");

    let completed = subscription.recv().await.unwrap();
    assert!(completed.complete);
    assert!(completed.success);
    assert_eq!(completed.operator, "alice");
    assert_eq!(completed.version, Some(Version::new(0, 0, 1)));
}

#[tokio::test]
async fn test_reconcile_fails_interrupted_updates() {
    let (log, _) = update_log(10);
    let open = log
        .open(Operation::Deploy, ResourceTarget::deployment("d1"), "alice")
        .await
        .unwrap();
    let done = log
        .open(Operation::Deploy, ResourceTarget::deployment("d2"), "alice")
        .await
        .unwrap();
    log.complete(&done, true, None).await.unwrap();

    assert_eq!(log.reconcile_interrupted().await.unwrap(), 1);

    let update = log.get(&open).await.unwrap();
    assert!(update.is_complete());
    assert!(!update.success);
    assert_eq!(update.logs.last().unwrap().stage, "interrupted");
    assert!(log.get(&done).await.unwrap().success);
    assert_eq!(log.reconcile_interrupted().await.unwrap(), 0);
}
