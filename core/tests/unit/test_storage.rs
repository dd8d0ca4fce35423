//! Storage adapter tests

use std::path::PathBuf;
use std::sync::Arc;

use dockhand::errors::CoreError;
use dockhand::filesys::file::File;
use dockhand::models::update::{Operation, ResourceTarget, Update};
use dockhand::models::user::User;
use dockhand::storage::collection::{Collection, CollectionRef};
use dockhand::storage::journal::JournalCollection;
use dockhand::storage::json::JsonCollection;
use dockhand::updates::channel::UpdateChannel;
use dockhand::updates::log::{UpdateLog, UpdateQuery};
use dockhand::storage::layout::StorageLayout;
use dockhand::storage::settings::Settings;
use dockhand::utils::generate_uuid;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dockhand-test-{}", generate_uuid()))
}

#[tokio::test]
async fn test_json_collection_survives_reopen() {
    let dir = scratch_dir();
    let layout = StorageLayout::new(&dir);
    let file = layout.collection_file(&PathBuf::from("data"), "users");

    let users = JsonCollection::<User>::open("users", file.clone()).await.unwrap();
    users.insert(User::new("u1", "alice", false)).await.unwrap();
    users.insert(User::new("u2", "bob", true)).await.unwrap();
    let mut carol = User::new("u3", "carol", false);
    users.insert(carol.clone()).await.unwrap();
    carol.enabled = false;
    users.replace(carol).await.unwrap();
    users.delete("u2").await.unwrap();
    drop(users);

    let reopened = JsonCollection::<User>::open("users", file).await.unwrap();
    let listed = reopened.list().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|user| user.id.as_str()).collect();
    assert_eq!(ids, vec!["u1", "u3"]);
    assert!(!reopened.get("u3").await.unwrap().unwrap().enabled);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_json_collection_rejects_duplicates_and_unknown_ids() {
    let dir = scratch_dir();
    let file = File::new(dir.join("users.json"));
    let users = JsonCollection::<User>::open("users", file).await.unwrap();

    users.insert(User::new("u1", "alice", false)).await.unwrap();
    assert!(matches!(
        users.insert(User::new("u1", "again", false)).await,
        Err(CoreError::StorageError(_))
    ));
    assert!(matches!(
        users.replace(User::new("u9", "ghost", false)).await,
        Err(CoreError::ResourceNotFound(_))
    ));
    assert!(users.delete("u9").await.unwrap().is_none());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_corrupt_snapshot_is_a_storage_error() {
    let dir = scratch_dir();
    let file = File::new(dir.join("users.json"));
    file.write_atomic(b"{ not json").await.unwrap();

    let opened = JsonCollection::<User>::open("users", file).await;
    assert!(matches!(opened, Err(CoreError::StorageError(_))));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

/// A path whose parent is a regular file, so every write to it fails
async fn unwritable(dir: &PathBuf, name: &str) -> File {
    let blocker = File::new(dir.join("blocker"));
    blocker.write_atomic(b"").await.unwrap();
    File::new(blocker.path().join(name))
}

#[tokio::test]
async fn test_failed_snapshot_write_leaves_memory_unchanged() {
    let dir = scratch_dir();
    let file = unwritable(&dir, "users.json").await;
    let users = JsonCollection::<User>::open("users", file).await.unwrap();

    assert!(matches!(
        users.insert(User::new("u1", "alice", false)).await,
        Err(CoreError::StorageError(_))
    ));
    assert!(users.get("u1").await.unwrap().is_none());
    assert!(users.list().await.unwrap().is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_failed_journal_append_leaves_memory_unchanged() {
    let dir = scratch_dir();
    let file = unwritable(&dir, "users.jsonl").await;
    let users = JournalCollection::<User>::open("users", file.clone())
        .await
        .unwrap();

    assert!(users.insert(User::new("u1", "alice", false)).await.is_err());
    assert!(users.get("u1").await.unwrap().is_none());

    // once the disk recovers, only the accepted document is stored
    tokio::fs::remove_file(dir.join("blocker")).await.unwrap();
    users.insert(User::new("u2", "bob", false)).await.unwrap();
    drop(users);
    let reopened = JournalCollection::<User>::open("users", file).await.unwrap();
    let ids: Vec<String> = reopened
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.id)
        .collect();
    assert_eq!(ids, vec!["u2"]);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_failed_open_leaves_no_update_behind() {
    let dir = scratch_dir();
    let file = unwritable(&dir, "updates.jsonl").await;
    let updates: CollectionRef<Update> = JournalCollection::shared("updates", file).await.unwrap();
    let log = UpdateLog::new(updates, Arc::new(UpdateChannel::new(16)), 100);

    let opened = log
        .open(Operation::Deploy, ResourceTarget::deployment("d1"), "alice")
        .await;
    assert!(opened.is_err());
    let page = log.list(&UpdateQuery::default(), |_| true).await.unwrap();
    assert!(page.updates.is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

async fn append_concurrently(users: CollectionRef<User>, writers: usize) -> String {
    users.insert(User::new("u1", "", false)).await.unwrap();
    let tasks: Vec<_> = (0..writers)
        .map(|_| {
            let users = users.clone();
            tokio::spawn(async move {
                users
                    .update(
                        "u1",
                        Box::new(|user: &mut User| {
                            user.username.push('x');
                            Ok(())
                        }),
                    )
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    users.get("u1").await.unwrap().unwrap().username
}

#[tokio::test]
async fn test_concurrent_updates_are_not_lost() {
    let dir = scratch_dir();
    let snapshot: CollectionRef<User> =
        JsonCollection::shared("users", File::new(dir.join("users.json")))
            .await
            .unwrap();
    assert_eq!(append_concurrently(snapshot, 32).await.len(), 32);

    let journal: CollectionRef<User> =
        JournalCollection::shared("users", File::new(dir.join("users.jsonl")))
            .await
            .unwrap();
    assert_eq!(append_concurrently(journal, 32).await.len(), 32);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_settings_file_defaults() {
    let dir = scratch_dir();
    let layout = StorageLayout::new(&dir);
    let settings_file = layout.settings_file();
    settings_file
        .write_atomic(br#"{ "jwt_secret": "s3cret", "server": { "port": 9500 } }"#)
        .await
        .unwrap();

    let settings = settings_file.read_json::<Settings>().await.unwrap();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.server.port, 9500);
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.updates_page_size, 100);
    assert_eq!(settings.data_dir, Some(PathBuf::from("data")));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
