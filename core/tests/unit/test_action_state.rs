//! Action state registry tests

use std::sync::Arc;

use dockhand::actions::state::{ActionKind, ActionStates};

#[test]
fn test_slot_is_single_flight() {
    let states = ActionStates::new();
    assert!(states.try_acquire("d1", ActionKind::Deploy));
    assert!(!states.try_acquire("d1", ActionKind::Deploy));

    // other kinds and other resources are independent
    assert!(states.try_acquire("d1", ActionKind::Stop));
    assert!(states.try_acquire("d2", ActionKind::Deploy));
    assert_eq!(states.len(), 3);

    states.release("d1", ActionKind::Deploy);
    assert!(states.try_acquire("d1", ActionKind::Deploy));
}

#[test]
fn test_guard_releases_on_drop() {
    let states = Arc::new(ActionStates::new());
    {
        let guard = states.acquire("b1", ActionKind::Build).unwrap();
        assert_eq!(guard.resource_id(), "b1");
        assert!(states.is_busy("b1", ActionKind::Build));
        assert!(states.acquire("b1", ActionKind::Build).is_none());
    }
    assert!(!states.is_busy("b1", ActionKind::Build));
    assert!(states.is_empty());
}

#[test]
fn test_stale_guard_does_not_release_newer_slot() {
    let states = Arc::new(ActionStates::new());
    let stale = states.acquire("d1", ActionKind::Start).unwrap();
    states.release("d1", ActionKind::Start);

    let current = states.acquire("d1", ActionKind::Start).unwrap();
    drop(stale);
    assert!(states.is_busy("d1", ActionKind::Start));

    current.release();
    assert!(!states.is_busy("d1", ActionKind::Start));
}

#[test]
fn test_cancel_signals_the_holder() {
    let states = Arc::new(ActionStates::new());
    assert!(!states.cancel("d1", ActionKind::Deploy));

    let guard = states.acquire("d1", ActionKind::Deploy).unwrap();
    let token = guard.token();
    assert!(!token.is_cancelled());
    assert!(states.cancel("d1", ActionKind::Deploy));
    assert!(token.is_cancelled());

    // cancelling does not free the slot, the holder does
    assert!(states.is_busy("d1", ActionKind::Deploy));
    drop(guard);
    assert!(!states.is_busy("d1", ActionKind::Deploy));
}

#[test]
fn test_flags_reflect_held_slots() {
    let states = Arc::new(ActionStates::new());
    let _deploy = states.acquire("d1", ActionKind::Deploy).unwrap();
    let _pull = states.acquire("d1", ActionKind::Pull).unwrap();
    let _other = states.acquire("d2", ActionKind::Remove).unwrap();

    let flags = states.flags("d1");
    assert!(flags.deploying);
    assert!(flags.pulling);
    assert!(!flags.removing);
    assert!(flags.any());
    assert!(!states.flags("d3").any());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_has_one_winner() {
    let states = Arc::new(ActionStates::new());
    let mut tasks = Vec::new();
    for _ in 0..32 {
        let states = states.clone();
        tasks.push(tokio::spawn(async move {
            states.try_acquire("b1", ActionKind::Build)
        }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
