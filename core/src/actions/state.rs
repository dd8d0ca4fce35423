//! Action state registry
//!
//! Single-flight bookkeeping per (resource id, action kind). A slot is either
//! free or held by exactly one run; acquiring a held slot fails immediately.
//! Every held slot owns a cancellation token the run observes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::update::Operation;

/// Category of action, the second half of a slot key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Build,
    Deploy,
    Start,
    Stop,
    Remove,
    Pull,
    Reclone,
    FullDelete,
}

impl ActionKind {
    /// Action kind locked by an execute operation
    pub fn for_operation(operation: Operation) -> Option<Self> {
        match operation {
            Operation::RunBuild => Some(ActionKind::Build),
            Operation::Deploy => Some(ActionKind::Deploy),
            Operation::StartContainer => Some(ActionKind::Start),
            Operation::StopContainer => Some(ActionKind::Stop),
            Operation::RemoveContainer => Some(ActionKind::Remove),
            Operation::PullImage => Some(ActionKind::Pull),
            Operation::RecloneRepo => Some(ActionKind::Reclone),
            Operation::DeleteDeployment => Some(ActionKind::FullDelete),
            _ => None,
        }
    }

    /// Execute operation recorded for this kind
    pub fn operation(&self) -> Operation {
        match self {
            ActionKind::Build => Operation::RunBuild,
            ActionKind::Deploy => Operation::Deploy,
            ActionKind::Start => Operation::StartContainer,
            ActionKind::Stop => Operation::StopContainer,
            ActionKind::Remove => Operation::RemoveContainer,
            ActionKind::Pull => Operation::PullImage,
            ActionKind::Reclone => Operation::RecloneRepo,
            ActionKind::FullDelete => Operation::DeleteDeployment,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Read view of the slots held on one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStateFlags {
    pub building: bool,
    pub deploying: bool,
    pub removing: bool,
    pub starting: bool,
    pub stopping: bool,
    pub pulling: bool,
    pub recloning: bool,
    pub full_deleting: bool,
}

impl ActionStateFlags {
    fn set(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Build => self.building = true,
            ActionKind::Deploy => self.deploying = true,
            ActionKind::Start => self.starting = true,
            ActionKind::Stop => self.stopping = true,
            ActionKind::Remove => self.removing = true,
            ActionKind::Pull => self.pulling = true,
            ActionKind::Reclone => self.recloning = true,
            ActionKind::FullDelete => self.full_deleting = true,
        }
    }

    /// Whether any action is in flight
    pub fn any(&self) -> bool {
        *self != ActionStateFlags::default()
    }
}

type SlotKey = (String, ActionKind);

struct Slot {
    id: u64,
    token: CancellationToken,
}

/// Registry of in-flight actions
#[derive(Default)]
pub struct ActionStates {
    slots: Mutex<HashMap<SlotKey, Slot>>,
    next_id: AtomicU64,
}

impl ActionStates {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(resource_id: &str, kind: ActionKind) -> SlotKey {
        (resource_id.to_string(), kind)
    }

    fn take_slot(&self, resource_id: &str, kind: ActionKind) -> Option<(u64, CancellationToken)> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(resource_id, kind);
        if slots.contains_key(&key) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        slots.insert(
            key,
            Slot {
                id,
                token: token.clone(),
            },
        );
        debug!("Acquired {} slot on {}", kind, resource_id);
        Some((id, token))
    }

    /// Test and set the slot. Returns `false` when it is already held.
    pub fn try_acquire(&self, resource_id: &str, kind: ActionKind) -> bool {
        self.take_slot(resource_id, kind).is_some()
    }

    /// Acquire the slot behind a guard that releases it on drop
    pub fn acquire(self: &Arc<Self>, resource_id: &str, kind: ActionKind) -> Option<ActionGuard> {
        let (slot_id, token) = self.take_slot(resource_id, kind)?;
        Some(ActionGuard {
            states: Arc::clone(self),
            resource_id: resource_id.to_string(),
            kind,
            slot_id,
            token,
            released: false,
        })
    }

    /// Clear the slot unconditionally
    pub fn release(&self, resource_id: &str, kind: ActionKind) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.remove(&Self::key(resource_id, kind)).is_some() {
            debug!("Released {} slot on {}", kind, resource_id);
        }
    }

    fn release_slot(&self, resource_id: &str, kind: ActionKind, slot_id: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(resource_id, kind);
        if slots.get(&key).map(|slot| slot.id) == Some(slot_id) {
            slots.remove(&key);
            debug!("Released {} slot on {}", kind, resource_id);
        }
    }

    /// Whether the slot is held
    pub fn is_busy(&self, resource_id: &str, kind: ActionKind) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.contains_key(&Self::key(resource_id, kind))
    }

    /// Signal the run holding the slot. Returns `false` when nothing is in flight.
    pub fn cancel(&self, resource_id: &str, kind: ActionKind) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(&Self::key(resource_id, kind)) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every in-flight run, returning how many were signalled
    pub fn cancel_all(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for slot in slots.values() {
            slot.token.cancel();
        }
        slots.len()
    }

    /// Flags of every slot held on a resource
    pub fn flags(&self, resource_id: &str) -> ActionStateFlags {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut flags = ActionStateFlags::default();
        for (id, kind) in slots.keys() {
            if id == resource_id {
                flags.set(*kind);
            }
        }
        flags
    }

    /// Number of held slots
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A held slot. Dropping the guard releases it.
pub struct ActionGuard {
    states: Arc<ActionStates>,
    resource_id: String,
    kind: ActionKind,
    slot_id: u64,
    token: CancellationToken,
    released: bool,
}

impl ActionGuard {
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Token cancelled by [`ActionStates::cancel`]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Release the slot now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.states
                .release_slot(&self.resource_id, self.kind, self.slot_id);
        }
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
