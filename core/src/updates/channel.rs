//! Update broadcaster
//!
//! Fan-out of update events to live subscribers over a bounded
//! `tokio::sync::broadcast` channel. Delivery is best effort: a subscriber
//! that falls behind skips the events it missed and can reconcile through
//! the update log.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::update::{Log, Operation, ResourceTarget, Update, UpdateStatus};
use crate::models::version::Version;

/// One change to an update, as seen by subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub update_id: String,
    pub operation: Operation,
    pub target: ResourceTarget,
    pub operator: String,
    pub status: UpdateStatus,
    pub complete: bool,
    pub success: bool,
    #[serde(default)]
    pub version: Option<Version>,

    /// The appended stage, for stage increments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Log>,
}

impl UpdateEvent {
    pub fn from_update(update: &Update, stage: Option<Log>) -> Self {
        Self {
            update_id: update.id.clone(),
            operation: update.operation,
            target: update.target.clone(),
            operator: update.operator.clone(),
            status: update.status,
            complete: update.is_complete(),
            success: update.success,
            version: update.version,
            stage,
        }
    }
}

/// Publish side of the broadcaster
pub struct UpdateChannel {
    tx: broadcast::Sender<UpdateEvent>,
}

impl UpdateChannel {
    /// Create a channel buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send an event to every subscriber. Returns the number of receivers.
    pub fn publish(&self, event: UpdateEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events of the given operations; empty means all
    pub fn subscribe(&self, operations: Vec<Operation>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            operations,
        }
    }

    /// Run `handler` for every matching event until the returned handle is
    /// dropped or [`Unsubscribe::unsubscribe`] is called
    pub fn subscribe_with<F>(&self, operations: Vec<Operation>, handler: F) -> Unsubscribe
    where
        F: Fn(UpdateEvent) + Send + Sync + 'static,
    {
        let mut subscription = self.subscribe(operations);
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        });
        Unsubscribe { handle }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for UpdateChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receive side of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<UpdateEvent>,
    operations: Vec<Operation>,
}

impl Subscription {
    fn matches(&self, event: &UpdateEvent) -> bool {
        self.operations.is_empty() || self.operations.contains(&event.operation)
    }

    /// Next matching event, or `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Update subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Handle of a callback subscription
pub struct Unsubscribe {
    handle: JoinHandle<()>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
