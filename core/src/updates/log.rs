//! Update log
//!
//! Append-only store of [`Update`] records. Every mutation goes through one
//! lock and is published on the [`UpdateChannel`] while the lock is held, so
//! subscribers observe `open -> stage* -> complete` for each update.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::update::{Log, Operation, ResourceTarget, Update, UpdateStatus};
use crate::models::version::Version;
use crate::storage::collection::CollectionRef;
use crate::updates::channel::{UpdateChannel, UpdateEvent};
use crate::utils::{generate_uuid, now};

/// Filter and page of an update listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQuery {
    #[serde(default)]
    pub target: Option<ResourceTarget>,

    /// Operations to include; empty means all
    #[serde(default)]
    pub operations: Vec<Operation>,

    #[serde(default)]
    pub operator: Option<String>,

    /// Zero based page index
    #[serde(default)]
    pub page: usize,
}

impl UpdateQuery {
    fn matches(&self, update: &Update) -> bool {
        if let Some(target) = &self.target {
            if &update.target != target {
                return false;
            }
        }
        if !self.operations.is_empty() && !self.operations.contains(&update.operation) {
            return false;
        }
        if let Some(operator) = &self.operator {
            if &update.operator != operator {
                return false;
            }
        }
        true
    }
}

/// One page of updates, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePage {
    pub updates: Vec<Update>,
    pub next_page: Option<usize>,
}

/// The audit log of operations
pub struct UpdateLog {
    updates: CollectionRef<Update>,
    channel: Arc<UpdateChannel>,
    page_size: usize,
    write_lock: Mutex<()>,
}

impl UpdateLog {
    pub fn new(updates: CollectionRef<Update>, channel: Arc<UpdateChannel>, page_size: usize) -> Self {
        Self {
            updates,
            channel,
            page_size: page_size.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn channel(&self) -> &Arc<UpdateChannel> {
        &self.channel
    }

    async fn load(&self, update_id: &str) -> Result<Update, CoreError> {
        self.updates
            .get(update_id)
            .await?
            .ok_or_else(|| CoreError::ResourceNotFound(format!("update {}", update_id)))
    }

    /// Open a new in-progress update
    pub async fn open(
        &self,
        operation: Operation,
        target: ResourceTarget,
        operator: &str,
    ) -> Result<String, CoreError> {
        let _lock = self.write_lock.lock().await;
        let update = Update {
            id: generate_uuid(),
            operation,
            target,
            operator: operator.to_string(),
            start_ts: now(),
            end_ts: None,
            status: UpdateStatus::InProgress,
            success: false,
            logs: Vec::new(),
            version: None,
        };
        self.updates.insert(update.clone()).await?;
        debug!("Opened update {} ({} on {})", update.id, operation, update.target);
        self.channel.publish(UpdateEvent::from_update(&update, None));
        Ok(update.id)
    }

    /// Append a log stage to an in-progress update
    pub async fn append_stage(&self, update_id: &str, log: Log) -> Result<(), CoreError> {
        let _lock = self.write_lock.lock().await;
        let mut update = self.load(update_id).await?;
        if update.is_complete() {
            return Err(CoreError::UpdateAlreadyComplete(format!(
                "cannot append stage {} to update {}",
                log.stage, update_id
            )));
        }
        update.logs.push(log.clone());
        self.updates.replace(update.clone()).await?;
        self.channel.publish(UpdateEvent::from_update(&update, Some(log)));
        Ok(())
    }

    /// Mark an update complete. Completing again with the same outcome is a
    /// no-op; completing with a different outcome is rejected.
    pub async fn complete(
        &self,
        update_id: &str,
        success: bool,
        version: Option<Version>,
    ) -> Result<Update, CoreError> {
        let _lock = self.write_lock.lock().await;
        let mut update = self.load(update_id).await?;
        if update.is_complete() {
            if update.success == success && update.version == version {
                return Ok(update);
            }
            return Err(CoreError::UpdateAlreadyComplete(format!(
                "update {} already completed with success={}",
                update_id, update.success
            )));
        }
        update.status = UpdateStatus::Complete;
        update.success = success;
        update.version = version;
        update.end_ts = Some(now());
        self.updates.replace(update.clone()).await?;
        debug!(
            "Completed update {} ({} on {}, success={})",
            update.id, update.operation, update.target, success
        );
        self.channel.publish(UpdateEvent::from_update(&update, None));
        Ok(update)
    }

    /// Record an operation that finished synchronously
    pub async fn record(
        &self,
        operation: Operation,
        target: ResourceTarget,
        operator: &str,
        log: Log,
    ) -> Result<Update, CoreError> {
        let success = !log.is_error;
        let update_id = self.open(operation, target, operator).await?;
        self.append_stage(&update_id, log).await?;
        self.complete(&update_id, success, None).await
    }

    /// Get an update by id
    pub async fn get(&self, update_id: &str) -> Result<Update, CoreError> {
        self.load(update_id).await
    }

    /// List updates matching `query` and `visible`, newest first
    pub async fn list<F>(&self, query: &UpdateQuery, visible: F) -> Result<UpdatePage, CoreError>
    where
        F: Fn(&Update) -> bool,
    {
        let mut updates: Vec<Update> = self
            .updates
            .list()
            .await?
            .into_iter()
            .filter(|update| query.matches(update) && visible(update))
            .collect();
        // insertion order breaks ties between equal start timestamps
        updates.reverse();
        updates.sort_by(|a, b| b.start_ts.cmp(&a.start_ts));

        let start = query.page.saturating_mul(self.page_size);
        let total = updates.len();
        let page: Vec<Update> = updates.into_iter().skip(start).take(self.page_size).collect();
        let next_page = if start + page.len() < total {
            Some(query.page + 1)
        } else {
            None
        };
        Ok(UpdatePage {
            updates: page,
            next_page,
        })
    }

    /// Fail every update left in progress by a previous process lifetime
    pub async fn reconcile_interrupted(&self) -> Result<usize, CoreError> {
        let interrupted: Vec<Update> = self
            .updates
            .list()
            .await?
            .into_iter()
            .filter(|update| !update.is_complete())
            .collect();
        for update in &interrupted {
            warn!(
                "Update {} ({} on {}) was interrupted by a restart",
                update.id, update.operation, update.target
            );
            self.append_stage(
                &update.id,
                Log::error("interrupted", "core restarted while the operation was in progress"),
            )
            .await?;
            self.complete(&update.id, false, None).await?;
        }
        if !interrupted.is_empty() {
            info!("Reconciled {} interrupted updates", interrupted.len());
        }
        Ok(interrupted.len())
    }
}
