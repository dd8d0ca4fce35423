//! JSON file backed collection

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::CoreError;
use crate::filesys::file::File;
use crate::storage::collection::{Collection, CollectionRef, Document, Documents, Mutation};

/// Collection persisted as one JSON array, rewritten atomically after every
/// mutation. The lock is held across the write so snapshots land in mutation
/// order, and memory only changes once the snapshot is on disk.
pub struct JsonCollection<T> {
    file: File,
    state: Mutex<Documents<T>>,
}

impl<T: Document> JsonCollection<T> {
    /// Open a collection, loading the existing snapshot if there is one
    pub async fn open(name: &str, file: File) -> Result<Self, CoreError> {
        let docs = if file.exists().await {
            file.read_json::<Vec<T>>().await.map_err(|e| {
                CoreError::StorageError(format!(
                    "unable to load {} from {}: {}",
                    name,
                    file.path().display(),
                    e
                ))
            })?
        } else {
            Vec::new()
        };
        info!(
            "Loaded {} {} from {}",
            docs.len(),
            name,
            file.path().display()
        );
        Ok(Self {
            file,
            state: Mutex::new(Documents::new(name, docs)),
        })
    }

    /// Open a collection behind a shared handle
    pub async fn shared(name: &str, file: File) -> Result<CollectionRef<T>, CoreError> {
        Ok(Arc::new(Self::open(name, file).await?))
    }

    async fn persist(&self, state: &Documents<T>) -> Result<(), CoreError> {
        debug!("Writing {} snapshot ({} entries)", state.name, state.docs.len());
        self.file
            .write_json(&state.docs)
            .await
            .map_err(|e| CoreError::StorageError(format!("unable to persist {}: {}", state.name, e)))
    }

    /// Apply `change` to a copy, persist the copy and only then make it current
    async fn commit<R, F>(&self, change: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut Documents<T>) -> Result<R, CoreError> + Send,
        R: Send,
    {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        let result = change(&mut staged)?;
        self.persist(&staged).await?;
        *state = staged;
        Ok(result)
    }
}

#[async_trait]
impl<T: Document> Collection<T> for JsonCollection<T> {
    async fn get(&self, id: &str) -> Result<Option<T>, CoreError> {
        Ok(self.state.lock().await.get(id))
    }

    async fn list(&self) -> Result<Vec<T>, CoreError> {
        Ok(self.state.lock().await.docs.clone())
    }

    async fn insert(&self, doc: T) -> Result<(), CoreError> {
        self.commit(|state| state.insert(doc)).await
    }

    async fn replace(&self, doc: T) -> Result<(), CoreError> {
        self.commit(|state| state.replace(doc)).await
    }

    async fn upsert(&self, doc: T) -> Result<(), CoreError> {
        self.commit(|state| {
            state.upsert(doc);
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<Option<T>, CoreError> {
        if self.state.lock().await.get(id).is_none() {
            return Ok(None);
        }
        self.commit(|state| Ok(state.delete(id))).await
    }

    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, CoreError> {
        self.commit(|state| state.update(id, mutation)).await
    }
}
