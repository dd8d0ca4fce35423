//! Document collections
//!
//! The core treats its store as a set of CRUD-capable document collections
//! keyed by id. [`MemoryCollection`] keeps documents in insertion order;
//! the JSON adapter in [`crate::storage::json`] snapshots the same state to disk.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::CoreError;
use crate::models::build::Build;
use crate::models::deployment::Deployment;
use crate::models::permission::Permission;
use crate::models::server::Server;
use crate::models::update::Update;
use crate::models::user::User;

/// A value stored in a collection, keyed by id
pub trait Document: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> &str;
}

macro_rules! impl_document {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Document for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

impl_document!(Server, Build, Deployment, Update, Permission, User);

/// CRUD access to one collection of documents
#[async_trait]
pub trait Collection<T: Document>: Send + Sync {
    /// Get a document by id
    async fn get(&self, id: &str) -> Result<Option<T>, CoreError>;

    /// All documents, in insertion order
    async fn list(&self) -> Result<Vec<T>, CoreError>;

    /// Insert a new document. Fails if the id is taken.
    async fn insert(&self, doc: T) -> Result<(), CoreError>;

    /// Replace an existing document. Fails if the id is unknown.
    async fn replace(&self, doc: T) -> Result<(), CoreError>;

    /// Insert or replace
    async fn upsert(&self, doc: T) -> Result<(), CoreError>;

    /// Delete a document, returning it if it existed
    async fn delete(&self, id: &str) -> Result<Option<T>, CoreError>;

    /// Read, modify and write back one document as a single step. Nothing is
    /// stored when `mutation` fails. Returns the stored document.
    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, CoreError>;
}

/// Shared handle to a collection
pub type CollectionRef<T> = Arc<dyn Collection<T>>;

/// In-place edit applied by [`Collection::update`]
pub type Mutation<'a, T> = Box<dyn FnOnce(&mut T) -> Result<(), CoreError> + Send + 'a>;

/// Ordered document list shared by the collection adapters
#[derive(Debug, Clone)]
pub(crate) struct Documents<T> {
    pub(crate) name: String,
    pub(crate) docs: Vec<T>,
}

impl<T: Document> Documents<T> {
    pub(crate) fn new(name: &str, docs: Vec<T>) -> Self {
        Self {
            name: name.to_string(),
            docs,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|doc| doc.id() == id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub(crate) fn duplicate(&self, id: &str) -> CoreError {
        CoreError::StorageError(format!("{} already contains {}", self.name, id))
    }

    pub(crate) fn missing(&self, id: &str) -> CoreError {
        CoreError::ResourceNotFound(format!("{} has no entry {}", self.name, id))
    }

    pub(crate) fn get(&self, id: &str) -> Option<T> {
        self.position(id).map(|i| self.docs[i].clone())
    }

    pub(crate) fn insert(&mut self, doc: T) -> Result<(), CoreError> {
        if self.contains(doc.id()) {
            return Err(self.duplicate(doc.id()));
        }
        self.docs.push(doc);
        Ok(())
    }

    pub(crate) fn replace(&mut self, doc: T) -> Result<(), CoreError> {
        match self.position(doc.id()) {
            Some(i) => {
                self.docs[i] = doc;
                Ok(())
            }
            None => Err(self.missing(doc.id())),
        }
    }

    pub(crate) fn upsert(&mut self, doc: T) {
        match self.position(doc.id()) {
            Some(i) => self.docs[i] = doc,
            None => self.docs.push(doc),
        }
    }

    pub(crate) fn delete(&mut self, id: &str) -> Option<T> {
        self.position(id).map(|i| self.docs.remove(i))
    }

    /// The document `mutation` makes of entry `id`, without storing it
    pub(crate) fn updated(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, CoreError> {
        let mut doc = self.get(id).ok_or_else(|| self.missing(id))?;
        mutation(&mut doc)?;
        if doc.id() != id {
            return Err(CoreError::ValidationError(format!(
                "update of {} entry {} changed its id",
                self.name, id
            )));
        }
        Ok(doc)
    }

    pub(crate) fn update(&mut self, id: &str, mutation: Mutation<'_, T>) -> Result<T, CoreError> {
        let doc = self.updated(id, mutation)?;
        self.upsert(doc.clone());
        Ok(doc)
    }
}

/// In-memory collection
pub struct MemoryCollection<T> {
    state: RwLock<Documents<T>>,
}

impl<T: Document> MemoryCollection<T> {
    /// Create an empty collection
    pub fn new(name: &str) -> Self {
        Self::with_documents(name, Vec::new())
    }

    /// Create a collection seeded with documents
    pub fn with_documents(name: &str, docs: Vec<T>) -> Self {
        Self {
            state: RwLock::new(Documents::new(name, docs)),
        }
    }

    /// Create an empty collection behind a shared handle
    pub fn shared(name: &str) -> CollectionRef<T> {
        Arc::new(Self::new(name))
    }
}

#[async_trait]
impl<T: Document> Collection<T> for MemoryCollection<T> {
    async fn get(&self, id: &str) -> Result<Option<T>, CoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.get(id))
    }

    async fn list(&self) -> Result<Vec<T>, CoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.docs.clone())
    }

    async fn insert(&self, doc: T) -> Result<(), CoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.insert(doc)
    }

    async fn replace(&self, doc: T) -> Result<(), CoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.replace(doc)
    }

    async fn upsert(&self, doc: T) -> Result<(), CoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.upsert(doc);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<T>, CoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        Ok(state.delete(id))
    }

    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, CoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.update(id, mutation)
    }
}
