//! Append-only journal backed collection
//!
//! Every mutation appends one JSON line, either the whole new document or
//! the id of a deleted one, so a write costs the same however large the
//! collection grows. Opening replays the journal. Once most of its lines are
//! superseded it is rewritten with one line per live document.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::filesys::file::File;
use crate::storage::collection::{Collection, CollectionRef, Document, Documents, Mutation};

/// Journals shorter than this are never compacted
const COMPACT_MIN_ENTRIES: usize = 1024;

/// One journal line
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Entry<T> {
    Put { doc: T },
    Delete { id: String },
}

struct Journal<T> {
    docs: Documents<T>,

    /// Lines in the journal file
    entries: usize,

    /// A failed append may have left a partial line; rewrite before appending
    torn: bool,
}

impl<T: Document> Journal<T> {
    fn apply(&mut self, entry: Entry<T>) {
        match entry {
            Entry::Put { doc } => self.docs.upsert(doc),
            Entry::Delete { id } => {
                self.docs.delete(&id);
            }
        }
        self.entries += 1;
    }

    fn needs_compaction(&self) -> bool {
        self.entries >= COMPACT_MIN_ENTRIES && self.entries > self.docs.docs.len() * 2
    }
}

/// Collection persisted as a JSON lines journal
pub struct JournalCollection<T> {
    file: File,
    state: Mutex<Journal<T>>,
}

impl<T: Document> JournalCollection<T> {
    /// Open a collection, replaying the existing journal if there is one.
    /// A torn last line, left by a crash mid-append, is dropped.
    pub async fn open(name: &str, file: File) -> Result<Self, CoreError> {
        let mut journal = Journal {
            docs: Documents::new(name, Vec::new()),
            entries: 0,
            torn: false,
        };

        if file.exists().await {
            let contents = file.read_string().await?;
            let lines: Vec<&str> = contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect();
            for (i, line) in lines.iter().enumerate() {
                match serde_json::from_str::<Entry<T>>(line) {
                    Ok(entry) => journal.apply(entry),
                    Err(e) if i + 1 == lines.len() => {
                        warn!("Dropping torn last entry of {}: {}", name, e);
                        journal.torn = true;
                    }
                    Err(e) => {
                        return Err(CoreError::StorageError(format!(
                            "unable to load {} from {}: line {}: {}",
                            name,
                            file.path().display(),
                            i + 1,
                            e
                        )))
                    }
                }
            }
        }
        info!(
            "Loaded {} {} from {}",
            journal.docs.docs.len(),
            name,
            file.path().display()
        );

        let collection = Self {
            file,
            state: Mutex::new(journal),
        };
        {
            let mut journal = collection.state.lock().await;
            if journal.torn || journal.needs_compaction() {
                collection.compact(&mut journal).await?;
            }
        }
        Ok(collection)
    }

    /// Open a collection behind a shared handle
    pub async fn shared(name: &str, file: File) -> Result<CollectionRef<T>, CoreError> {
        Ok(Arc::new(Self::open(name, file).await?))
    }

    /// Rewrite the journal as one `put` per live document
    async fn compact(&self, journal: &mut Journal<T>) -> Result<(), CoreError> {
        let mut contents = Vec::new();
        for doc in &journal.docs.docs {
            serde_json::to_writer(&mut contents, &Entry::Put { doc: doc.clone() })?;
            contents.push(b'\n');
        }
        self.file.write_atomic(&contents).await.map_err(|e| {
            CoreError::StorageError(format!("unable to compact {}: {}", journal.docs.name, e))
        })?;
        debug!(
            "Compacted {} journal from {} to {} entries",
            journal.docs.name,
            journal.entries,
            journal.docs.docs.len()
        );
        journal.entries = journal.docs.docs.len();
        journal.torn = false;
        Ok(())
    }

    /// Append `entry` to the journal and then apply it in memory
    async fn write(&self, journal: &mut Journal<T>, entry: Entry<T>) -> Result<(), CoreError> {
        if journal.torn {
            self.compact(journal).await?;
        }
        let line = serde_json::to_vec(&entry)?;
        if let Err(e) = self.file.append_line(&line).await {
            journal.torn = true;
            return Err(CoreError::StorageError(format!(
                "unable to persist {}: {}",
                journal.docs.name, e
            )));
        }
        journal.apply(entry);

        if journal.needs_compaction() {
            if let Err(e) = self.compact(journal).await {
                warn!("{}", e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Document> Collection<T> for JournalCollection<T> {
    async fn get(&self, id: &str) -> Result<Option<T>, CoreError> {
        Ok(self.state.lock().await.docs.get(id))
    }

    async fn list(&self) -> Result<Vec<T>, CoreError> {
        Ok(self.state.lock().await.docs.docs.clone())
    }

    async fn insert(&self, doc: T) -> Result<(), CoreError> {
        let mut journal = self.state.lock().await;
        if journal.docs.contains(doc.id()) {
            return Err(journal.docs.duplicate(doc.id()));
        }
        self.write(&mut journal, Entry::Put { doc }).await
    }

    async fn replace(&self, doc: T) -> Result<(), CoreError> {
        let mut journal = self.state.lock().await;
        if !journal.docs.contains(doc.id()) {
            return Err(journal.docs.missing(doc.id()));
        }
        self.write(&mut journal, Entry::Put { doc }).await
    }

    async fn upsert(&self, doc: T) -> Result<(), CoreError> {
        let mut journal = self.state.lock().await;
        self.write(&mut journal, Entry::Put { doc }).await
    }

    async fn delete(&self, id: &str) -> Result<Option<T>, CoreError> {
        let mut journal = self.state.lock().await;
        let Some(doc) = journal.docs.get(id) else {
            return Ok(None);
        };
        self.write(&mut journal, Entry::Delete { id: id.to_string() })
            .await?;
        Ok(Some(doc))
    }

    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, CoreError> {
        let mut journal = self.state.lock().await;
        let doc = journal.docs.updated(id, mutation)?;
        self.write(&mut journal, Entry::Put { doc: doc.clone() })
            .await?;
        Ok(doc)
    }
}
