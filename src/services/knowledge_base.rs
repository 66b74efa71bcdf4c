//! Knowledge base: the store and its retrieval index as one owned service.

use crate::models::{IngredientName, IngredientRecord, ScoredDocument};
use crate::storage::{KnowledgeStore, RecordMap, RetrievalIndex};
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Owns the knowledge store and the retrieval index derived from it.
///
/// Shared across concurrent requests behind an `Arc`. Reads go straight to the
/// store or index; [`KnowledgeBase::commit`] serializes the store merge and
/// index insert of each resolution batch.
pub struct KnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
    index: Arc<dyn RetrievalIndex>,
    commit_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Creates a knowledge base without touching the index.
    #[must_use]
    pub fn new(store: Arc<dyn KnowledgeStore>, index: Arc<dyn RetrievalIndex>) -> Self {
        Self {
            store,
            index,
            commit_lock: Mutex::new(()),
        }
    }

    /// Creates a knowledge base and brings the index in line with the store.
    ///
    /// # Errors
    ///
    /// Returns an error if reconciling the index fails.
    pub fn open(store: Arc<dyn KnowledgeStore>, index: Arc<dyn RetrievalIndex>) -> Result<Self> {
        let knowledge = Self::new(store, index);
        knowledge.reconcile()?;
        Ok(knowledge)
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn KnowledgeStore {
        self.store.as_ref()
    }

    /// Returns the underlying index.
    #[must_use]
    pub fn index(&self) -> &dyn RetrievalIndex {
        self.index.as_ref()
    }

    /// Looks up a record by normalized name.
    #[must_use]
    pub fn get(&self, name: &IngredientName) -> Option<IngredientRecord> {
        self.store.get(name)
    }

    /// Returns a copy of every stored record.
    #[must_use]
    pub fn snapshot(&self) -> RecordMap {
        self.store.snapshot()
    }

    /// Ranks indexed documents against `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>> {
        self.index.query(text, top_k)
    }

    /// Durably records a batch of newly resolved entries.
    ///
    /// Merges into the store first, then inserts into the index. Both steps
    /// have completed when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] naming the batch if either step
    /// fails. A store failure leaves the store unchanged; an index failure
    /// leaves the entries in the store, and the next [`Self::reconcile`]
    /// indexes them.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn commit(&self, entries: &RecordMap) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let unpersisted = || {
            entries
                .keys()
                .map(|name| name.as_str().to_string())
                .collect::<Vec<_>>()
        };

        if let Err(e) = self.store.merge(entries) {
            metrics::counter!("knowledge_commits_total", "status" => "store_failed").increment(1);
            tracing::error!(error = %e, "Failed to merge new entries into knowledge store");
            return Err(Error::PersistenceFailed {
                operation: "store_merge".to_string(),
                cause: e.to_string(),
                unpersisted: unpersisted(),
            });
        }

        if let Err(e) = self.index.insert(entries) {
            metrics::counter!("knowledge_commits_total", "status" => "index_failed").increment(1);
            tracing::error!(error = %e, "Failed to index new entries");
            return Err(Error::PersistenceFailed {
                operation: "index_insert".to_string(),
                cause: e.to_string(),
                unpersisted: unpersisted(),
            });
        }

        metrics::counter!("knowledge_commits_total", "status" => "ok").increment(1);
        tracing::info!(
            committed = entries.len(),
            total = self.store.len(),
            "Knowledge base updated"
        );
        Ok(())
    }

    /// Indexes store records whose document is missing or stale.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or saving the index fails.
    pub fn reconcile(&self) -> Result<usize> {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.index.reconcile(&self.store.snapshot())
    }

    /// Rebuilds the index from the full store.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or saving the index fails.
    pub fn rebuild(&self) -> Result<usize> {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.index.rebuild(&self.store.snapshot())
    }
}
