//! Storage layer abstraction.
//!
//! Two layers:
//! - **Knowledge store**: authoritative name → record mapping (in-memory or JSON file)
//! - **Retrieval index**: embedding similarity search derived from the store

// Allow cast precision loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - holding the lock across a short write is intended.
#![allow(clippy::significant_drop_tightening)]

mod atomic;
pub mod index;
pub mod knowledge;

pub use index::VectorIndex;
pub use knowledge::{FileKnowledgeStore, MemoryKnowledgeStore, bootstrap_records};

use crate::Result;
use crate::models::{IngredientName, IngredientRecord, ScoredDocument};
use std::collections::BTreeMap;

/// Ordered mapping from normalized name to record.
pub type RecordMap = BTreeMap<IngredientName, IngredientRecord>;

/// Durable mapping from ingredient name to risk record.
///
/// The store is append/overwrite only; nothing is ever deleted.
pub trait KnowledgeStore: Send + Sync {
    /// Short description of where the data lives, for status output.
    fn location(&self) -> String;

    /// Looks up a record by normalized name.
    fn get(&self, name: &IngredientName) -> Option<IngredientRecord>;

    /// Returns a copy of every record.
    fn snapshot(&self) -> RecordMap;

    /// Returns the number of records.
    fn len(&self) -> usize;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a record exists for the name.
    fn contains(&self, name: &IngredientName) -> bool {
        self.get(name).is_some()
    }

    /// Unions `entries` over the durable state, overwriting same-name records.
    ///
    /// Concurrent merges never lose each other's entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable representation cannot be read or
    /// written. The store is left unchanged in that case.
    fn merge(&self, entries: &RecordMap) -> Result<()>;
}

/// Semantic search index over knowledge store records.
pub trait RetrievalIndex: Send + Sync {
    /// Adds or refreshes documents for the given records.
    ///
    /// Returns the number of documents that were (re-)embedded; records whose
    /// document is already current are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or saving fails.
    fn insert(&self, records: &RecordMap) -> Result<usize>;

    /// Returns up to `top_k` documents ranked by descending similarity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded.
    fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>>;

    /// Returns the number of indexed documents.
    fn count(&self) -> usize;

    /// Discards every document and indexes `snapshot` from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or saving fails.
    fn rebuild(&self, snapshot: &RecordMap) -> Result<usize>;

    /// Brings the index in line with `snapshot`.
    ///
    /// Missing or stale documents are (re-)embedded and documents with no
    /// record are dropped. Returns the number of documents embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or saving fails.
    fn reconcile(&self, snapshot: &RecordMap) -> Result<usize>;
}
