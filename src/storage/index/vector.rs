//! Brute-force embedding index.
//!
//! Keeps one document and one vector per ingredient in memory and ranks by
//! cosine similarity. The ingredient vocabulary is small (hundreds to low
//! thousands of names), so an O(n) scan per query is adequate.

use crate::embedding::{Embedder, cosine_similarity};
use crate::models::{IndexDocument, IngredientName, ScoredDocument};
use crate::storage::atomic::write_atomic;
use crate::storage::{RecordMap, RetrievalIndex};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Embedding index with optional JSON persistence.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
    entries: RwLock<HashMap<IngredientName, IndexEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    document: IndexDocument,
    vector: Vec<f32>,
}

/// Index data for serialization.
#[derive(Serialize, Deserialize)]
struct IndexData {
    embedder: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Creates an empty in-memory index.
    #[must_use]
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Opens an index persisted at `path`.
    ///
    /// A missing file yields an empty index. A file written by a different
    /// embedder or with different dimensions, or one that cannot be parsed,
    /// is discarded; the caller is expected to reconcile against the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(embedder: Arc<dyn Embedder>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = Self::load(&path, embedder.as_ref())?;
        Ok(Self {
            embedder,
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Returns the index path, if persisted.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the embedder identifier.
    #[must_use]
    pub fn embedder_id(&self) -> String {
        self.embedder.id()
    }

    fn load(path: &Path, embedder: &dyn Embedder) -> Result<HashMap<IngredientName, IndexEntry>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "load_index".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let data: IndexData = match serde_json::from_str(&content) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable index");
                return Ok(HashMap::new());
            },
        };

        if data.dimensions != embedder.dimensions() || data.embedder != embedder.id() {
            tracing::warn!(
                path = %path.display(),
                stored_embedder = %data.embedder,
                stored_dimensions = data.dimensions,
                embedder = %embedder.id(),
                dimensions = embedder.dimensions(),
                "Index was built with a different embedder; rebuilding"
            );
            return Ok(HashMap::new());
        }

        Ok(data
            .entries
            .into_iter()
            .filter(|entry| entry.vector.len() == data.dimensions)
            .map(|entry| (entry.document.ingredient.clone(), entry))
            .collect())
    }

    fn save(&self, entries: &HashMap<IngredientName, IndexEntry>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut sorted: Vec<IndexEntry> = entries.values().cloned().collect();
        sorted.sort_by(|a, b| a.document.ingredient.cmp(&b.document.ingredient));
        let data = IndexData {
            embedder: self.embedder.id(),
            dimensions: self.embedder.dimensions(),
            entries: sorted,
        };

        let content = serde_json::to_vec(&data).map_err(|e| Error::OperationFailed {
            operation: "serialize_index".to_string(),
            cause: e.to_string(),
        })?;
        write_atomic(path, &content, "write_index")
    }

    /// Documents whose fingerprint differs from what is indexed.
    fn stale_documents(
        current: &HashMap<IngredientName, IndexEntry>,
        records: &RecordMap,
    ) -> Vec<IndexDocument> {
        records
            .iter()
            .map(|(name, record)| IndexDocument::from_record(name, record))
            .filter(|doc| is_stale(current, doc))
            .collect()
    }

    /// Embeds documents. Called without holding the entries lock.
    fn embed_documents(&self, documents: Vec<IndexDocument>) -> Result<Vec<IndexEntry>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = documents.iter().map(|doc| doc.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != documents.len() {
            return Err(Error::OperationFailed {
                operation: "index_embed".to_string(),
                cause: format!(
                    "embedder returned {} vectors for {} documents",
                    vectors.len(),
                    documents.len()
                ),
            });
        }

        Ok(documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| IndexEntry { document, vector })
            .collect())
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<IngredientName, IndexEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<IngredientName, IndexEntry>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn is_stale(current: &HashMap<IngredientName, IndexEntry>, doc: &IndexDocument) -> bool {
    current
        .get(&doc.ingredient)
        .is_none_or(|entry| entry.document.fingerprint != doc.fingerprint)
}

impl RetrievalIndex for VectorIndex {
    fn insert(&self, records: &RecordMap) -> Result<usize> {
        // Embedding may be a network call; queries keep running meanwhile.
        let stale = Self::stale_documents(&self.read_entries(), records);
        let fresh = self.embed_documents(stale)?;
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut entries = self.write_entries();
        // A concurrent insert may have indexed the same documents already.
        let fresh: Vec<IndexEntry> = fresh
            .into_iter()
            .filter(|entry| is_stale(&entries, &entry.document))
            .collect();
        let embedded = fresh.len();
        if embedded == 0 {
            return Ok(0);
        }

        let mut updated = entries.clone();
        for entry in fresh {
            updated.insert(entry.document.ingredient.clone(), entry);
        }
        self.save(&updated)?;
        *entries = updated;

        tracing::debug!(embedded, total = entries.len(), "Indexed documents");
        Ok(embedded)
    }

    fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text)?;

        let entries = self.read_entries();
        let mut scored: Vec<ScoredDocument> = entries
            .values()
            .map(|entry| ScoredDocument {
                document: entry.document.clone(),
                // Cosine similarity ranges from -1 to 1, normalize to 0 to 1
                score: f32::midpoint(cosine_similarity(&query, &entry.vector), 1.0),
            })
            .collect();
        drop(entries);

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.ingredient.cmp(&b.document.ingredient))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn count(&self) -> usize {
        self.read_entries().len()
    }

    fn rebuild(&self, snapshot: &RecordMap) -> Result<usize> {
        let fresh = self.embed_documents(Self::stale_documents(&HashMap::new(), snapshot))?;
        let embedded = fresh.len();
        let mut entries = self.write_entries();
        let rebuilt: HashMap<IngredientName, IndexEntry> = fresh
            .into_iter()
            .map(|entry| (entry.document.ingredient.clone(), entry))
            .collect();
        self.save(&rebuilt)?;
        *entries = rebuilt;

        tracing::info!(documents = embedded, "Rebuilt retrieval index");
        Ok(embedded)
    }

    fn reconcile(&self, snapshot: &RecordMap) -> Result<usize> {
        // Held across embedding: the orphan sweep needs a stable view.
        let mut entries = self.write_entries();
        let fresh = self.embed_documents(Self::stale_documents(&entries, snapshot))?;
        let embedded = fresh.len();

        let mut updated: HashMap<IngredientName, IndexEntry> = entries
            .iter()
            .filter(|(name, _)| snapshot.contains_key(*name))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        let orphans = entries.len() - updated.len();
        for entry in fresh {
            updated.insert(entry.document.ingredient.clone(), entry);
        }

        if embedded > 0 || orphans > 0 || (self.path.as_ref().is_some_and(|p| !p.exists())) {
            self.save(&updated)?;
        }
        *entries = updated;

        if embedded > 0 || orphans > 0 {
            tracing::info!(embedded, orphans, "Reconciled retrieval index with store");
        }
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::{IngredientRecord, RiskLevel};
    use crate::storage::bootstrap_records;
    use tempfile::TempDir;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashEmbedder::new())
    }

    fn one(name: &str, risk: RiskLevel, impact: &str) -> RecordMap {
        let mut map = RecordMap::new();
        map.insert(IngredientName::new(name), IngredientRecord::trusted(risk, impact));
        map
    }

    #[test]
    fn test_insert_and_query() {
        let index = VectorIndex::in_memory(embedder());
        let records = bootstrap_records().expect("bootstrap");
        assert_eq!(index.insert(&records).expect("insert"), records.len());
        assert_eq!(index.count(), records.len());

        let results = index.query("parabens", 5).expect("query");
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].document.ingredient.as_str(), "parabens");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_insert_skips_unchanged_documents() {
        let index = VectorIndex::in_memory(embedder());
        let records = one("bakuchiol", RiskLevel::Low, "Plant-derived retinol alternative");
        assert_eq!(index.insert(&records).expect("insert"), 1);
        assert_eq!(index.insert(&records).expect("insert again"), 0);

        let changed = one("bakuchiol", RiskLevel::Medium, "Plant-derived retinol alternative");
        assert_eq!(index.insert(&changed).expect("insert changed"), 1);
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn test_query_empty_index() {
        let index = VectorIndex::in_memory(embedder());
        assert!(index.query("water", 5).expect("query").is_empty());
        assert!(index.query("water", 0).expect("query").is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("index.json");

        let index = VectorIndex::open(embedder(), &path).expect("open");
        index
            .insert(&one("squalane", RiskLevel::Low, "Lightweight emollient from olives"))
            .expect("insert");
        drop(index);

        let reopened = VectorIndex::open(embedder(), &path).expect("reopen");
        assert_eq!(reopened.count(), 1);
        assert_eq!(
            reopened
                .reconcile(&one("squalane", RiskLevel::Low, "Lightweight emollient from olives"))
                .expect("reconcile"),
            0
        );
    }

    #[test]
    fn test_dimension_mismatch_discards_saved_vectors() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("index.json");

        let index = VectorIndex::open(embedder(), &path).expect("open");
        index
            .insert(&one("talc", RiskLevel::Medium, "Absorbent mineral; asbestos contamination risk"))
            .expect("insert");
        drop(index);

        let smaller: Arc<dyn Embedder> = Arc::new(HashEmbedder::with_dimensions(64));
        let reopened = VectorIndex::open(smaller, &path).expect("reopen");
        assert_eq!(reopened.count(), 0);
    }

    #[test]
    fn test_corrupt_index_file_is_discarded() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("index.json");
        std::fs::write(&path, "garbage").expect("write");

        let index = VectorIndex::open(embedder(), &path).expect("open");
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_reconcile_adds_missing_and_drops_orphans() {
        let index = VectorIndex::in_memory(embedder());
        index
            .insert(&one("orphan", RiskLevel::Low, "Not present in the store any more"))
            .expect("insert");

        let snapshot = bootstrap_records().expect("bootstrap");
        let embedded = index.reconcile(&snapshot).expect("reconcile");
        assert_eq!(embedded, snapshot.len());
        assert_eq!(index.count(), snapshot.len());
        assert_eq!(index.reconcile(&snapshot).expect("second reconcile"), 0);
    }

    #[test]
    fn test_rebuild_replaces_everything() {
        let index = VectorIndex::in_memory(embedder());
        index
            .insert(&one("orphan", RiskLevel::Low, "Not present in the store any more"))
            .expect("insert");
        let snapshot = one("water", RiskLevel::Low, "Safe base solvent for formulations");
        assert_eq!(index.rebuild(&snapshot).expect("rebuild"), 1);
        assert_eq!(index.count(), 1);
        assert_eq!(
            index.query("water", 1).expect("query")[0]
                .document
                .ingredient
                .as_str(),
            "water"
        );
    }

    /// Blocks `embed_batch` until released; `embed` passes straight through.
    struct GatedEmbedder {
        inner: HashEmbedder,
        started: std::sync::Mutex<std::sync::mpsc::Sender<()>>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Embedder for GatedEmbedder {
        fn id(&self) -> String {
            self.inner.id()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.started.lock().expect("lock").send(()).expect("send");
            self.release.lock().expect("lock").recv().expect("recv");
            texts.iter().map(|t| self.inner.embed(t)).collect()
        }
    }

    #[test]
    fn test_query_not_blocked_by_pending_insert() {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let index = Arc::new(VectorIndex::in_memory(Arc::new(GatedEmbedder {
            inner: HashEmbedder::new(),
            started: std::sync::Mutex::new(started_tx),
            release: std::sync::Mutex::new(release_rx),
        })));

        let writer = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                index.insert(&one(
                    "squalane",
                    RiskLevel::Low,
                    "Skin-identical emollient that softens without greasiness",
                ))
            })
        };

        started_rx.recv().expect("insert reached the embedder");
        // The insert is parked inside the embedder; reads must still proceed.
        assert_eq!(index.count(), 0);
        assert!(index.query("squalane", 3).expect("query").is_empty());

        release_tx.send(()).expect("release");
        assert_eq!(writer.join().expect("join").expect("insert"), 1);
        assert_eq!(index.count(), 1);
    }
}
