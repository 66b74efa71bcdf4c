//! JSON file knowledge store.
//!
//! The whole mapping is kept in one pretty-printed JSON object:
//!
//! ```json
//! {
//!   "parabens": { "risk": "High", "impact": "Preservative; linked to hormone disruption" }
//! }
//! ```
//!
//! Every merge rewrites the file in full through a temp file and an atomic
//! rename, so the file is always loadable as the next run's seed dataset.

use super::{bootstrap_records, flag_weak_impacts, parse_records, render_records};
use crate::models::{IngredientName, IngredientRecord};
use crate::storage::atomic::write_atomic;
use crate::storage::{KnowledgeStore, RecordMap};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Knowledge store persisted as a JSON file.
#[derive(Debug)]
pub struct FileKnowledgeStore {
    path: PathBuf,
    /// Read cache of the durable state.
    cache: RwLock<RecordMap>,
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl FileKnowledgeStore {
    /// Opens the store at `path`, seeding it from the bootstrap dataset if the
    /// file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the seed file cannot be written.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let records = read_records(&path)?;
            tracing::debug!(path = %path.display(), records = records.len(), "Loaded knowledge store");
            flag_weak_impacts(&records, &path.display().to_string());
            records
        } else {
            let records = bootstrap_records()?;
            write_atomic(&path, &render_records(&records)?, "seed_store")?;
            tracing::info!(
                path = %path.display(),
                records = records.len(),
                "Seeded knowledge store from bootstrap dataset"
            );
            records
        };

        Ok(Self {
            path,
            cache: RwLock::new(records),
            write_lock: Mutex::new(()),
        })
    }

    /// Opens the store at `path` with explicit seed records for a new file.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn open_with_seed(path: impl Into<PathBuf>, seed: &RecordMap) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            write_atomic(&path, &render_records(seed)?, "seed_store")?;
        }
        let records = read_records(&path)?;
        flag_weak_impacts(&records, &path.display().to_string());
        Ok(Self {
            path,
            cache: RwLock::new(records),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, RecordMap> {
        self.cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KnowledgeStore for FileKnowledgeStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn get(&self, name: &IngredientName) -> Option<IngredientRecord> {
        self.read_cache().get(name).cloned()
    }

    fn snapshot(&self) -> RecordMap {
        self.read_cache().clone()
    }

    fn len(&self) -> usize {
        self.read_cache().len()
    }

    fn merge(&self, entries: &RecordMap) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Another process may have written since we loaded.
        let mut durable = if self.path.exists() {
            read_records(&self.path)?
        } else {
            self.snapshot()
        };
        durable.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        write_atomic(&self.path, &render_records(&durable)?, "store_write")?;

        let total = durable.len();
        *self
            .cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = durable;

        tracing::info!(
            path = %self.path.display(),
            merged = entries.len(),
            total,
            "Merged entries into knowledge store"
        );
        Ok(())
    }
}

fn read_records(path: &Path) -> Result<RecordMap> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_store".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    parse_records(&contents, "parse_store")
}
