//! In-memory knowledge store.

use crate::Result;
use crate::models::{IngredientName, IngredientRecord};
use crate::storage::{KnowledgeStore, RecordMap};
use std::sync::RwLock;

/// Knowledge store that lives only for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeStore {
    records: RwLock<RecordMap>,
}

impl MemoryKnowledgeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    #[must_use]
    pub const fn with_records(records: RecordMap) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Creates a store seeded with the bootstrap dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded dataset is malformed.
    pub fn bootstrap() -> Result<Self> {
        Ok(Self::with_records(super::bootstrap_records()?))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RecordMap> {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KnowledgeStore for MemoryKnowledgeStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn get(&self, name: &IngredientName) -> Option<IngredientRecord> {
        self.read().get(name).cloned()
    }

    fn snapshot(&self) -> RecordMap {
        self.read().clone()
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn merge(&self, entries: &RecordMap) -> Result<()> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    #[test]
    fn test_merge_overwrites_and_adds() {
        let store = MemoryKnowledgeStore::bootstrap().expect("bootstrap");
        let before = store.len();

        let mut entries = RecordMap::new();
        entries.insert(
            IngredientName::new("Bakuchiol"),
            IngredientRecord::trusted(RiskLevel::Low, "Plant-derived retinol alternative"),
        );
        entries.insert(
            IngredientName::new("water"),
            IngredientRecord::trusted(RiskLevel::Low, "Universal solvent used as the base"),
        );
        store.merge(&entries).expect("merge");

        assert_eq!(store.len(), before + 1);
        assert!(store.contains(&IngredientName::new("bakuchiol")));
        assert_eq!(
            store
                .get(&IngredientName::new("water"))
                .map(|r| r.impact),
            Some("Universal solvent used as the base".to_string())
        );
    }

    #[test]
    fn test_empty_store() {
        let store = MemoryKnowledgeStore::new();
        assert!(store.is_empty());
        assert!(store.get(&IngredientName::new("water")).is_none());
    }
}
