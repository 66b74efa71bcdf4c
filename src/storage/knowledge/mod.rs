//! Knowledge store implementations.

mod file;
mod memory;

pub use file::FileKnowledgeStore;
pub use memory::MemoryKnowledgeStore;

use super::RecordMap;
use crate::models::{IngredientName, MIN_IMPACT_LEN, validate_impact};
use crate::{Error, Result};

/// Curated seed dataset shipped with the crate.
const BOOTSTRAP_JSON: &str = include_str!("../../../data/bootstrap.json");

/// Returns the curated seed dataset.
///
/// # Errors
///
/// Returns an error if the embedded dataset is malformed.
pub fn bootstrap_records() -> Result<RecordMap> {
    parse_records(BOOTSTRAP_JSON, "parse_bootstrap")
}

/// Parses the durable JSON representation.
pub(crate) fn parse_records(json: &str, operation: &str) -> Result<RecordMap> {
    serde_json::from_str(json).map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    })
}

/// Logs stored records whose impact would not pass lookup validation.
///
/// Such records are still served; hand-edited store files are the usual
/// source. Returns the offending names.
pub(crate) fn flag_weak_impacts(records: &RecordMap, location: &str) -> Vec<IngredientName> {
    let weak: Vec<IngredientName> = records
        .iter()
        .filter_map(|(name, record)| {
            validate_impact(&record.impact, MIN_IMPACT_LEN)
                .err()
                .map(|rejection| {
                    tracing::warn!(
                        store = location,
                        ingredient = %name,
                        reason = %rejection,
                        "Stored record has a weak impact description"
                    );
                    name.clone()
                })
        })
        .collect();
    if !weak.is_empty() {
        metrics::gauge!("knowledge_weak_records").set(weak.len() as f64);
    }
    weak
}

/// Serializes records to the durable JSON representation.
pub(crate) fn render_records(records: &RecordMap) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(records).map_err(|e| Error::OperationFailed {
        operation: "serialize_store".to_string(),
        cause: e.to_string(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IngredientName, RiskLevel};

    #[test]
    fn test_bootstrap_dataset() {
        let records = bootstrap_records().expect("bootstrap parses");
        assert_eq!(records.len(), 52);

        let water = records
            .get(&IngredientName::new("water"))
            .expect("water present");
        assert_eq!(water.risk, RiskLevel::Low);

        let parabens = records
            .get(&IngredientName::new("Parabens"))
            .expect("parabens present");
        assert_eq!(parabens.risk, RiskLevel::High);

        assert!(records.values().all(|r| !r.impact.trim().is_empty()));
    }

    #[test]
    fn test_flag_weak_impacts() {
        let records = parse_records(
            r#"{
                "squalane": { "risk": "Low", "impact": "Skin-identical emollient that softens without greasiness" },
                "mystery": { "risk": "Medium", "impact": "Unknown" },
                "tint": { "risk": "Low", "impact": "Colorant" }
            }"#,
            "test",
        )
        .expect("parse");

        let weak = flag_weak_impacts(&records, "test");
        assert_eq!(
            weak,
            vec![IngredientName::new("mystery"), IngredientName::new("tint")]
        );
    }

    #[test]
    fn test_render_parse_round_trip() {
        let records = bootstrap_records().expect("bootstrap parses");
        let bytes = render_records(&records).expect("render");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(parse_records(&text, "test").expect("parse"), records);
    }
}
