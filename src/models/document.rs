//! Retrieval index documents.

use super::{IngredientName, IngredientRecord, RiskLevel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Searchable document derived from one knowledge store record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Normalized ingredient name (document key).
    pub ingredient: IngredientName,
    /// Risk level at indexing time.
    pub risk: RiskLevel,
    /// Impact at indexing time.
    pub impact: String,
    /// Text that was embedded.
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub fingerprint: String,
}

impl IndexDocument {
    /// Builds the document for a record.
    #[must_use]
    pub fn from_record(name: &IngredientName, record: &IngredientRecord) -> Self {
        let text = record.document_text(name);
        let fingerprint = fingerprint(&text);
        Self {
            ingredient: name.clone(),
            risk: record.risk,
            impact: record.impact.clone(),
            text,
            fingerprint,
        }
    }
}

/// A document returned by an index query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    /// The matched document.
    pub document: IndexDocument,
    /// Cosine similarity normalized to 0.0..=1.0.
    pub score: f32,
}

/// Hex-encoded SHA-256 of a document's text.
#[must_use]
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_content() {
        let name = IngredientName::new("niacinamide");
        let a = IngredientRecord::trusted(RiskLevel::Low, "Safe; beneficial for skin barrier");
        let b = IngredientRecord::trusted(RiskLevel::Medium, "Safe; beneficial for skin barrier");

        let doc_a = IndexDocument::from_record(&name, &a);
        let doc_a2 = IndexDocument::from_record(&name, &a);
        let doc_b = IndexDocument::from_record(&name, &b);

        assert_eq!(doc_a.fingerprint, doc_a2.fingerprint);
        assert_ne!(doc_a.fingerprint, doc_b.fingerprint);
        assert_eq!(doc_a.fingerprint.len(), 64);
    }
}
