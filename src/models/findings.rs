//! Analysis output types.

use super::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation bucket for a resolved ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    /// High risk.
    High,
    /// Medium risk.
    Medium,
    /// Low risk.
    Low,
    /// Risk value outside the known levels.
    Unknown,
}

impl Bucket {
    /// Maps a free-form risk string to its bucket.
    ///
    /// Anything that is not High, Medium or Low (ignoring case) lands in
    /// [`Bucket::Unknown`].
    #[must_use]
    pub fn from_risk_str(risk: &str) -> Self {
        RiskLevel::parse(risk).map_or(Self::Unknown, Self::from)
    }

    /// Returns the display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Unknown => "Unknown",
        }
    }

    /// Returns all buckets in report order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::High, Self::Medium, Self::Low, Self::Unknown]
    }
}

impl From<RiskLevel> for Bucket {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::High => Self::High,
            RiskLevel::Medium => Self::Medium,
            RiskLevel::Low => Self::Low,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall product score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallScore {
    /// No High or Medium risk ingredients.
    Excellent,
    /// At least one Medium risk ingredient and no High risk ones.
    Poor,
    /// At least one High risk ingredient.
    Bad,
}

impl OverallScore {
    /// Returns the display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Poor => "Poor",
            Self::Bad => "Bad",
        }
    }
}

impl fmt::Display for OverallScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an ingredient's record was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Existing knowledge store entry.
    Store,
    /// Validated structured oracle answer.
    Oracle,
    /// Free-text oracle summary accepted with Low risk.
    OracleFreeText,
    /// Deterministic name-pattern heuristic.
    Heuristic,
}

impl ResolutionPath {
    /// Returns the metric/log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Oracle => "oracle",
            Self::OracleFreeText => "oracle_free_text",
            Self::Heuristic => "heuristic",
        }
    }

    /// Returns true if the record was not already in the store.
    #[must_use]
    pub const fn is_new(self) -> bool {
        !matches!(self, Self::Store)
    }
}

/// Entry in a risk bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry {
    /// Normalized ingredient name.
    pub ingredient: String,
    /// Impact description.
    pub impact: String,
}

/// Per-ingredient analysis detail, one per requested token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientDetail {
    /// Token as it appeared in the input.
    pub input: String,
    /// Normalized ingredient name.
    pub ingredient: String,
    /// Risk bucket.
    pub risk_level: Bucket,
    /// Impact description.
    pub impact: String,
    /// Where the record came from.
    pub resolution: ResolutionPath,
}

/// Structured result of one analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Findings {
    /// Overall product score.
    pub overall_score: OverallScore,
    /// High risk bucket.
    pub high_risk: Vec<BucketEntry>,
    /// Medium risk bucket.
    pub medium_risk: Vec<BucketEntry>,
    /// Low risk bucket.
    pub low_risk: Vec<BucketEntry>,
    /// Unknown bucket.
    pub unknown: Vec<BucketEntry>,
    /// Per-ingredient details in input order, duplicates included.
    pub details: Vec<IngredientDetail>,
    /// Natural-language explanation (may be a placeholder on failure).
    pub explanation: String,
    /// Names first resolved (and persisted) by this request.
    pub new_entries: Vec<String>,
    /// When the analysis completed.
    pub analyzed_at: DateTime<Utc>,
}

impl Findings {
    /// Returns the entries of one bucket.
    #[must_use]
    pub fn bucket(&self, bucket: Bucket) -> &[BucketEntry] {
        match bucket {
            Bucket::High => &self.high_risk,
            Bucket::Medium => &self.medium_risk,
            Bucket::Low => &self.low_risk,
            Bucket::Unknown => &self.unknown,
        }
    }

    /// Returns the ingredient names of one bucket, in insertion order.
    #[must_use]
    pub fn bucket_names(&self, bucket: Bucket) -> Vec<&str> {
        self.bucket(bucket)
            .iter()
            .map(|entry| entry.ingredient.as_str())
            .collect()
    }

    /// Returns true if no ingredients were analyzed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("High", Bucket::High)]
    #[test_case("medium", Bucket::Medium)]
    #[test_case(" low ", Bucket::Low)]
    #[test_case("Unknown", Bucket::Unknown)]
    #[test_case("severe", Bucket::Unknown)]
    #[test_case("", Bucket::Unknown)]
    fn test_bucket_from_risk_str(input: &str, expected: Bucket) {
        assert_eq!(Bucket::from_risk_str(input), expected);
    }

    #[test]
    fn test_resolution_path_is_new() {
        assert!(!ResolutionPath::Store.is_new());
        assert!(ResolutionPath::Oracle.is_new());
        assert!(ResolutionPath::OracleFreeText.is_new());
        assert!(ResolutionPath::Heuristic.is_new());
    }

    #[test]
    fn test_resolution_path_serde() {
        let json = serde_json::to_string(&ResolutionPath::OracleFreeText).expect("serialize");
        assert_eq!(json, "\"oracle_free_text\"");
    }
}
