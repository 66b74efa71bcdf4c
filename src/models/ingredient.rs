//! Ingredient names, risk levels and validated records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum length (in characters) of an accepted impact description.
pub const MIN_IMPACT_LEN: usize = 20;

/// Substrings that mark an impact description as a placeholder.
///
/// Matched case-insensitively anywhere in the impact text.
pub const BANNED_IMPACT_PHRASES: &[&str] = &["unknown", "not available", "no known risks"];

/// Risk classification of a single ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum RiskLevel {
    /// Strong evidence of long-term harm or frequent adverse reactions.
    High,
    /// Irritant or contested ingredient that warrants caution.
    Medium,
    /// Generally considered safe.
    Low,
}

impl RiskLevel {
    /// Returns the canonical capitalized name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Parses a risk level, ignoring case and surrounding whitespace.
    ///
    /// Returns `None` for anything outside High, Medium and Low.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Returns all risk levels, most severe first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::High, Self::Medium, Self::Low]
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RiskLevel> for &'static str {
    fn from(level: RiskLevel) -> Self {
        level.as_str()
    }
}

impl TryFrom<String> for RiskLevel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid risk level: {value:?}"))
    }
}

/// Normalized ingredient name, the knowledge store key.
///
/// Construction always trims and lower-cases, so two spellings that differ
/// only in case or surrounding whitespace map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct IngredientName(String);

impl IngredientName {
    /// Creates a normalized name.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name is empty after normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IngredientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IngredientName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for IngredientName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<IngredientName> for String {
    fn from(name: IngredientName) -> Self {
        name.0
    }
}

/// Reason an impact description failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImpactRejection {
    /// Shorter than the minimum length.
    TooShort {
        /// Observed length in characters.
        len: usize,
        /// Required minimum.
        min: usize,
    },
    /// Contains a placeholder phrase.
    Placeholder(&'static str),
}

impl fmt::Display for ImpactRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len, min } => {
                write!(f, "impact too short ({len} chars, need {min})")
            },
            Self::Placeholder(phrase) => write!(f, "impact contains placeholder {phrase:?}"),
        }
    }
}

/// Checks an impact description against the length bar and placeholder list.
///
/// # Errors
///
/// Returns the first rule the text violates.
pub fn validate_impact(impact: &str, min_len: usize) -> std::result::Result<(), ImpactRejection> {
    let trimmed = impact.trim();
    let len = trimmed.chars().count();
    if len < min_len {
        return Err(ImpactRejection::TooShort { len, min: min_len });
    }
    let lower = trimmed.to_lowercase();
    if let Some(phrase) = BANNED_IMPACT_PHRASES
        .iter()
        .copied()
        .find(|phrase| lower.contains(phrase))
    {
        return Err(ImpactRejection::Placeholder(phrase));
    }
    Ok(())
}

/// Risk classification and impact description for one ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct IngredientRecord {
    /// Risk level.
    pub risk: RiskLevel,
    /// Specific description of what the ingredient does and its concerns.
    pub impact: String,
}

impl IngredientRecord {
    /// Creates a record from generated content, enforcing the impact rules.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the impact is too short or a placeholder.
    pub fn validated(
        risk: RiskLevel,
        impact: impl Into<String>,
        min_len: usize,
    ) -> std::result::Result<Self, ImpactRejection> {
        let impact = impact.into().trim().to_string();
        validate_impact(&impact, min_len)?;
        Ok(Self { risk, impact })
    }

    /// Creates a record without validation.
    ///
    /// Reserved for system-of-record data and synthesized heuristic text.
    pub(crate) fn trusted(risk: RiskLevel, impact: impl Into<String>) -> Self {
        Self {
            risk,
            impact: impact.into(),
        }
    }

    /// Renders the searchable document text for this record.
    #[must_use]
    pub fn document_text(&self, name: &IngredientName) -> String {
        format!(
            "Ingredient: {name}\nRisk: {}\nImpact: {}",
            self.risk, self.impact
        )
    }
}

/// On-disk shape of a record; loading rejects empty impacts.
#[derive(Deserialize)]
struct StoredRecord {
    risk: RiskLevel,
    impact: String,
}

impl TryFrom<StoredRecord> for IngredientRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> std::result::Result<Self, Self::Error> {
        let impact = stored.impact.trim();
        if impact.is_empty() {
            return Err("record impact must not be empty".to_string());
        }
        Ok(Self::trusted(stored.risk, impact))
    }
}
