//! Bucketing and overall scoring.

use crate::models::{Bucket, BucketEntry, IngredientDetail, OverallScore};
use std::collections::HashSet;

/// Resolved details grouped by bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    /// High risk entries.
    pub high: Vec<BucketEntry>,
    /// Medium risk entries.
    pub medium: Vec<BucketEntry>,
    /// Low risk entries.
    pub low: Vec<BucketEntry>,
    /// Entries whose risk is not a known level.
    pub unknown: Vec<BucketEntry>,
}

impl Buckets {
    /// Groups details by bucket.
    ///
    /// Each normalized name appears once, in order of first occurrence.
    #[must_use]
    pub fn from_details(details: &[IngredientDetail]) -> Self {
        let mut buckets = Self::default();
        let mut seen = HashSet::new();
        for detail in details {
            if !seen.insert(detail.ingredient.as_str()) {
                continue;
            }
            buckets.entries_mut(detail.risk_level).push(BucketEntry {
                ingredient: detail.ingredient.clone(),
                impact: detail.impact.clone(),
            });
        }
        buckets
    }

    fn entries_mut(&mut self, bucket: Bucket) -> &mut Vec<BucketEntry> {
        match bucket {
            Bucket::High => &mut self.high,
            Bucket::Medium => &mut self.medium,
            Bucket::Low => &mut self.low,
            Bucket::Unknown => &mut self.unknown,
        }
    }

    /// Computes the overall score. High dominates Medium, which dominates
    /// everything else.
    #[must_use]
    pub fn score(&self) -> OverallScore {
        overall_score(!self.high.is_empty(), !self.medium.is_empty())
    }
}

/// Scores a product from the presence of High and Medium risk ingredients.
#[must_use]
pub const fn overall_score(has_high: bool, has_medium: bool) -> OverallScore {
    if has_high {
        OverallScore::Bad
    } else if has_medium {
        OverallScore::Poor
    } else {
        OverallScore::Excellent
    }
}
