//! Data models for ingrisk.
//!
//! This module contains the core data structures shared by the store, the
//! index and the analysis services.

mod document;
mod findings;
mod ingredient;

pub use document::{IndexDocument, ScoredDocument, fingerprint};
pub use findings::{
    Bucket, BucketEntry, Findings, IngredientDetail, OverallScore, ResolutionPath,
};
pub use ingredient::{
    BANNED_IMPACT_PHRASES, ImpactRejection, IngredientName, IngredientRecord, MIN_IMPACT_LEN,
    RiskLevel, validate_impact,
};
