//! # Ingrisk
//!
//! Cosmetic ingredient risk resolution with a self-growing knowledge base.
//!
//! Ingrisk takes a raw ingredient list (pasted text, OCR output, scraped page
//! text), resolves every ingredient to a risk level and an impact description,
//! and produces a product safety report with an overall score and a
//! retrieval-augmented explanation.
//!
//! ## Features
//!
//! - Durable knowledge store seeded from a curated bootstrap dataset
//! - Generative lookup for unknown ingredients with validation, retry and a
//!   deterministic heuristic fallback that never fails
//! - Incremental semantic retrieval index kept consistent with the store
//! - Pluggable LLM providers (Ollama, OpenAI-compatible) behind a circuit breaker
//!
//! ## Example
//!
//! ```rust,ignore
//! use ingrisk::services::AnalysisService;
//!
//! let service = AnalysisService::from_config(&config)?;
//! let findings = service.analyze("Water, Parabens, Niacinamide")?;
//! assert_eq!(findings.overall_score.as_str(), "Bad");
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod embedding;
pub mod llm;
pub mod models;
pub mod observability;
pub mod rendering;
pub mod services;
pub mod sources;
pub mod storage;

pub use config::IngriskConfig;
pub use embedding::Embedder;
pub use llm::LlmProvider;
pub use models::{
    Bucket, Findings, IngredientDetail, IngredientName, IngredientRecord, OverallScore, RiskLevel,
};
pub use services::{AnalysisService, KnowledgeBase, RiskResolver};
pub use storage::{KnowledgeStore, RetrievalIndex};

/// Error type for ingrisk operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed configuration values, empty embed text, bad CLI arguments |
/// | `OperationFailed` | HTTP calls fail, files cannot be read, responses cannot be parsed |
/// | `PersistenceFailed` | A resolution batch could not be committed to the store or index |
/// | `FeatureNotEnabled` | An optional backend is configured without its cargo feature |
///
/// Oracle failures during resolution never reach the caller: the resolver
/// recovers from them locally.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - An LLM or embedding HTTP request fails or times out
    /// - The knowledge store file cannot be read or parsed
    /// - Configuration files cannot be read
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Newly resolved entries could not be durably recorded.
    ///
    /// The in-memory resolution for the current request is then inconsistent
    /// with the persisted store, so the request fails as a whole. The names in
    /// `unpersisted` were resolved but are not guaranteed to be in the store
    /// or the index.
    #[error("persistence '{operation}' failed for {} new entries: {cause}", unpersisted.len())]
    PersistenceFailed {
        /// The commit step that failed (`store_merge` or `index_insert`).
        operation: String,
        /// The underlying cause.
        cause: String,
        /// Normalized names of the entries that were not persisted.
        unpersisted: Vec<String>,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

/// Result type alias for ingrisk operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::PersistenceFailed {
            operation: "store_merge".to_string(),
            cause: "disk full".to_string(),
            unpersisted: vec!["squalane".to_string(), "bakuchiol".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "persistence 'store_merge' failed for 2 new entries: disk full"
        );
    }
}
