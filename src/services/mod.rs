//! Business logic services.
//!
//! Services orchestrate the knowledge base and the LLM provider and provide
//! the high-level analysis operations.

mod aggregator;
mod analysis;
mod explainer;
mod extraction;
mod heuristic;
mod knowledge_base;
mod resolver;
mod tokenizer;

pub use aggregator::{Buckets, overall_score};
pub use analysis::AnalysisService;
pub use explainer::{EXPLANATION_UNAVAILABLE, Explainer, NO_INGREDIENTS_EXPLANATION};
pub use extraction::{IngredientExtractor, clean_extraction};
pub use heuristic::heuristic_record;
pub use knowledge_base::KnowledgeBase;
pub use resolver::{Resolution, ResolvedBatch, RiskResolver};
pub use tokenizer::tokenize;
