//! End-to-end product analysis.

use super::aggregator::Buckets;
use super::explainer::Explainer;
use super::extraction::IngredientExtractor;
use super::tokenizer::tokenize;
use super::{KnowledgeBase, RiskResolver};
use crate::config::{ExplainerConfig, IngriskConfig, ResolverConfig};
use crate::embedding::build_embedder;
use crate::llm::{LlmProvider, build_provider};
use crate::models::{Findings, IngredientName, IngredientRecord, ScoredDocument};
use crate::sources::IngredientSource;
use crate::storage::{FileKnowledgeStore, VectorIndex};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info_span, instrument};

/// Analyzes ingredient lists against the shared knowledge base.
///
/// Cheap to share: wrap in an `Arc` and hand it to every request handler.
pub struct AnalysisService {
    knowledge: Arc<KnowledgeBase>,
    resolver: RiskResolver,
    explainer: Explainer,
    extractor: IngredientExtractor,
}

impl AnalysisService {
    /// Creates a service over an existing knowledge base, using `llm` as the
    /// lookup oracle, explainer and extractor.
    #[must_use]
    pub fn new(knowledge: Arc<KnowledgeBase>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            knowledge,
            resolver: RiskResolver::new(llm.clone()),
            explainer: Explainer::new(llm.clone(), ExplainerConfig::default()),
            extractor: IngredientExtractor::new(llm),
        }
    }

    /// Replaces the resolver settings.
    #[must_use]
    pub fn with_resolver_config(mut self, llm: Arc<dyn LlmProvider>, config: ResolverConfig) -> Self {
        self.resolver = RiskResolver::with_config(llm, config);
        self
    }

    /// Replaces the explainer settings.
    #[must_use]
    pub fn with_explainer_config(mut self, llm: Arc<dyn LlmProvider>, config: ExplainerConfig) -> Self {
        self.explainer = Explainer::new(llm, config);
        self
    }

    /// Builds the service from configuration.
    ///
    /// Opens (or seeds) the knowledge store, opens the index and reconciles
    /// it with the store.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider cannot be built or the store or index
    /// cannot be opened.
    pub fn from_config(config: &IngriskConfig) -> Result<Self> {
        let llm = build_provider(&config.llm)?;
        let embedder = build_embedder(&config.embedding)?;

        let store = Arc::new(FileKnowledgeStore::open(config.store_path())?);
        let index = Arc::new(match config.index_path() {
            Some(path) => VectorIndex::open(embedder, path)?,
            None => VectorIndex::in_memory(embedder),
        });
        let knowledge = Arc::new(KnowledgeBase::open(store, index)?);

        tracing::info!(
            store = %knowledge.store().location(),
            records = knowledge.store().len(),
            indexed = knowledge.index().count(),
            llm = llm.name(),
            "Analysis service ready"
        );

        Ok(Self::new(knowledge, llm.clone())
            .with_resolver_config(llm.clone(), config.resolver.clone())
            .with_explainer_config(llm, config.explainer.clone()))
    }

    /// Returns the shared knowledge base.
    #[must_use]
    pub const fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Analyzes a raw ingredient list.
    ///
    /// New ingredients are committed to the store and index before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceFailed`] if newly resolved entries cannot
    /// be committed. Oracle and explanation failures are recovered.
    #[instrument(name = "analysis.request", skip_all, fields(input_len = raw.len()))]
    pub fn analyze(&self, raw: &str) -> Result<Findings> {
        let started = Instant::now();
        let tokens = tokenize(raw);

        let batch = self.resolver.resolve_and_commit(&tokens, &self.knowledge)?;
        let buckets = Buckets::from_details(&batch.details);
        let overall_score = buckets.score();

        let mut findings = Findings {
            overall_score,
            high_risk: buckets.high,
            medium_risk: buckets.medium,
            low_risk: buckets.low,
            unknown: buckets.unknown,
            details: batch.details,
            explanation: String::new(),
            new_entries: batch
                .new_entries
                .keys()
                .map(|name| name.as_str().to_string())
                .collect(),
            analyzed_at: Utc::now(),
        };
        findings.explanation = self.explainer.explain(&findings, &self.knowledge);

        metrics::histogram!("analysis_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        tracing::info!(
            score = %findings.overall_score,
            ingredients = findings.details.len(),
            new_entries = findings.new_entries.len(),
            "Analysis complete"
        );
        Ok(findings)
    }

    /// Reads a source and analyzes it, optionally extracting the ingredient
    /// list from noisy text first.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, extraction fails or
    /// finds nothing, or the analysis itself fails.
    pub fn analyze_source(&self, source: &dyn IngredientSource, extract: bool) -> Result<Findings> {
        let raw = {
            let _span = info_span!("analysis.read_source", source = %source.describe()).entered();
            source.read_raw()?
        };

        if !extract {
            return self.analyze(&raw);
        }

        let list = self.extract_ingredients(&raw)?;
        if list.is_empty() {
            return Err(Error::InvalidInput(format!(
                "could not extract a valid list of ingredients from {}",
                source.describe()
            )));
        }
        self.analyze(&list)
    }

    /// Extracts a clean comma-separated ingredient list from noisy text.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails.
    pub fn extract_ingredients(&self, text: &str) -> Result<String> {
        self.extractor.extract(text)
    }

    /// Looks up a stored record by name, without calling the oracle.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<IngredientRecord> {
        self.knowledge.get(&IngredientName::new(name))
    }

    /// Finds the indexed ingredients most similar to `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded.
    pub fn find_similar(&self, name: &str, top_k: usize) -> Result<Vec<ScoredDocument>> {
        self.knowledge.query(
            &format!("Find safety info for cosmetic ingredient: {}", name.trim()),
            top_k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::OverallScore;
    use crate::sources::TextSource;
    use crate::storage::MemoryKnowledgeStore;

    struct EchoLlm;

    impl LlmProvider for EchoLlm {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            if prompt.contains("information extraction bot") {
                return Ok("Extracted ingredients: Water, Parabens".to_string());
            }
            Ok("- Parabens: limit long-term exposure.".to_string())
        }
    }

    fn service() -> AnalysisService {
        let knowledge = KnowledgeBase::open(
            Arc::new(MemoryKnowledgeStore::bootstrap().expect("bootstrap")),
            Arc::new(VectorIndex::in_memory(Arc::new(HashEmbedder::new()))),
        )
        .expect("knowledge base");
        AnalysisService::new(Arc::new(knowledge), Arc::new(EchoLlm))
    }

    #[test]
    fn test_analyze_known_ingredients() {
        let findings = service().analyze("Water, Parabens").expect("analyze");
        assert_eq!(findings.overall_score, OverallScore::Bad);
        assert_eq!(findings.details.len(), 2);
        assert!(findings.new_entries.is_empty());
        assert_eq!(findings.explanation, "- Parabens: limit long-term exposure.");
    }

    #[test]
    fn test_analyze_source_with_extraction() {
        let source = TextSource::new("Best serum ever! INGREDIENTS: Water, Parabens. Shake well.");
        let findings = service().analyze_source(&source, true).expect("analyze");
        assert_eq!(findings.bucket_names(crate::models::Bucket::High), vec!["parabens"]);
    }

    #[test]
    fn test_lookup_and_find_similar() {
        let service = service();
        assert!(service.lookup(" Niacinamide ").is_some());
        assert!(service.lookup("bakuchiol").is_none());

        let similar = service.find_similar("niacinamide", 3).expect("similar");
        assert_eq!(similar.len(), 3);
        assert_eq!(similar[0].document.ingredient.as_str(), "niacinamide");
    }
}
