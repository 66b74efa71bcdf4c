//! Risk resolution for ingredient tokens.
//!
//! Known names come straight from the knowledge base. Unknown names go
//! through the generative lookup protocol, a bounded state machine:
//!
//! ```text
//! Structured { attempt: 1 } ─fail─▶ Structured { attempt: 2 } ─fail─▶ ... ─▶ FreeText
//!         │ ok                                                              │ fail
//!         ▼                                                                 ▼
//!       Done ◀──────────────────────── ok ───────────────────────────── Heuristic
//! ```
//!
//! The heuristic never fails, so every name ends with a usable record.
//! Oracle failures are logged and counted, never returned.

use super::KnowledgeBase;
use super::heuristic::heuristic_record;
use crate::config::ResolverConfig;
use crate::llm::{LlmProvider, extract_json_from_response};
use crate::models::{
    Bucket, IngredientDetail, IngredientName, IngredientRecord, ResolutionPath, RiskLevel,
};
use crate::storage::RecordMap;
use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Outcome of resolving one ingredient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved record.
    pub record: IngredientRecord,
    /// How it was obtained.
    pub path: ResolutionPath,
}

/// Outcome of resolving a batch of tokens.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBatch {
    /// One detail per requested token, in input order.
    pub details: Vec<IngredientDetail>,
    /// Records that were not in the knowledge base before this batch.
    pub new_entries: RecordMap,
}

/// Why a single oracle attempt was not accepted.
#[derive(Debug, thiserror::Error)]
enum OracleFailure {
    #[error("oracle call failed: {0}")]
    Call(crate::Error),
    #[error("unparseable response: {0}")]
    Parse(String),
    #[error("rejected response: {0}")]
    Validation(String),
}

impl OracleFailure {
    const fn label(&self) -> &'static str {
        match self {
            Self::Call(_) => "call_error",
            Self::Parse(_) => "parse_error",
            Self::Validation(_) => "rejected",
        }
    }
}

/// Lookup protocol states.
enum LookupState {
    Structured { attempt: u32 },
    FreeText,
    Heuristic,
    Done(Resolution),
}

/// Structured answer shape.
#[derive(Deserialize)]
struct OracleAnswer {
    #[serde(default)]
    risk: String,
    #[serde(default)]
    impact: String,
}

/// Resolves ingredient names to risk records.
pub struct RiskResolver {
    oracle: Arc<dyn LlmProvider>,
    config: ResolverConfig,
}

impl RiskResolver {
    /// Creates a resolver with default settings.
    #[must_use]
    pub fn new(oracle: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(oracle, ResolverConfig::default())
    }

    /// Creates a resolver with explicit settings.
    #[must_use]
    pub const fn with_config(oracle: Arc<dyn LlmProvider>, config: ResolverConfig) -> Self {
        Self { oracle, config }
    }

    /// Resolves every token against the knowledge base.
    ///
    /// Each distinct normalized name is resolved once; repeated tokens reuse
    /// the first resolution but still get their own detail entry. Nothing is
    /// persisted.
    #[instrument(name = "resolver.resolve", skip_all, fields(tokens = tokens.len()))]
    pub fn resolve(&self, tokens: &[String], knowledge: &KnowledgeBase) -> ResolvedBatch {
        let mut batch = ResolvedBatch::default();
        let mut seen: HashMap<IngredientName, Resolution> = HashMap::new();

        for token in tokens {
            let name = IngredientName::new(token);
            if name.is_empty() {
                continue;
            }

            let resolution = if let Some(resolution) = seen.get(&name) {
                resolution.clone()
            } else {
                let resolution = self.resolve_one(token, &name, knowledge);
                if resolution.path.is_new() {
                    batch
                        .new_entries
                        .insert(name.clone(), resolution.record.clone());
                }
                seen.insert(name.clone(), resolution.clone());
                resolution
            };

            batch.details.push(IngredientDetail {
                input: token.clone(),
                ingredient: name.as_str().to_string(),
                risk_level: Bucket::from(resolution.record.risk),
                impact: resolution.record.impact,
                resolution: resolution.path,
            });
        }

        tracing::debug!(
            details = batch.details.len(),
            new_entries = batch.new_entries.len(),
            "Resolved batch"
        );
        batch
    }

    /// Resolves every token and commits the new records.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PersistenceFailed`] if the batch cannot be
    /// committed.
    pub fn resolve_and_commit(
        &self,
        tokens: &[String],
        knowledge: &KnowledgeBase,
    ) -> Result<ResolvedBatch> {
        let batch = self.resolve(tokens, knowledge);
        knowledge.commit(&batch.new_entries)?;
        Ok(batch)
    }

    fn resolve_one(
        &self,
        token: &str,
        name: &IngredientName,
        knowledge: &KnowledgeBase,
    ) -> Resolution {
        let resolution = knowledge.get(name).map_or_else(
            || {
                tracing::info!(ingredient = %name, "Looking up unknown ingredient");
                self.lookup_unknown(token.trim())
            },
            |record| Resolution {
                record,
                path: ResolutionPath::Store,
            },
        );
        metrics::counter!("ingredient_resolutions_total", "path" => resolution.path.as_str())
            .increment(1);
        resolution
    }

    /// Runs the generative lookup protocol for one ingredient.
    ///
    /// Always returns a record whose impact passes validation.
    #[must_use]
    pub fn lookup_unknown(&self, ingredient: &str) -> Resolution {
        let deadline = (self.config.oracle_deadline_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(self.config.oracle_deadline_ms));
        let expired = || deadline.is_some_and(|d| Instant::now() >= d);

        let mut prompt = structured_prompt(ingredient);
        let mut corrected = false;
        let mut state = if self.config.max_structured_attempts == 0 {
            LookupState::FreeText
        } else {
            LookupState::Structured { attempt: 1 }
        };

        loop {
            state = match state {
                LookupState::Structured { .. } | LookupState::FreeText if expired() => {
                    tracing::warn!(ingredient, "Oracle deadline exceeded; using heuristic");
                    LookupState::Heuristic
                },
                LookupState::Structured { attempt } => match self.structured_attempt(&prompt) {
                    Ok(record) => {
                        record_attempt("structured", "accepted");
                        LookupState::Done(Resolution {
                            record,
                            path: ResolutionPath::Oracle,
                        })
                    },
                    Err(failure) => {
                        record_attempt("structured", failure.label());
                        tracing::debug!(ingredient, attempt, error = %failure, "Structured lookup failed");
                        if !corrected {
                            prompt.push_str(&corrective_suffix(ingredient));
                            corrected = true;
                        }
                        if attempt < self.config.max_structured_attempts {
                            LookupState::Structured {
                                attempt: attempt + 1,
                            }
                        } else {
                            LookupState::FreeText
                        }
                    },
                },
                LookupState::FreeText => match self.free_text_attempt(ingredient) {
                    Ok(record) => {
                        record_attempt("free_text", "accepted");
                        LookupState::Done(Resolution {
                            record,
                            path: ResolutionPath::OracleFreeText,
                        })
                    },
                    Err(failure) => {
                        record_attempt("free_text", failure.label());
                        tracing::debug!(ingredient, error = %failure, "Free-text lookup failed");
                        LookupState::Heuristic
                    },
                },
                LookupState::Heuristic => {
                    tracing::info!(ingredient, "Classifying ingredient by name heuristic");
                    LookupState::Done(Resolution {
                        record: heuristic_record(ingredient),
                        path: ResolutionPath::Heuristic,
                    })
                },
                LookupState::Done(resolution) => return resolution,
            };
        }
    }

    fn structured_attempt(&self, prompt: &str) -> std::result::Result<IngredientRecord, OracleFailure> {
        let response = self.oracle.complete(prompt).map_err(OracleFailure::Call)?;
        let answer: OracleAnswer = serde_json::from_str(extract_json_from_response(&response))
            .map_err(|e| OracleFailure::Parse(e.to_string()))?;

        let risk = RiskLevel::parse(&answer.risk).ok_or_else(|| {
            OracleFailure::Validation(format!(
                "risk {:?} is not one of High, Medium, Low",
                answer.risk
            ))
        })?;
        IngredientRecord::validated(risk, answer.impact, self.config.min_impact_len)
            .map_err(|rejection| OracleFailure::Validation(rejection.to_string()))
    }

    fn free_text_attempt(&self, ingredient: &str) -> std::result::Result<IngredientRecord, OracleFailure> {
        let response = self
            .oracle
            .complete(&free_text_prompt(ingredient))
            .map_err(OracleFailure::Call)?;
        IngredientRecord::validated(RiskLevel::Low, response, self.config.min_impact_len)
            .map_err(|rejection| OracleFailure::Validation(rejection.to_string()))
    }
}

fn record_attempt(phase: &'static str, outcome: &'static str) {
    metrics::counter!("oracle_attempts_total", "phase" => phase, "outcome" => outcome).increment(1);
}

fn structured_prompt(ingredient: &str) -> String {
    format!(
        r#"You are a cosmetic safety expert with extensive knowledge of cosmetic ingredients.
Ingredient: {ingredient}
Please provide:
1. Risk level: Classify as exactly one of: High, Medium, Low
2. Impact: A detailed, factual description of this specific ingredient's properties, benefits, and potential concerns in less than 20 words.
Requirements:
- Be specific to THIS ingredient - research its actual chemical properties and cosmetic uses
- Include what the ingredient does in cosmetics (moisturizer, preservative, emulsifier, etc.)
- Mention any known benefits or concerns specific to this ingredient
- Use real cosmetic science knowledge, not generic statements
- Minimum 10 words for impact description
- Never use "Unknown", "Not available", or generic fallback phrases
Examples of good responses:
- {{"risk": "Medium", "impact": "Preservative; can cause skin irritation, allergic reactions, toxic at high doses"}}
- {{"risk": "Low", "impact": "Silicone-based emollient that creates smooth application and water resistance; may cause buildup on hair but considered safe for skin use."}}
Format as JSON with keys 'risk' and 'impact' only."#
    )
}

fn corrective_suffix(ingredient: &str) -> String {
    format!(
        "\n\nPrevious attempt was too generic. Please provide specific information about {ingredient}'s actual cosmetic function and properties."
    )
}

fn free_text_prompt(ingredient: &str) -> String {
    format!(
        "Research the cosmetic ingredient '{ingredient}' and provide its primary function and safety profile in less than 20 words. Focus on what this ingredient specifically does in cosmetics."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::embedding::HashEmbedder;
    use crate::models::{BANNED_IMPACT_PHRASES, MIN_IMPACT_LEN};
    use crate::storage::{MemoryKnowledgeStore, RetrievalIndex, VectorIndex};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays canned responses, repeating the last one.
    struct ScriptedOracle {
        responses: Vec<std::result::Result<String, String>>,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(responses: Vec<std::result::Result<&str, &str>>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(ToString::to_string).map_err(ToString::to_string))
                    .collect(),
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LlmProvider for ScriptedOracle {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.prompts.lock().expect("prompts").push(prompt.to_string());
            let response = &self.responses[n.min(self.responses.len() - 1)];
            response.clone().map_err(|cause| Error::OperationFailed {
                operation: "scripted".to_string(),
                cause,
            })
        }
    }

    fn knowledge() -> KnowledgeBase {
        KnowledgeBase::new(
            Arc::new(MemoryKnowledgeStore::bootstrap().expect("bootstrap")),
            Arc::new(VectorIndex::in_memory(Arc::new(HashEmbedder::new()))),
        )
    }

    fn resolver(oracle: &Arc<ScriptedOracle>) -> RiskResolver {
        RiskResolver::new(oracle.clone())
    }

    fn assert_usable(record: &IngredientRecord) {
        assert!(record.impact.trim().chars().count() >= MIN_IMPACT_LEN);
        let lower = record.impact.to_lowercase();
        assert!(BANNED_IMPACT_PHRASES.iter().all(|p| !lower.contains(p)));
    }

    #[test]
    fn test_known_names_skip_oracle() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err("must not be called")]));
        let tokens = vec!["Water".to_string(), " NIACINAMIDE ".to_string()];
        let batch = resolver(&oracle).resolve(&tokens, &knowledge());

        assert_eq!(oracle.calls(), 0);
        assert!(batch.new_entries.is_empty());
        assert!(batch.details.iter().all(|d| d.resolution == ResolutionPath::Store));
        assert_eq!(batch.details[1].ingredient, "niacinamide");
        assert_eq!(batch.details[1].input, " NIACINAMIDE ");
    }

    #[test]
    fn test_structured_answer_accepted() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            "```json\n{\"risk\": \"medium\", \"impact\": \"Synthetic stabilizer used in trace formulation adjustments for texture control.\"}\n```",
        )]));
        let resolution = resolver(&oracle).lookup_unknown("UnknownXyzChemical");

        assert_eq!(oracle.calls(), 1);
        assert_eq!(resolution.path, ResolutionPath::Oracle);
        assert_eq!(resolution.record.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_retry_appends_corrective_instruction_once() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(r#"{"risk": "Low", "impact": "Unknown"}"#),
            Ok("not json at all"),
            Ok(r#"{"risk": "Low", "impact": "Film-forming polymer that thickens gels and suspends particles."}"#),
        ]));
        let resolution = resolver(&oracle).lookup_unknown("Carbomer");

        assert_eq!(resolution.path, ResolutionPath::Oracle);
        assert_eq!(oracle.calls(), 3);
        let prompts = oracle.prompts.lock().expect("prompts");
        assert!(!prompts[0].contains("Previous attempt was too generic"));
        assert!(prompts[1].contains("Previous attempt was too generic"));
        assert_eq!(prompts[2].matches("Previous attempt was too generic").count(), 1);
    }

    #[test]
    fn test_free_text_fallback_is_low_risk() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(r#"{"risk": "Extreme", "impact": "Film-forming polymer that thickens gels."}"#),
            Ok(r#"{"risk": "Extreme", "impact": "Film-forming polymer that thickens gels."}"#),
            Ok(r#"{"risk": "Extreme", "impact": "Film-forming polymer that thickens gels."}"#),
            Ok("Thickening polymer that stabilizes gels and creams."),
        ]));
        let resolution = resolver(&oracle).lookup_unknown("Carbomer");

        assert_eq!(oracle.calls(), 4);
        assert_eq!(resolution.path, ResolutionPath::OracleFreeText);
        assert_eq!(resolution.record.risk, RiskLevel::Low);
        assert_eq!(
            resolution.record.impact,
            "Thickening polymer that stabilizes gels and creams."
        );
    }

    #[test]
    fn test_always_invalid_oracle_uses_heuristic() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok("not available")]));
        let resolution = resolver(&oracle).lookup_unknown("Mystery Acid");

        assert_eq!(oracle.calls(), 4);
        assert_eq!(resolution.path, ResolutionPath::Heuristic);
        assert_eq!(resolution.record.risk, RiskLevel::Medium);
        assert_usable(&resolution.record);
    }

    #[test]
    fn test_failing_oracle_uses_heuristic() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err("connection refused")]));
        let resolution = resolver(&oracle).lookup_unknown("UnknownXyzChemical");

        assert_eq!(resolution.path, ResolutionPath::Heuristic);
        assert_usable(&resolution.record);
    }

    #[test]
    fn test_expired_deadline_skips_oracle() {
        struct SlowOracle;
        impl LlmProvider for SlowOracle {
            fn name(&self) -> &'static str {
                "slow"
            }
            fn complete(&self, _prompt: &str) -> Result<String> {
                std::thread::sleep(Duration::from_millis(30));
                Err(Error::OperationFailed {
                    operation: "slow".to_string(),
                    cause: "timed out".to_string(),
                })
            }
        }

        let resolver = RiskResolver::with_config(
            Arc::new(SlowOracle),
            ResolverConfig {
                oracle_deadline_ms: 10,
                ..ResolverConfig::default()
            },
        );
        let started = Instant::now();
        let resolution = resolver.lookup_unknown("Shea Butter");

        assert_eq!(resolution.path, ResolutionPath::Heuristic);
        assert!(started.elapsed() < Duration::from_millis(90));
    }

    #[test]
    fn test_duplicates_resolved_once() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"risk": "Low", "impact": "Plant-derived retinol alternative with gentle renewal."}"#,
        )]));
        let tokens = vec!["Bakuchiol".to_string(), "bakuchiol ".to_string()];
        let batch = resolver(&oracle).resolve(&tokens, &knowledge());

        assert_eq!(oracle.calls(), 1);
        assert_eq!(batch.details.len(), 2);
        assert_eq!(batch.new_entries.len(), 1);
        assert_eq!(batch.details[0].impact, batch.details[1].impact);
    }

    #[test]
    fn test_resolve_and_commit_is_idempotent() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"risk": "Low", "impact": "Plant-derived retinol alternative with gentle renewal."}"#,
        )]));
        let knowledge = knowledge();
        let resolver = resolver(&oracle);
        let tokens = vec!["Bakuchiol".to_string()];

        let first = resolver.resolve_and_commit(&tokens, &knowledge).expect("first");
        let second = resolver.resolve_and_commit(&tokens, &knowledge).expect("second");

        assert_eq!(oracle.calls(), 1);
        assert_eq!(first.details[0].impact, second.details[0].impact);
        assert_eq!(second.details[0].resolution, ResolutionPath::Store);
        assert!(second.new_entries.is_empty());
        assert_eq!(knowledge.index().count(), 1);
    }
}
