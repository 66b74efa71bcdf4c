//! Retrieval-augmented explanation of findings.

use super::KnowledgeBase;
use crate::config::ExplainerConfig;
use crate::llm::LlmProvider;
use crate::models::{BucketEntry, Findings, IngredientDetail, OverallScore};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::instrument;

/// Explanation used when the generative call fails.
pub const EXPLANATION_UNAVAILABLE: &str =
    "Explanation unavailable: the language model could not be reached. The score and ingredient breakdown are still complete.";

/// Explanation for a request with no ingredients.
pub const NO_INGREDIENTS_EXPLANATION: &str = "No ingredients were found or analyzed in this text.";

const EXPLANATION_PROMPT: &str = "You are a cosmetic safety expert.
Given:
- Analyzed ingredient findings (JSON)
- Reference entries from the ingredient knowledge base
Task:
- Only write cautionary notes for high or medium risk ingredients.
- Write a concise, user-friendly explanation.
- For High risk: include likely long-term impacts in 1 short sentence each.
- For Medium risk: include a brief caution.
- Do not comment on low or unknown risk ingredients.
- End with two or three sentences of overall rationale that matches the score.
Keep it to ~5 bulleted lines total.
";

#[derive(Serialize)]
struct ExplanationPayload<'a> {
    overall_score: OverallScore,
    high_risk: &'a [BucketEntry],
    medium_risk: &'a [BucketEntry],
    low_risk: &'a [BucketEntry],
    unknown: &'a [BucketEntry],
    details: &'a [IngredientDetail],
}

/// Produces the natural-language summary of a findings record.
pub struct Explainer {
    llm: Arc<dyn LlmProvider>,
    config: ExplainerConfig,
}

impl Explainer {
    /// Creates an explainer.
    #[must_use]
    pub const fn new(llm: Arc<dyn LlmProvider>, config: ExplainerConfig) -> Self {
        Self { llm, config }
    }

    /// Explains `findings`, grounded on documents retrieved from `knowledge`.
    ///
    /// Never fails: a failed generation yields [`EXPLANATION_UNAVAILABLE`].
    /// Returns an empty string when explanations are disabled.
    #[instrument(name = "explainer.explain", skip_all, fields(score = %findings.overall_score))]
    pub fn explain(&self, findings: &Findings, knowledge: &KnowledgeBase) -> String {
        if !self.config.enabled {
            return String::new();
        }
        if findings.is_empty() {
            return NO_INGREDIENTS_EXPLANATION.to_string();
        }

        let prompt = match self.build_prompt(findings, knowledge) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize findings for explanation");
                return EXPLANATION_UNAVAILABLE.to_string();
            },
        };

        match self.llm.complete(&prompt) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Explanation response was empty");
                EXPLANATION_UNAVAILABLE.to_string()
            },
            Err(e) => {
                tracing::warn!(error = %e, "Explanation generation failed");
                EXPLANATION_UNAVAILABLE.to_string()
            },
        }
    }

    fn build_prompt(
        &self,
        findings: &Findings,
        knowledge: &KnowledgeBase,
    ) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_string_pretty(&ExplanationPayload {
            overall_score: findings.overall_score,
            high_risk: &findings.high_risk,
            medium_risk: &findings.medium_risk,
            low_risk: &findings.low_risk,
            unknown: &findings.unknown,
            details: &findings.details,
        })?;

        let mut prompt = EXPLANATION_PROMPT.to_string();
        let context = self.retrieve_context(findings, knowledge);
        if !context.is_empty() {
            prompt.push_str("Reference entries:\n");
            for text in &context {
                let _ = writeln!(prompt, "---\n{text}");
            }
        }
        let _ = write!(prompt, "JSON:\n{payload}\n");
        Ok(prompt)
    }

    /// Fetches grounding documents for the High and Medium ingredients.
    fn retrieve_context(&self, findings: &Findings, knowledge: &KnowledgeBase) -> Vec<String> {
        let flagged: Vec<&str> = findings
            .high_risk
            .iter()
            .chain(&findings.medium_risk)
            .map(|entry| entry.ingredient.as_str())
            .collect();
        if flagged.is_empty() || self.config.top_k == 0 {
            return Vec::new();
        }

        let query = format!("Safety concerns of cosmetic ingredients: {}", flagged.join(", "));
        match knowledge.query(&query, self.config.top_k) {
            Ok(documents) => documents.into_iter().map(|d| d.document.text).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Context retrieval failed; explaining without it");
                Vec::new()
            },
        }
    }
}
