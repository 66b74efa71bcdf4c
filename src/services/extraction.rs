//! LLM-assisted extraction of ingredient lists from noisy text.
//!
//! OCR output and scraped product pages carry marketing copy, headings and
//! usage instructions around the ingredient list. The extractor asks the
//! model for a clean comma-separated list and strips the labels and quotes
//! models like to wrap it in.

use crate::Result;
use crate::llm::LlmProvider;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::instrument;

/// Leading labels such as `Extracted ingredients list:`.
static LEADING_LABEL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:the\s+)?list\s+of\s+ingredients|extracted\s+ingredients(?:\s+list)?|ingredients)\s*:\s*",
    )
    .ok()
});

/// Quote characters wrapped around the whole answer.
const QUOTES: &[char] = &['"', '\'', '`', '\u{201c}', '\u{201d}'];

/// Extracts ingredient lists from arbitrary text.
pub struct IngredientExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl IngredientExtractor {
    /// Creates an extractor.
    #[must_use]
    pub const fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Returns the ingredient list found in `text` as one comma-separated
    /// string, or an empty string if none was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails.
    #[instrument(name = "extractor.extract", skip_all, fields(input_len = text.len()))]
    pub fn extract(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let response = self
            .llm
            .complete_with_system(EXTRACTION_INSTRUCTIONS, &extraction_request(text))?;
        let cleaned = clean_extraction(&response);
        tracing::debug!(extracted_len = cleaned.len(), "Extracted ingredient list");
        Ok(cleaned)
    }
}

/// Strips labels, surrounding quotes and whitespace from a model answer.
#[must_use]
pub fn clean_extraction(response: &str) -> String {
    let trimmed = response.trim();
    let unlabeled = LEADING_LABEL
        .as_ref()
        .map_or(trimmed, |re| re.find(trimmed).map_or(trimmed, |m| &trimmed[m.end()..]));
    unlabeled.trim().trim_matches(QUOTES).trim().to_string()
}

/// Fixed instructions, sent as the system prompt.
const EXTRACTION_INSTRUCTIONS: &str = r#"You are a highly specialized information extraction bot. Your task is to extract a list of only the cosmetic or skincare ingredients from the provided text.
The ingredients are typically listed after keywords like 'INGREDIENTS:', 'Ingredients:', 'Composition:', or similar.

Rules:
- Return a single, comma-separated string of the ingredients.
- Do NOT include any other text, numbers, or non-ingredient words.
- The output must be a clean list of ingredients, e.g., "Water, Glycerin, Butylene Glycol, Niacinamide, Sodium Hyaluronate"
- If no ingredients are found, return an empty string."#;

fn extraction_request(text: &str) -> String {
    format!("Text to analyze:\n---\n{text}\n---\n\nExtracted ingredients list:\n")
}
