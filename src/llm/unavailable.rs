//! Offline provider.

use super::LlmProvider;
use crate::{Error, Result};

/// Provider used when no generative model is reachable.
///
/// Every call fails, so the resolver falls through to the heuristic and the
/// explainer to its placeholder text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableClient;

impl LlmProvider for UnavailableClient {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::OperationFailed {
            operation: "llm_complete".to_string(),
            cause: "no LLM provider configured".to_string(),
        })
    }
}
