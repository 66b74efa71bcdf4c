//! LLM client abstraction.
//!
//! Provides a unified interface for the generative model used as the
//! ingredient lookup oracle, the explainer and the extractor.

mod ollama;
mod openai;
mod resilience;
mod unavailable;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use resilience::{LlmResilienceConfig, ResilientLlmProvider};
pub use unavailable::UnavailableClient;

use crate::Result;
use crate::config::{LlmConfig, LlmProviderKind};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Generates a completion with a system prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    ///
    /// Default implementation concatenates system and user prompts.
    /// Providers should override this to use native system prompt support.
    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let combined = format!("{system}\n\n---\n\n{user}");
        self.complete(&combined)
    }
}

impl<T: LlmProvider + ?Sized> LlmProvider for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }

    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete_with_system(system, user)
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }
}

/// Builds a blocking HTTP client for LLM requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Builds the configured provider wrapped in the resilience layer.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if the provider needs an API key
/// that is not configured.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let http = LlmHttpConfig::from_config(config);
    let resilience = LlmResilienceConfig::from_config(config);

    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderKind::Ollama => {
            let mut client = OllamaClient::new().with_http_config(http);
            if let Some(endpoint) = &config.base_url {
                client = client.with_endpoint(endpoint.clone());
            }
            if let Some(model) = &config.model {
                client = client.with_model(model.clone());
            }
            Arc::new(ResilientLlmProvider::new(client, resilience))
        },
        LlmProviderKind::OpenAi => {
            let api_key = config.api_key.as_ref().ok_or_else(|| {
                crate::Error::InvalidInput(
                    "llm.api_key (or OPENAI_API_KEY) is required for the openai provider"
                        .to_string(),
                )
            })?;
            let mut client = OpenAiClient::new()
                .with_api_key(api_key.expose_secret())
                .with_http_config(http);
            if let Some(endpoint) = &config.base_url {
                client = client.with_endpoint(endpoint.clone());
            }
            if let Some(model) = &config.model {
                client = client.with_model(model.clone());
            }
            Arc::new(ResilientLlmProvider::new(client, resilience))
        },
        LlmProviderKind::Unavailable => Arc::new(UnavailableClient),
    };

    tracing::debug!(provider = provider.name(), "LLM provider configured");
    Ok(provider)
}

/// Extracts JSON from LLM response, handling markdown code blocks.
pub(crate) fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle raw JSON (find first { to last })
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let response = r#"{"risk": "Low"}"#;
        let json = extract_json_from_response(response);
        assert_eq!(json, r#"{"risk": "Low"}"#);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"risk\": \"High\"}\n```";
        let json = extract_json_from_response(response);
        assert_eq!(json, "{\"risk\": \"High\"}");
    }

    #[test]
    fn test_extract_json_unlabelled_fence() {
        let response = "Sure:\n```\n{\"risk\": \"Medium\"}\n```";
        let json = extract_json_from_response(response);
        assert_eq!(json, "{\"risk\": \"Medium\"}");
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let response = "Here is the result: {\"risk\": \"Low\"} hope this helps";
        let json = extract_json_from_response(response);
        assert_eq!(json, r#"{"risk": "Low"}"#);
    }

    #[test]
    fn test_extract_json_no_object() {
        let response = "  I cannot help with that.  ";
        assert_eq!(extract_json_from_response(response), "I cannot help with that.");
    }

    #[test]
    fn test_build_unavailable_provider() {
        let config = LlmConfig {
            provider: LlmProviderKind::Unavailable,
            ..LlmConfig::default()
        };
        let provider = build_provider(&config).expect("provider");
        assert_eq!(provider.name(), "unavailable");
        assert!(provider.complete("hello").is_err());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = LlmConfig {
            provider: LlmProviderKind::OpenAi,
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            build_provider(&config),
            Err(crate::Error::InvalidInput(_))
        ));
    }
}
