//! Ollama embeddings client.

use super::Embedder;
use crate::llm::{LlmHttpConfig, build_http_client};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Embedder backed by Ollama's `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl OllamaEmbedder {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "nomic-embed-text";

    /// Output size of the default model.
    pub const DEFAULT_DIMENSIONS: usize = 768;

    /// Creates a new embedder with default endpoint and model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            dimensions: Self::DEFAULT_DIMENSIONS,
            client: build_http_client(LlmHttpConfig::default()),
        }
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the expected output size.
    #[must_use]
    pub const fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

impl Default for OllamaEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for OllamaEmbedder {
    fn id(&self) -> String {
        format!("ollama-{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .map_err(|e| {
                tracing::error!(
                    provider = "ollama",
                    model = %self.model,
                    error = %e,
                    "Embedding request failed"
                );
                Error::OperationFailed {
                    operation: "ollama_embed".to_string(),
                    cause: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::OperationFailed {
                operation: "ollama_embed".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        let response: EmbeddingResponse =
            response.json().map_err(|e| Error::OperationFailed {
                operation: "ollama_embed_response".to_string(),
                cause: e.to_string(),
            })?;

        if response.embedding.len() != self.dimensions {
            return Err(Error::OperationFailed {
                operation: "ollama_embed_response".to_string(),
                cause: format!(
                    "model {} returned {} dimensions, expected {}",
                    self.model,
                    response.embedding.len(),
                    self.dimensions
                ),
            });
        }

        Ok(response.embedding)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}
