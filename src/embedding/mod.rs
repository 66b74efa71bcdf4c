//! Embedding generation.
//!
//! Provides embeddings for the retrieval index: a deterministic lexical
//! hashing embedder (default), Ollama embeddings, or a native fastembed model.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation for hash index calculations on 32-bit platforms.
#![allow(clippy::cast_possible_truncation)]

mod fastembed;
mod hash;
mod ollama;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed::FastEmbedEmbedder;
pub use hash::HashEmbedder;
pub use ollama::OllamaEmbedder;

use crate::Result;
use crate::config::{EmbeddingBackend, EmbeddingConfig};
use std::sync::Arc;

/// Default embedding dimensions.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Identifier recorded with persisted vectors.
    ///
    /// Vectors saved under a different identifier are never reused.
    fn id(&self) -> String;

    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Builds the configured embedder.
///
/// # Errors
///
/// Returns [`crate::Error::FeatureNotEnabled`] if the fastembed backend is
/// selected without the `fastembed-embeddings` feature, or
/// [`crate::Error::InvalidInput`] for a zero dimension count.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend {
        EmbeddingBackend::Hash => {
            if config.dimensions == 0 {
                return Err(crate::Error::InvalidInput(
                    "embedding.dimensions must be greater than zero".to_string(),
                ));
            }
            Ok(Arc::new(HashEmbedder::with_dimensions(config.dimensions)))
        },
        EmbeddingBackend::Ollama => {
            let mut embedder = OllamaEmbedder::new();
            if let Some(endpoint) = &config.base_url {
                embedder = embedder.with_endpoint(endpoint.clone());
            }
            if let Some(model) = &config.model {
                embedder = embedder.with_model(model.clone());
            }
            Ok(Arc::new(embedder))
        },
        EmbeddingBackend::Fastembed => fastembed::build(),
    }
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or 0.0 if the vectors differ in length,
/// are empty, or have zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Normalizes an embedding vector in-place to unit length.
pub(crate) fn normalize_embedding(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 {
        return;
    }
    let inv_norm = norm_sq.sqrt().recip();
    for v in embedding.iter_mut() {
        *v *= inv_norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_invalid() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_build_hash_embedder() {
        let config = EmbeddingConfig {
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = build_embedder(&config).expect("hash embedder");
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.id(), "hash-64");
    }

    #[test]
    fn test_build_rejects_zero_dimensions() {
        let config = EmbeddingConfig {
            dimensions: 0,
            ..EmbeddingConfig::default()
        };
        assert!(build_embedder(&config).is_err());
    }

    #[cfg(not(feature = "fastembed-embeddings"))]
    #[test]
    fn test_fastembed_requires_feature() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Fastembed,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            build_embedder(&config),
            Err(crate::Error::FeatureNotEnabled(_))
        ));
    }
}
