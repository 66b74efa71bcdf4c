//! FastEmbed-based embedder.
//!
//! Provides semantic embeddings using the all-MiniLM-L6-v2 model via
//! fastembed-rs when the `fastembed-embeddings` feature is enabled.

use super::Embedder;
use crate::Result;
use std::sync::Arc;

#[cfg(feature = "fastembed-embeddings")]
mod native {
    use super::super::{DEFAULT_DIMENSIONS, Embedder};
    use crate::{Error, Result};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::OnceLock;
    use std::time::Instant;

    /// Lazily loaded model shared by all embedder instances.
    static EMBEDDING_MODEL: OnceLock<fastembed::TextEmbedding> = OnceLock::new();

    /// `FastEmbed` embedder using all-MiniLM-L6-v2.
    ///
    /// The model is loaded on the first embed call.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FastEmbedEmbedder;

    impl FastEmbedEmbedder {
        /// Model name.
        pub const MODEL_NAME: &'static str = "all-MiniLM-L6-v2";

        /// Creates a new embedder.
        #[must_use]
        pub const fn new() -> Self {
            Self
        }

        fn model() -> Result<&'static fastembed::TextEmbedding> {
            if let Some(model) = EMBEDDING_MODEL.get() {
                return Ok(model);
            }

            tracing::info!(model = Self::MODEL_NAME, "Loading embedding model");
            let start = Instant::now();
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false);
            let model =
                fastembed::TextEmbedding::try_new(options).map_err(|e| Error::OperationFailed {
                    operation: "load_embedding_model".to_string(),
                    cause: e.to_string(),
                })?;
            tracing::info!(
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Embedding model loaded"
            );

            let _ = EMBEDDING_MODEL.set(model);
            EMBEDDING_MODEL.get().ok_or_else(|| Error::OperationFailed {
                operation: "load_embedding_model".to_string(),
                cause: "model initialization race".to_string(),
            })
        }

        fn run(texts: Vec<String>, operation: &str) -> Result<Vec<Vec<f32>>> {
            let model = Self::model()?;
            catch_unwind(AssertUnwindSafe(|| model.embed(texts, None)))
                .map_err(|panic_info| {
                    let panic_msg = panic_info
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic_info.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(panic_message = %panic_msg, "ONNX runtime panicked");
                    Error::OperationFailed {
                        operation: operation.to_string(),
                        cause: format!("ONNX runtime panic: {panic_msg}"),
                    }
                })?
                .map_err(|e| Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                })
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn id(&self) -> String {
            format!("fastembed-{}", Self::MODEL_NAME)
        }

        fn dimensions(&self) -> usize {
            DEFAULT_DIMENSIONS
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }
            Self::run(vec![text.to_string()], "embed")?
                .into_iter()
                .next()
                .ok_or_else(|| Error::OperationFailed {
                    operation: "embed".to_string(),
                    cause: "No embedding returned from model".to_string(),
                })
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            if texts.iter().any(|t| t.trim().is_empty()) {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }
            Self::run(texts.iter().map(|s| (*s).to_string()).collect(), "embed_batch")
        }
    }
}

#[cfg(feature = "fastembed-embeddings")]
pub use native::FastEmbedEmbedder;

/// Builds the native embedder.
#[cfg(feature = "fastembed-embeddings")]
pub(super) fn build() -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(FastEmbedEmbedder::new()))
}

/// Reports that the native embedder was not compiled in.
#[cfg(not(feature = "fastembed-embeddings"))]
pub(super) fn build() -> Result<Arc<dyn Embedder>> {
    Err(crate::Error::FeatureNotEnabled(
        "fastembed-embeddings".to_string(),
    ))
}
