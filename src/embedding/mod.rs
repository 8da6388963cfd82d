//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, a local implementation using
//! all-MiniLM-L6-v2 (384 dimensions, L2-normalized), and a remote
//! implementation for OpenAI-compatible `/embeddings` endpoints. The provider
//! is created via [`create_provider`] from configuration.

pub mod local;
pub mod remote;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{ErrorCode, MemoryError, Result};

/// Number of dimensions produced by the local model (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Token accounting reported by remote providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

/// One embedded text with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingOutput {
    pub vector: Vec<f32>,
    pub model: String,
    /// Usage for the request this vector came from; `None` for local models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<EmbeddingUsage>,
}

/// Trait for embedding text into vectors.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch, one output per input, in input order.
    fn embed_batch_detailed(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(self
            .embed_batch_detailed(texts)?
            .into_iter()
            .map(|o| o.vector)
            .collect())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::new(ErrorCode::EmbeddingFailed, "provider returned no vector"))
    }

    /// Length of every vector this provider produces.
    fn dimensions(&self) -> usize;

    /// Largest batch accepted by one provider call.
    fn max_batch_size(&self) -> usize;

    /// Model identifier recorded alongside stored vectors.
    fn model(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// `"local"` requires the model files (run `mneme model download` first);
/// `"openai"` requires a tokio runtime and, for most endpoints, an API key.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            if config.dimensions != EMBEDDING_DIM {
                return Err(MemoryError::new(
                    ErrorCode::DimensionMismatch,
                    format!(
                        "local model produces {EMBEDDING_DIM} dimensions, config says {}",
                        config.dimensions
                    ),
                ));
            }
            Ok(Box::new(local::LocalEmbeddingProvider::new(config)?))
        }
        "openai" => Ok(Box::new(remote::RemoteEmbeddingProvider::new(config)?)),
        other => Err(MemoryError::new(
            ErrorCode::InvalidInput,
            format!("unknown embedding provider: {other}. Supported: local, openai"),
        )),
    }
}

/// Embed any number of texts in provider-sized chunks.
///
/// A failing chunk aborts the whole call; the error context names the chunk.
pub fn embed_chunked(provider: &dyn EmbeddingProvider, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let chunk_size = provider.max_batch_size().max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (i, chunk) in texts.chunks(chunk_size).enumerate() {
        let batch = provider
            .embed_batch(chunk)
            .map_err(|e| e.with_context("chunk", i).with_context("chunk_size", chunk.len()))?;
        if batch.len() != chunk.len() {
            return Err(MemoryError::new(
                ErrorCode::EmbeddingFailed,
                format!("provider returned {} vectors for {} texts", batch.len(), chunk.len()),
            )
            .with_context("chunk", i));
        }
        vectors.extend(batch);
    }

    Ok(vectors)
}
