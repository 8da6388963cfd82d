//! Remote embedding provider for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{EmbeddingOutput, EmbeddingProvider, EmbeddingUsage};
use crate::config::EmbeddingConfig;
use crate::error::{ErrorCode, MemoryError, Result};
use crate::http::JsonClient;

pub struct RemoteEmbeddingProvider {
    http: JsonClient,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    model: Option<String>,
    usage: Option<EmbeddingUsage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "no API key set for remote embedding provider");
        }
        let http = JsonClient::new(
            &config.base_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
            ErrorCode::EmbeddingFailed,
        )?;

        tracing::info!(model = %config.model, base_url = %config.base_url, "remote embedding provider ready");
        Ok(Self {
            http,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_batch_size: config.max_batch_size.max(1),
        })
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn embed_batch_detailed(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response: EmbeddingResponse = self.http.post(
            "/embeddings",
            &EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dimensions,
            },
        )?;

        collect_outputs(response, texts.len(), self.dimensions, &self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Reorder by `index` and check count and dimension.
fn collect_outputs(
    mut response: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
    requested_model: &str,
) -> Result<Vec<EmbeddingOutput>> {
    if response.data.len() != expected {
        return Err(MemoryError::new(
            ErrorCode::EmbeddingFailed,
            format!("expected {expected} embeddings, got {}", response.data.len()),
        ));
    }
    response.data.sort_by_key(|d| d.index);

    let model = response.model.unwrap_or_else(|| requested_model.to_string());
    response
        .data
        .into_iter()
        .map(|d| {
            if d.embedding.len() != dimensions {
                return Err(MemoryError::new(
                    ErrorCode::DimensionMismatch,
                    format!("expected {dimensions} dimensions, got {}", d.embedding.len()),
                ));
            }
            Ok(EmbeddingOutput {
                vector: d.embedding,
                model: model.clone(),
                usage: response.usage,
            })
        })
        .collect()
}
