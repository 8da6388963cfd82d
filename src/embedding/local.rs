//! Local ONNX Runtime embedding provider.
//!
//! Implements [`EmbeddingProvider`] using the all-MiniLM-L6-v2
//! model via `ort`. Handles tokenization, inference, mean pooling, and L2 normalization.

use std::fmt::Display;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EmbeddingOutput, EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;
use crate::error::{ErrorCode, MemoryError, Result};

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

/// Local ONNX-based embedding provider using all-MiniLM-L6-v2.
pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
    max_batch_size: usize,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

fn failed<E: Display>(what: &'static str) -> impl FnOnce(E) -> MemoryError {
    move |e| MemoryError::new(ErrorCode::EmbeddingFailed, what).with_cause(e)
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        for (path, what) in [(&model_path, "ONNX model"), (&tokenizer_path, "Tokenizer")] {
            if !path.exists() {
                return Err(MemoryError::new(
                    ErrorCode::EmbeddingFailed,
                    format!(
                        "{what} not found at {}. Run `mneme model download` first.",
                        path.display()
                    ),
                ));
            }
        }

        let session = Session::builder()
            .map_err(failed("failed to create ONNX session"))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(failed("failed to create ONNX session"))?
            .with_intra_threads(4)
            .map_err(failed("failed to create ONNX session"))?
            .commit_from_file(&model_path)
            .map_err(failed("failed to load ONNX model"))?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(failed("failed to load tokenizer"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(failed("failed to set truncation"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
            max_batch_size: config.max_batch_size.max(1),
        })
    }

    fn run(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        // Step 1: Tokenize
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(failed("tokenization failed"))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        // Step 2: Build flat input tensors as i64
        let mut input_ids_flat = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask_flat = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            input_ids_flat.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_flat.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids_flat.into_boxed_slice()))
            .map_err(failed("failed to build input tensor"))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask_flat.clone().into_boxed_slice()))
                .map_err(failed("failed to build input tensor"))?;
        // token_type_ids: all zeros (single sentence, no segment B)
        let token_type_ids_tensor =
            Tensor::from_array((shape, vec![0i64; batch_size * seq_len].into_boxed_slice()))
                .map_err(failed("failed to build input tensor"))?;

        // Step 3: Run ONNX inference
        let mut session = self
            .session
            .lock()
            .map_err(|e| MemoryError::new(ErrorCode::EmbeddingFailed, "session lock poisoned").with_cause(e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            })
            .map_err(failed("ONNX inference failed"))?;

        // Step 4: Token embeddings, shape [batch, seq_len, 384]. The output
        // name varies by ONNX export; fall back to index 0.
        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .map_err(failed("failed to extract token_embeddings tensor"))?;

        let dims: &[i64] = &shape;
        if dims.len() != 3 || dims[2] != EMBEDDING_DIM as i64 {
            return Err(MemoryError::new(
                ErrorCode::DimensionMismatch,
                format!("unexpected token_embeddings shape: {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"),
            ));
        }
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        // Step 5: Mean pooling with attention mask
        let mut results = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;

            for s in 0..actual_seq_len {
                let mask = attention_mask_flat[b * seq_len + s] as f32;
                if mask > 0.0 {
                    let offset = (b * actual_seq_len + s) * hidden_dim;
                    for (d, acc) in sum.iter_mut().enumerate() {
                        *acc += data[offset + d] * mask;
                    }
                    count += mask;
                }
            }

            if count > 0.0 {
                sum.iter_mut().for_each(|v| *v /= count);
            }

            // Step 6: L2 normalize
            results.push(l2_normalize(&sum));
        }

        Ok(results)
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed_batch_detailed(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>> {
        Ok(self
            .run(texts)?
            .into_iter()
            .map(|vector| EmbeddingOutput {
                vector,
                model: self.model.clone(),
                usage: None,
            })
            .collect())
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.run(texts)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_model_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            cache_dir: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let err = LocalEmbeddingProvider::new(&config).err().unwrap();
        assert_eq!(err.code, ErrorCode::EmbeddingFailed);
        assert!(err.message.contains("mneme model download"));
    }

    fn model_config() -> EmbeddingConfig {
        EmbeddingConfig::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (norm_a * norm_b)
    }

    #[test]
    #[ignore] // Requires model files: cargo test -- --ignored
    fn embeds_normalized_384_dim_vectors() {
        let provider = LocalEmbeddingProvider::new(&model_config()).unwrap();
        let embedding = provider.embed("Hello world").unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "L2 norm should be ~1.0, got {norm}");
    }

    #[test]
    #[ignore]
    fn detailed_batch_reports_model() {
        let provider = LocalEmbeddingProvider::new(&model_config()).unwrap();
        let outputs = provider
            .embed_batch_detailed(&["First sentence", "Second sentence"])
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.model == "all-MiniLM-L6-v2" && o.usage.is_none()));
    }

    #[test]
    #[ignore]
    fn preference_query_matches_preference_memory() {
        let provider = LocalEmbeddingProvider::new(&model_config()).unwrap();
        let memory = provider.embed("I prefer TypeScript").unwrap();
        let related = provider.embed("programming language preference").unwrap();
        let unrelated = provider.embed("weather tomorrow").unwrap();

        let sim_related = cosine_similarity(&memory, &related);
        let sim_unrelated = cosine_similarity(&memory, &unrelated);
        assert!(sim_related >= 0.3, "got {sim_related}");
        assert!(sim_unrelated < 0.8, "got {sim_unrelated}");
    }
}
