//! # Embeddings
//!
//! Text → vector conversion for the router and the policy search tool.
//!
//! The [`Embedder`] trait is the seam between this crate and whatever produces
//! vectors. The default implementation, [`SentenceEmbeddingsModel`], runs
//! `sentence-transformers/all-MiniLM-L6-v2` through Candle (pure Rust) and returns
//! 384-d, L2-normalized vectors. Model files are fetched once from the Hugging Face Hub
//! and cached locally by `hf-hub`.
//!
//! ## Quick Example
//! ```no_run
//! use bank_router::embeddings::{Embedder, SentenceEmbeddingsModel, cosine_distance};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SentenceEmbeddingsModel::load_default().await?;
//! let a = model.embed("I want a personal loan")?;
//! let b = model.embed("Need a loan for my wedding")?;
//! println!("distance = {:.3}", cosine_distance(&a, &b));
//! # Ok(()) }
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::tokio::Api};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::error::{Result, RouterError};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_REVISION: &str = "main";
pub const DEFAULT_DIMENSION: usize = 384;

/// Anything that can turn text into a fixed-dimension vector.
pub trait Embedder {
    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts. Fails on the first error.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl SentenceEmbeddingsModel {
    /// Load `all-MiniLM-L6-v2` from the Hugging Face Hub cache (downloading it on first use).
    pub async fn load_default() -> Result<Self> {
        Self::load(DEFAULT_MODEL_ID, DEFAULT_REVISION).await
    }

    /// Load a BERT sentence-transformer from the Hugging Face Hub.
    ///
    /// # Errors
    /// [`RouterError::Embedding`] if the files cannot be fetched or parsed, or
    /// [`RouterError::Candle`] if the weights fail to load.
    pub async fn load(model_id: &str, revision: &str) -> Result<Self> {
        let device = Device::Cpu;

        info!("Loading embedding model {model_id}@{revision}");
        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let api = Api::new().map_err(|e| RouterError::Embedding(e.to_string()))?;
        let api_repo = api.repo(repo);

        let fetch = |e: hf_hub::api::tokio::ApiError| RouterError::Embedding(e.to_string());
        let config_filename = api_repo.get("config.json").await.map_err(fetch)?;
        let tokenizer_filename = api_repo.get("tokenizer.json").await.map_err(fetch)?;
        let weights_filename = api_repo.get("model.safetensors").await.map_err(fetch)?;

        let raw_config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&raw_config)
            .map_err(|e| RouterError::Embedding(format!("Invalid model config: {e}")))?;
        let dimension = serde_json::from_str::<serde_json::Value>(&raw_config)
            .ok()
            .and_then(|v| v.get("hidden_size").and_then(|h| h.as_u64()))
            .map(|h| h as usize)
            .unwrap_or(DEFAULT_DIMENSION);

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| RouterError::Embedding(format!("Failed to load tokenizer: {e}")))?;

        // SAFETY: the safetensors file is owned by the hf-hub cache and not mutated while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        debug!("Embedding model ready, dimension {dimension}");
        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> Result<Tensor> {
        // embeddings: [1, seq_len, hidden]; mask becomes [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }
}

impl Embedder for SentenceEmbeddingsModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Tokenizer truncates at 512 tokens
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RouterError::Embedding(format!("Tokenization error: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let pooled = self.mean_pooling(&output, tokens.get_attention_mask())?;

        let mut vector = pooled.to_vec1::<f32>()?;
        normalize(&mut vector);
        Ok(vector)
    }
}

/// L2-normalize in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// Mismatched lengths or a zero vector yield `1.0` (orthogonal).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_keyword_embedder_similarity() {
        let e = KeywordEmbedder { dimension: 64 };
        let a = e.embed("personal loan interest").unwrap();
        let b = e.embed("loan interest rate").unwrap();
        let c = e.embed("cooking pasta tonight").unwrap();
        assert!(cosine_distance(&a, &b) < cosine_distance(&a, &c));
    }

    #[test]
    fn test_embed_many_propagates_errors() {
        let e = FailingEmbedder;
        let err = e.embed_many(&["a".to_string()]).unwrap_err();
        assert!(matches!(err, RouterError::Embedding(_)));
    }

    #[tokio::test]
    #[ignore = "downloads all-MiniLM-L6-v2 from the Hugging Face Hub"]
    async fn test_sentence_embeddings_model() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let model = SentenceEmbeddingsModel::load_default().await?;
        let v = model.embed("Rust is cool.")?;
        assert_eq!(v.len(), DEFAULT_DIMENSION);
        let q = model.embed("Programming is fun.")?;
        assert!(cosine_distance(&v, &q) < 1.0);
        Ok(())
    }
}
