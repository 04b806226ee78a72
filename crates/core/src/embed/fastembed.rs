//! Local transformer inference via fastembed (ONNX runtime).
//!
//! Available behind the `onnx` feature. Model weights are fetched into the
//! cache directory on first use; initialization failure at startup is fatal
//! by design, so the provider constructor surfaces it as an error rather
//! than degrading.

use std::path::PathBuf;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{CoreError, CoreResult};

/// fastembed-backed [`super::Embedder`] running AllMiniLM-L6-v2 (384-dim).
pub struct FastEmbedder {
    model: tokio::sync::Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Initialize the default model, optionally caching weights under
    /// `cache_dir`.
    pub fn new(cache_dir: Option<PathBuf>) -> CoreResult<Self> {
        let model_type = EmbeddingModel::AllMiniLML6V2;
        let mut options = InitOptions::new(model_type.clone());
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(options).map_err(|e| {
            CoreError::Unavailable(format!("embedding model initialization failed: {e}"))
        })?;
        Ok(Self {
            model: tokio::sync::Mutex::new(model),
            model_name: format!("{model_type:?}"),
            dimension: 384,
        })
    }
}

#[async_trait]
impl super::Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self.model.lock().await;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| CoreError::Unavailable(format!("embedding inference failed: {e}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
