//! The embedding backend seam.

use async_trait::async_trait;

/// An embedding-generation backend.
///
/// Contract of the batch endpoint we target: `embed_batch` returns exactly
/// one vector per input, in request order, all of `dimensions()` length.
/// Callers pair responses to requests positionally.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;
}
