//! Embedding collaborator seam.

use async_trait::async_trait;

/// Text → fixed-length vector. Implementations must be deterministic for
/// identical text under the same model.
#[async_trait]
pub trait Embed: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Length of every vector this embedder returns.
    fn dim(&self) -> usize;
}
