// Embeddings module
// Abstracts the service that turns text into vectors

use anyhow::Result;

/// Default dimensionality of `text-embedding-ada-002`
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

/// A text embedding backend.
///
/// Returned vectors are in input order, one per text.
pub trait Embedder: Send + Sync {
    /// Bulk embedding used while building an index; may retry transient failures
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed a single query. Backends that retry in `embed` must not retry here.
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }
}
