//! Text embedding seam.

use async_trait::async_trait;

use crate::error::CoreResult;

/// Produces 384-dimensional unit-norm sentence embeddings.
///
/// Implementations must be deterministic for a fixed model: the corpus is
/// indexed once and queried many times, and re-running a query must
/// reproduce its ranking. The model identifier is recorded alongside the
/// corpus so a query-side mismatch is detectable.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed one text into a unit-norm vector of [`crate::config::constants::EMBEDDING_DIM`].
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    /// Embed a batch; the default loops over [`TextEmbedder::embed`].
    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Fixed identifier of the underlying model.
    fn model_id(&self) -> &str;
}

/// Cosine similarity of two equal-length vectors. For unit-norm inputs this
/// is the dot product; the denominator guards non-normalized callers.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na < 1e-12 || nb < 1e-12 {
        return 0.0;
    }
    dot / (na * nb)
}
