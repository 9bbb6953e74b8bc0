//! Deterministic stub embedder.
//!
//! Bag-of-tokens hashing: every token contributes a fixed pseudo-random
//! direction, the sum is L2-normalized. Texts sharing vocabulary therefore
//! get genuinely higher cosine similarity, which is enough structure for
//! retrieval and classifier tests without any model files.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::config::constants::EMBEDDING_DIM;
use crate::error::{CoreError, CoreResult};
use crate::traits::TextEmbedder;

pub struct StubEmbedder {
    dimensions: usize,
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: EMBEDDING_DIM,
        }
    }

    fn token_direction(&self, token: &str) -> Vec<f32> {
        // Splitmix-style expansion of the token hash into a fixed direction.
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let mut state = hasher.finish();
        let mut dir = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = ((state >> 11) as f64 / (1u64 << 53) as f64) as f32;
            dir.push(unit * 2.0 - 1.0);
        }
        dir
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty());
        let mut any = false;
        for token in tokens {
            any = true;
            for (v, d) in vector.iter_mut().zip(self.token_direction(token)) {
                *v += d;
            }
        }
        if !any {
            vector[0] = 1.0;
            return vector;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl TextEmbedder for StubEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        if text.is_empty() {
            return Err(CoreError::Embedding("empty input".to_string()));
        }
        Ok(self.generate(text))
    }

    fn model_id(&self) -> &str {
        "stub-bag-of-tokens-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::cosine_similarity;

    #[tokio::test]
    async fn embeddings_are_unit_norm_and_deterministic() {
        let embedder = StubEmbedder::new();
        let a = embedder.embed("cardiac catheterization lab").await.unwrap();
        let b = embedder.embed("cardiac catheterization lab").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_raises_similarity() {
        let embedder = StubEmbedder::new();
        let a = embedder.embed("hospitals with dialysis machines").await.unwrap();
        let b = embedder.embed("clinics with dialysis machines").await.unwrap();
        let c = embedder.embed("rainfall statistics for june").await.unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let embedder = StubEmbedder::new();
        assert!(embedder.embed("").await.is_err());
    }
}
