//! Deterministic feature-hashing embedder.
//!
//! Needs no model server: each lowercase word is hashed into a bucket and the
//! vector is L2-normalised, so texts sharing words land close together under
//! cosine similarity. Used by tests and for offline play with the in-memory
//! vector store.

use super::{Embedder, EmbeddingError};
use async_trait::async_trait;

pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn identical_text_is_identical_vector() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.embed_text("Goblin ambush"), embedder.embed_text("goblin AMBUSH"));
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_text("The red dragon breathes fire");
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_text("goblin armor class");
        let related = embedder.embed_text("Goblin: armor class 15, hit points 7");
        let unrelated = embedder.embed_text("The tavern keeper pours mead");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8);
        assert!(embedder.embed_text("  ").iter().all(|v| *v == 0.0));
    }
}
