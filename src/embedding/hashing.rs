//! Offline feature-hashing embedder.
//!
//! Maps each lowercase alphanumeric token (stop words and single characters
//! dropped) to a bucket and a sign taken from its SHA-256 digest, weights
//! buckets by `1 + ln(tf)`, and L2-normalises the result. No model download,
//! no network, identical output on every platform.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::{check_input, Embedder};
use crate::error::EmbeddingError;

pub const DEFAULT_DIMS: usize = 384;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "me", "my", "of", "on", "or", "our", "the", "this", "to", "was",
    "what", "which", "with", "you", "your",
];

pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in tokenize(text) {
            *tf.entry(token).or_insert(0) += 1;
        }

        let mut vector = vec![0.0f32; self.dims];
        for (token, count) in tf {
            let digest = Sha256::digest(token.as_bytes());
            let mut word = [0u8; 8];
            word.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(word);
            let bucket = (h % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * (1.0 + (count as f32).ln());
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash-sha256"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        check_input(texts)?;
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn tokenizer_drops_stop_words_and_punctuation() {
        let tokens: Vec<String> = tokenize("What is my Hemoglobin level?").collect();
        assert_eq!(tokens, vec!["hemoglobin", "level"]);
    }

    #[test]
    fn vectors_are_unit_length() {
        let e = HashingEmbedder::default();
        let v = e.embed_one("Glucose, Fasting 95 mg/dL");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(v.len(), DEFAULT_DIMS);
    }

    #[test]
    fn deterministic_bit_for_bit() {
        let a = HashingEmbedder::new(128).embed_one("Hemoglobin 13.5 g/dL");
        let b = HashingEmbedder::new(128).embed_one("Hemoglobin 13.5 g/dL");
        assert_eq!(a, b);
    }

    #[test]
    fn shared_terms_score_higher() {
        let e = HashingEmbedder::default();
        let q = e.embed_one("What is my hemoglobin level?");
        let hit = e.embed_one("Hemoglobin 13.5 g/dL (Reference: 12.0–15.5)");
        let miss = e.embed_one("Triglycerides 120 mg/dL (Reference: <150)");
        assert!(cosine_similarity(&q, &hit) > cosine_similarity(&q, &miss));
    }

    #[tokio::test]
    async fn empty_batch_is_an_error() {
        let e = HashingEmbedder::default();
        assert!(matches!(e.embed(&[]).await, Err(EmbeddingError::EmptyInput)));
        assert!(matches!(
            e.embed(&["   ".to_string()]).await,
            Err(EmbeddingError::EmptyInput)
        ));
    }
}
