//! Deterministic bag-of-words embedder
//!
//! Hashes lowercase word tokens into a fixed number of buckets and L2
//! normalises the counts. Texts sharing vocabulary land close together, which
//! is enough for offline use and for tests that must not download a model.

use super::{EmbeddingError, EmbeddingProvider};

pub const HASHING_MODEL_NAME: &str = "hashing";

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Hashing embedder needs a non-zero dimension".to_string(),
            ));
        }
        Ok(Self { dimension })
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            vector[bucket] += 1.0;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(EmbeddingError::InvalidInput(
                "Text has no word tokens".to_string(),
            ));
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in vector.iter_mut() {
            *x /= norm;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let a = embedder.embed("Meal prep for busy weeks").unwrap();
        let b = embedder.embed("meal PREP for busy weeks!").unwrap();

        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let a = embedder.embed("productivity tips for your morning").unwrap();
        let b = embedder.embed("morning productivity tips").unwrap();
        let c = embedder.embed("sourdough starter feeding schedule").unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_rejects_tokenless_text() {
        let embedder = HashingEmbedder::new(16).unwrap();
        assert!(matches!(
            embedder.embed(" ... "),
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(HashingEmbedder::new(0).is_err());
    }
}
