use crate::error::ServiceError;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Text to fixed-length vector. Remote implementations live in
/// [`crate::services`]; [`HashingEmbedder`] runs offline.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ServiceError::Backend {
            service: "embedder".to_string(),
            details: "no vector returned".to_string(),
        })
    }
}

/// Window width for the character shingles hashed into buckets.
const SHINGLE_WIDTH: usize = 4;

/// Deterministic character-shingle hashing embedder. No network, no model;
/// used for offline runs and as the test stand-in for the remote embedder.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        // Shorter texts still get a vector from the whole string.
        let width = SHINGLE_WIDTH.min(chars.len());
        if width == 0 {
            return vector;
        }

        for shingle in chars.windows(width) {
            let mut hash = 5381u64;
            for symbol in shingle {
                hash = hash.wrapping_mul(33) ^ (*symbol as u64);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Embedder, HashingEmbedder};

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed("multa por rescisão antecipada").await.unwrap();
        let second = embedder.embed("multa por rescisão antecipada").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_configured_length() {
        let embedder = HashingEmbedder { dimensions: 32 };
        let vectors = embedder
            .embed_batch(&["abc".to_string(), "def".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|vector| vector.len() == 32));
    }
}
