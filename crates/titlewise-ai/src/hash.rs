//! Feature-hashing embedder. Deterministic, needs no model files.

use async_trait::async_trait;

use titlewise_core::Embed;

pub const DEFAULT_HASH_DIM: usize = 256;

/// Bag-of-tokens embedding: every lowercased alphanumeric token (and each
/// adjacent token pair) is hashed with blake3 into one of `dim` buckets, then
/// the vector is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        for token in &tokens {
            self.accumulate(&mut vec, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut vec, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        normalize(&mut vec);
        vec
    }

    fn accumulate(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let idx = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize % self.dim;
        vec[idx] += weight;
    }
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[async_trait]
impl Embed for HashEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("State: Telangana | SRO: Kapra").await.unwrap();
        let b = embedder.embed("State: Telangana | SRO: Kapra").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASH_DIM);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashEmbedder::new(8).embed_sync("  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_tokens_are_closer() {
        let e = HashEmbedder::default();
        let query = e.embed_sync("State: Andhra Pradesh | District: Guntur | Survey: 225/2");
        let near = e.embed_sync("State: Andhra Pradesh | District: Guntur | Survey: 225/2\n[Review Notes] ok");
        let far = e.embed_sync("State: Kerala | District: Ernakulam | Survey: 17/1\n[Review Notes] ok");
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }
}
