//! Embedder capability — the duck-typed dependency spec.md §9 calls for,
//! rendered as a trait object. Mirrors `EmbeddingService` in the teacher's
//! RAG module (`embed`/`model_name`/`dimensions`), made async and folded
//! into one `generate` call since the only two call sites (`cache_store`,
//! `generate_embedding`) always want vector and model name together.

use async_trait::async_trait;

use crate::error::CacheResult;

/// An embedding plus the name of the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
}

/// External collaborator: turns text into a vector. The core never embeds
/// anything itself; this trait is the seam tests stub out and a real
/// deployment backs with an HTTP client.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn generate(&self, text: &str) -> CacheResult<Embedding>;

    /// Dimension this embedder's vectors have. Used by callers to size a
    /// `Config` before constructing a controller around this embedder.
    fn dimensions(&self) -> usize;
}

/// Deterministic stub embedder: hashes the input into a unit-ish vector of
/// the configured dimension. Not semantically meaningful — it exists so
/// `cache_store`/`generate_embedding` have something to call when no real
/// embedding model is wired in, and so tests get reproducible vectors
/// without a network dependency.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn generate(&self, text: &str) -> CacheResult<Embedding> {
        let normalized = crate::normalize::normalize(text);
        let mut vector = Vec::with_capacity(self.dim);
        for i in 0..self.dim {
            let seeded = xxhash_rust::xxh64::xxh64(normalized.as_bytes(), i as u64);
            // Map into [-1, 1] via the low 24 bits, keeping this cheap and
            // allocation-free per component.
            let bits = (seeded & 0x00FF_FFFF) as f32 / 0x00FF_FFFF as f32;
            vector.push(bits * 2.0 - 1.0);
        }
        Ok(Embedding {
            vector,
            model: "stub-hash-embedder".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_embedder_produces_configured_dimension() {
        let embedder = StubEmbedder::new(16);
        let e = embedder.generate("hello world").await.unwrap();
        assert_eq!(e.vector.len(), 16);
        assert_eq!(embedder.dimensions(), 16);
    }

    #[tokio::test]
    async fn stub_embedder_is_deterministic_after_normalization() {
        let embedder = StubEmbedder::new(8);
        let a = embedder.generate("What is ML?").await.unwrap();
        let b = embedder.generate("what   is ml?").await.unwrap();
        assert_eq!(a.vector, b.vector);
    }
}
