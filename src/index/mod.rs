//! Vector index — one contract, two back ends.
//!
//! The trait shape mirrors `BlackboardStore`: a small set of operations a
//! caller programs against, a factory that resolves a concrete
//! implementation from config, and back ends that are otherwise invisible
//! above this module.

pub mod graph;
pub mod tree_forest;

use std::path::Path;

use crate::config::{Backend, Metric};
use crate::error::CacheResult;
use crate::quantize::Quantized;

/// One candidate returned by a search, ordered ascending by `distance`
/// (smaller is always better, regardless of metric).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub distance: f32,
}

/// The contract both back ends implement. Methods are synchronous local
/// compute; the controller is responsible for not blocking its async
/// runtime on a backend with expensive rebuild semantics (tree-forest
/// documents this in its own module).
pub trait VectorIndexBackend: Send + Sync {
    /// Insert a vector, optionally under a caller-chosen id. Returns the id
    /// actually used (auto-assigned when `id` is `None`).
    fn add_item(&self, vector: &Quantized, id: Option<u64>) -> CacheResult<u64>;

    /// Up to `k` nearest neighbours, ascending by distance; ties broken by
    /// smaller id.
    fn search(&self, vector: &Quantized, k: usize) -> CacheResult<Vec<SearchHit>>;

    /// Number of live vectors.
    fn count(&self) -> usize;

    /// Persist to an opaque file. Format is back-end defined.
    fn save(&self, path: &Path) -> CacheResult<()>;

    /// Restore from a file written by `save` on the same backend kind.
    fn load(&self, path: &Path) -> CacheResult<()>;

    /// Release backend resources and drop all vectors.
    fn destroy(&self);

    fn metric(&self) -> Metric;
}

/// Construct the configured backend. Fails with `BackendUnavailable` if the
/// requested backend cannot initialize (e.g. `graph` when the underlying
/// library cannot allocate its index for the given dimension).
pub fn build(backend: Backend, dim: usize, metric: Metric) -> CacheResult<Box<dyn VectorIndexBackend>> {
    match backend {
        Backend::TreeForest => Ok(Box::new(tree_forest::TreeForestIndex::new(dim, metric))),
        Backend::Graph => Ok(Box::new(graph::GraphIndex::new(dim, metric)?)),
    }
}

/// Cosine distance: `1 - cos(x, y)`. Callers wanting `similarity` take
/// `1 - distance` and clamp to `[0, 1]` themselves (the `ip` metric can
/// legitimately produce a "distance" that yields a negative similarity).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Euclidean (L2) distance.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// Negative inner product, so smaller is still better.
pub fn ip_distance(a: &[f32], b: &[f32]) -> f32 {
    -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
}

pub fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_distance(a, b),
        Metric::L2 => l2_distance(a, b),
        Metric::Ip => ip_distance(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_cosine_distance() {
        let v = [1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-5);
    }

    #[test]
    fn orthogonal_vectors_have_unit_cosine_distance() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_distance_is_symmetric() {
        let a = [1.0, 2.0];
        let b = [4.0, 6.0];
        assert_eq!(l2_distance(&a, &b), l2_distance(&b, &a));
        assert_eq!(l2_distance(&a, &b), 5.0);
    }
}
