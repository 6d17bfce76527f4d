//! Tree-forest back end — a forest of random-projection binary trees
//! (the Annoy-style algorithm spec.md §4.4 describes). Pure Rust, no
//! native bindings; this is the zero-dependency default backend.
//!
//! The forest is built lazily on the first `search` after any `add_item`
//! since the last build (a dirty flag), and rebuilt from scratch rather
//! than incrementally — `L` and `F` are small enough (10 trees, 100 points
//! per leaf) that a full rebuild stays cheap relative to a `search` miss
//! going all the way to the LLM.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{distance, SearchHit, VectorIndexBackend};
use crate::config::Metric;
use crate::error::{CacheError, CacheResult};
use crate::quantize::{dequantize, Quantized};

const FOREST_SIZE: usize = 10;
const LEAF_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf(Vec<u64>),
    Split {
        normal: Vec<f32>,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct Inner {
    vectors: HashMap<u64, Vec<f32>>,
    next_id: u64,
    trees: Vec<Node>,
    dirty: bool,
}

#[derive(Serialize, Deserialize)]
struct Persisted {
    dim: usize,
    vectors: Vec<(u64, Vec<f32>)>,
    next_id: u64,
    trees: Vec<Node>,
}

pub struct TreeForestIndex {
    dim: usize,
    metric: Metric,
    inner: RwLock<Inner>,
}

impl TreeForestIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            inner: RwLock::new(Inner {
                vectors: HashMap::new(),
                next_id: 0,
                trees: Vec::new(),
                dirty: true,
            }),
        }
    }

    fn build_tree(rng: &mut StdRng, ids: &[u64], vectors: &HashMap<u64, Vec<f32>>, dim: usize) -> Node {
        if ids.len() <= LEAF_SIZE {
            return Node::Leaf(ids.to_vec());
        }

        let normal: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        let mut projections: Vec<(u64, f32)> = ids
            .iter()
            .map(|&id| {
                let v = &vectors[&id];
                let proj: f32 = v.iter().zip(&normal).map(|(x, n)| x * n).sum();
                (id, proj)
            })
            .collect();
        projections.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mid = projections.len() / 2;
        let threshold = projections[mid].1;

        let (left_proj, right_proj) = projections.split_at(mid);
        let (left_ids, right_ids): (Vec<u64>, Vec<u64>) = if left_proj.is_empty() || right_proj.is_empty() {
            // Degenerate split (all points identical on this projection):
            // fall back to an arbitrary even split to guarantee progress.
            let half = ids.len() / 2;
            (ids[..half].to_vec(), ids[half..].to_vec())
        } else {
            (
                left_proj.iter().map(|(id, _)| *id).collect(),
                right_proj.iter().map(|(id, _)| *id).collect(),
            )
        };

        let left = Self::build_tree(rng, &left_ids, vectors, dim);
        let right = Self::build_tree(rng, &right_ids, vectors, dim);

        Node::Split {
            normal,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn rebuild(inner: &mut Inner, dim: usize) {
        let ids: Vec<u64> = inner.vectors.keys().copied().collect();
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        inner.trees = (0..FOREST_SIZE)
            .map(|_| Self::build_tree(&mut rng, &ids, &inner.vectors, dim))
            .collect();
        inner.dirty = false;
    }

    fn collect_leaf(node: &Node, query: &[f32], out: &mut Vec<u64>) {
        match node {
            Node::Leaf(ids) => out.extend(ids.iter().copied()),
            Node::Split { normal, threshold, left, right } => {
                let proj: f32 = query.iter().zip(normal).map(|(x, n)| x * n).sum();
                if proj <= *threshold {
                    Self::collect_leaf(left, query, out);
                } else {
                    Self::collect_leaf(right, query, out);
                }
            }
        }
    }
}

impl VectorIndexBackend for TreeForestIndex {
    fn add_item(&self, vector: &Quantized, id: Option<u64>) -> CacheResult<u64> {
        if vector.dim() != self.dim {
            return Err(CacheError::InvalidShape {
                expected: self.dim,
                actual: vector.dim(),
            });
        }
        let mut inner = self.inner.write();
        let assigned = id.unwrap_or_else(|| {
            let next = inner.next_id;
            inner.next_id += 1;
            next
        });
        inner.vectors.insert(assigned, dequantize(vector));
        inner.dirty = true;
        Ok(assigned)
    }

    fn search(&self, vector: &Quantized, k: usize) -> CacheResult<Vec<SearchHit>> {
        if vector.dim() != self.dim {
            return Err(CacheError::InvalidShape {
                expected: self.dim,
                actual: vector.dim(),
            });
        }
        let query = dequantize(vector);

        {
            let needs_rebuild = self.inner.read().dirty;
            if needs_rebuild {
                let mut inner = self.inner.write();
                if inner.dirty {
                    Self::rebuild(&mut inner, self.dim);
                }
            }
        }

        let inner = self.inner.read();
        let mut candidates: Vec<u64> = Vec::new();
        for tree in &inner.trees {
            Self::collect_leaf(tree, &query, &mut candidates);
        }
        candidates.sort_unstable();
        candidates.dedup();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|id| {
                inner.vectors.get(&id).map(|v| SearchHit {
                    id,
                    distance: distance(self.metric, &query, v),
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    fn count(&self) -> usize {
        self.inner.read().vectors.len()
    }

    fn save(&self, path: &Path) -> CacheResult<()> {
        let inner = self.inner.read();
        let persisted = Persisted {
            dim: self.dim,
            vectors: inner.vectors.iter().map(|(id, v)| (*id, v.clone())).collect(),
            next_id: inner.next_id,
            trees: inner.trees.clone(),
        };
        let bytes = serde_json::to_vec(&persisted)
            .map_err(|e| CacheError::Storage(format!("serializing tree-forest index: {e}")))?;
        std::fs::write(path, bytes)
            .map_err(|e| CacheError::Storage(format!("writing {}: {e}", path.display())))
    }

    fn load(&self, path: &Path) -> CacheResult<()> {
        let bytes = std::fs::read(path)
            .map_err(|e| CacheError::Storage(format!("reading {}: {e}", path.display())))?;
        let persisted: Persisted = serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::Storage(format!("parsing tree-forest index: {e}")))?;
        let mut inner = self.inner.write();
        inner.vectors = persisted.vectors.into_iter().collect();
        inner.next_id = persisted.next_id;
        inner.trees = persisted.trees;
        inner.dirty = inner.trees.is_empty() && !inner.vectors.is_empty();
        Ok(())
    }

    fn destroy(&self) {
        let mut inner = self.inner.write();
        inner.vectors.clear();
        inner.trees.clear();
        inner.next_id = 0;
        inner.dirty = true;
    }

    fn metric(&self) -> Metric {
        self.metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::quantize;

    fn q(v: &[f32]) -> Quantized {
        quantize(v, v.len()).unwrap()
    }

    #[test]
    fn add_then_search_finds_self() {
        let idx = TreeForestIndex::new(4, Metric::Cosine);
        let id = idx.add_item(&q(&[1.0, 0.0, 0.0, 0.0]), None).unwrap();
        let hits = idx.search(&q(&[1.0, 0.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].id, id);
        assert!(hits[0].distance < 1e-4);
    }

    #[test]
    fn explicit_id_is_honored_and_overwrite_replaces() {
        let idx = TreeForestIndex::new(2, Metric::L2);
        idx.add_item(&q(&[1.0, 1.0]), Some(42)).unwrap();
        assert_eq!(idx.count(), 1);
        idx.add_item(&q(&[2.0, 2.0]), Some(42)).unwrap();
        assert_eq!(idx.count(), 1, "re-adding under the same id overwrites");
    }

    #[test]
    fn count_reflects_live_vectors() {
        let idx = TreeForestIndex::new(3, Metric::Cosine);
        for i in 0..5u64 {
            idx.add_item(&q(&[i as f32, 0.0, 0.0]), Some(i)).unwrap();
        }
        assert_eq!(idx.count(), 5);
    }

    #[test]
    fn dimension_mismatch_errors() {
        let idx = TreeForestIndex::new(4, Metric::Cosine);
        let err = idx.add_item(&q(&[1.0, 0.0]), None).unwrap_err();
        assert!(matches!(err, CacheError::InvalidShape { expected: 4, actual: 2 }));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let idx = TreeForestIndex::new(3, Metric::Cosine);
        idx.add_item(&q(&[1.0, 0.0, 0.0]), Some(1)).unwrap();
        idx.add_item(&q(&[0.0, 1.0, 0.0]), Some(2)).unwrap();
        idx.search(&q(&[1.0, 0.0, 0.0]), 1).unwrap(); // force a build
        idx.save(&path).unwrap();

        let restored = TreeForestIndex::new(3, Metric::Cosine);
        restored.load(&path).unwrap();
        assert_eq!(restored.count(), 2);
        let hits = restored.search(&q(&[1.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].id, 1);
    }
}
