//! Graph back end — HNSW via the `hora` crate.
//!
//! `hora`'s `HNSWIndex` needs an explicit `build()` call before `search()`
//! returns anything useful (unlike the tree-forest backend's own lazy
//! rebuild, this isn't optional — `hora` simply has no live-insert graph
//! search). We track a dirty flag the same way tree-forest does so callers
//! never have to think about it. `hora::search` hands back candidate ids
//! only, no distances, so distances are recomputed from the vectors we
//! keep alongside the graph, against whichever metric this index was
//! configured with.

use std::collections::HashMap;
use std::path::Path;

use hora::core::ann_index::{ANNIndex, SerializableIndex};
use hora::core::metrics::Metric as HoraMetric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use parking_lot::RwLock;

use super::{distance, SearchHit, VectorIndexBackend};
use crate::config::Metric;
use crate::error::{CacheError, CacheResult};
use crate::quantize::{dequantize, Quantized};

const M: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 100;

fn to_hora_metric(metric: Metric) -> HoraMetric {
    match metric {
        Metric::Cosine => HoraMetric::CosineSimilarity,
        Metric::L2 => HoraMetric::Euclidean,
        Metric::Ip => HoraMetric::DotProduct,
    }
}

struct Inner {
    index: HNSWIndex<f32, usize>,
    vectors: HashMap<u64, Vec<f32>>,
    next_id: u64,
    dirty: bool,
}

pub struct GraphIndex {
    dim: usize,
    metric: Metric,
    inner: RwLock<Inner>,
}

impl GraphIndex {
    pub fn new(dim: usize, metric: Metric) -> CacheResult<Self> {
        let params = HNSWParams::<f32>::default()
            .max_item(1_000_000)
            .n_neighbor(M)
            .n_neighbor0(M * 2)
            .ef_build(EF_CONSTRUCTION)
            .ef_search(EF_SEARCH)
            .has_deletion(false);
        let index = HNSWIndex::<f32, usize>::new(dim, &params);
        Ok(Self {
            dim,
            metric,
            inner: RwLock::new(Inner {
                index,
                vectors: HashMap::new(),
                next_id: 0,
                dirty: true,
            }),
        })
    }

    fn ensure_built(inner: &mut Inner, metric: Metric) -> CacheResult<()> {
        if inner.dirty {
            inner
                .index
                .build(to_hora_metric(metric))
                .map_err(|e| CacheError::Storage(format!("building hnsw graph: {e}")))?;
            inner.dirty = false;
        }
        Ok(())
    }
}

impl VectorIndexBackend for GraphIndex {
    fn add_item(&self, vector: &Quantized, id: Option<u64>) -> CacheResult<u64> {
        if vector.dim() != self.dim {
            return Err(CacheError::InvalidShape {
                expected: self.dim,
                actual: vector.dim(),
            });
        }
        let floats = dequantize(vector);
        let mut inner = self.inner.write();
        let assigned = id.unwrap_or_else(|| {
            let next = inner.next_id;
            inner.next_id += 1;
            next
        });
        inner
            .index
            .add(&floats, assigned as usize)
            .map_err(|e| CacheError::Storage(format!("inserting into hnsw graph: {e}")))?;
        inner.vectors.insert(assigned, floats);
        inner.next_id = inner.next_id.max(assigned + 1);
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

        let mut inner = self.inner.write();
        Self::ensure_built(&mut inner, self.metric)?;
        let candidate_ids = inner.index.search(&query, k);

        let mut hits: Vec<SearchHit> = candidate_ids
            .into_iter()
            .filter_map(|id| {
                let id = id as u64;
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
        let mut inner = self.inner.write();
        Self::ensure_built(&mut inner, self.metric)?;
        inner
            .index
            .dump(path.to_str().ok_or_else(|| CacheError::Storage("non-utf8 path".into()))?)
            .map_err(|e| CacheError::Storage(format!("dumping hnsw graph: {e}")))?;

        // hora's dump only persists the graph; the side table of raw
        // vectors (needed to recompute distances on search) is ours.
        let side_path = path.with_extension("vectors.json");
        let bytes = serde_json::to_vec(&inner.vectors)
            .map_err(|e| CacheError::Storage(format!("serializing graph side table: {e}")))?;
        std::fs::write(&side_path, bytes)
            .map_err(|e| CacheError::Storage(format!("writing {}: {e}", side_path.display())))
    }

    fn load(&self, path: &Path) -> CacheResult<()> {
        let loaded = HNSWIndex::<f32, usize>::load(
            path.to_str().ok_or_else(|| CacheError::Storage("non-utf8 path".into()))?,
        )
        .map_err(|e| CacheError::Storage(format!("loading hnsw graph: {e}")))?;

        let side_path = path.with_extension("vectors.json");
        let side_bytes = std::fs::read(&side_path)
            .map_err(|e| CacheError::Storage(format!("reading {}: {e}", side_path.display())))?;
        let vectors: HashMap<u64, Vec<f32>> = serde_json::from_slice(&side_bytes)
            .map_err(|e| CacheError::Storage(format!("parsing graph side table: {e}")))?;

        let mut inner = self.inner.write();
        inner.next_id = vectors.keys().copied().max().map(|m| m + 1).unwrap_or(0);
        inner.vectors = vectors;
        inner.index = loaded;
        inner.dirty = false;
        Ok(())
    }

    fn destroy(&self) {
        let mut inner = self.inner.write();
        inner.vectors.clear();
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
        let idx = GraphIndex::new(4, Metric::L2).unwrap();
        let id = idx.add_item(&q(&[1.0, 0.0, 0.0, 0.0]), None).unwrap();
        let hits = idx.search(&q(&[1.0, 0.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].id, id);
    }

    #[test]
    fn auto_increment_ids_are_sequential() {
        let idx = GraphIndex::new(2, Metric::Cosine).unwrap();
        let a = idx.add_item(&q(&[1.0, 0.0]), None).unwrap();
        let b = idx.add_item(&q(&[0.0, 1.0]), None).unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn dimension_mismatch_errors() {
        let idx = GraphIndex::new(4, Metric::Cosine).unwrap();
        let err = idx.add_item(&q(&[1.0, 0.0]), None).unwrap_err();
        assert!(matches!(err, CacheError::InvalidShape { expected: 4, actual: 2 }));
    }
}
