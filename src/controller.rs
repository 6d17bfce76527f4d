//! Cache controller — orchestrates the normalizer, quantizer, compressor,
//! vector index and metadata store behind `lookup`/`insert`/`delete`/
//! `clear`/`stats`/`snapshot`/`restore`. Structurally grounded on
//! `SemanticCache` (lookup → search → threshold scan → stats bookkeeping,
//! store → maybe_evict → insert) and on `HashedBlackboard`'s
//! post/compact/clear lifecycle for the parts that have no vector-DB
//! analogue (entry dedup by fingerprint, in-memory clear/rebuild).
//!
//! All mutable state lives behind one `tokio::sync::Mutex`, matching the
//! single-cooperative-thread model: every public method is one critical
//! section, so the Metadata Store `set` inside `insert` is always the last
//! thing that happens before a concurrent `lookup` can observe the new
//! entry.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compress::{compress, decompress};
use crate::config::{Backend, Config};
use crate::entry::CacheEntry;
use crate::error::{CacheError, CacheResult};
use crate::index::{self, VectorIndexBackend};
use crate::normalize;
use crate::quantize::quantize;
use crate::savings::SavingsTracker;
use crate::store::MetadataStore;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Map a vector index's own id back to the `CacheEntry::id` that was
/// derived from it at insert time — the inverse of the derivation in
/// `CacheController::insert`.
fn entry_id_for_vector(backend: Backend, vector_id: u64) -> String {
    match backend {
        Backend::TreeForest => format!("{vector_id:016x}"),
        Backend::Graph => vector_id.to_string(),
    }
}

/// For the tree-forest backend the vector id is the fingerprint itself
/// (parsed back to the `u64` xxh64 produced), so `addItem` on a repeat
/// prompt always lands on the same id and overwrites in place. The graph
/// backend has no such notion; it always auto-assigns.
fn vector_id_hint(backend: Backend, prompt_hash: &str) -> Option<u64> {
    match backend {
        Backend::TreeForest => u64::from_str_radix(prompt_hash, 16).ok(),
        Backend::Graph => None,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counters {
    hits: u64,
    misses: u64,
    total_queries: u64,
}

struct State {
    index: Box<dyn VectorIndexBackend>,
    store: MetadataStore,
    counters: Counters,
    savings: SavingsTracker,
}

/// Result of a successful `lookup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub response: String,
    pub similarity: f32,
    pub is_exact_match: bool,
    pub cached_at: i64,
    pub metadata: CacheEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub vectors: usize,
    pub metadata: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_entries: usize,
    pub memory_usage: MemoryUsage,
    pub compression_ratio: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: String,
    pub total_queries: u64,
    pub saved_tokens: u64,
    pub saved_usd: f64,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    counters: Counters,
    entries: Vec<CacheEntry>,
    config: Config,
}

pub struct CacheController {
    config: Config,
    state: tokio::sync::Mutex<State>,
}

impl CacheController {
    pub fn new(config: Config) -> CacheResult<Self> {
        let index = index::build(config.backend, config.dim, config.metric)?;
        Ok(Self {
            state: tokio::sync::Mutex::new(State {
                index,
                store: MetadataStore::new(config.max_elements),
                counters: Counters::default(),
                savings: SavingsTracker::new(),
            }),
            config,
        })
    }

    /// Exact-then-approximate lookup. `min_similarity` overrides the
    /// configured threshold for this call only.
    pub async fn lookup(
        &self,
        prompt: &str,
        embedding: Option<&[f32]>,
        min_similarity: Option<f32>,
    ) -> CacheResult<Option<Hit>> {
        let prompt_hash = normalize::hash(prompt, false);
        let now = now_ms();
        let mut state = self.state.lock().await;
        state.counters.total_queries += 1;

        if let Some(entry) = state.store.find_by_prompt_hash(&prompt_hash, now) {
            match decompress(&entry.compressed_response, Some(entry.original_response_size)) {
                Ok(bytes) => {
                    state.counters.hits += 1;
                    let response = String::from_utf8_lossy(&bytes).into_owned();
                    return Ok(Some(Hit {
                        response,
                        similarity: 1.0,
                        is_exact_match: true,
                        cached_at: entry.created_at,
                        metadata: entry,
                    }));
                }
                Err(e) => {
                    log::warn!("corrupted payload for entry {}: {e}", entry.id);
                    state.store.remove(&entry.id);
                }
            }
        }

        let Some(embedding) = embedding else {
            state.counters.misses += 1;
            return Ok(None);
        };

        let quantized = quantize(embedding, self.config.dim)?;
        let threshold = min_similarity.unwrap_or(self.config.similarity_threshold);
        let n = state.index.count();
        if n == 0 {
            state.counters.misses += 1;
            return Ok(None);
        }

        let kmax = n.min(50);
        let mut k = n.min(5);
        loop {
            let candidates = state.index.search(&quantized, k)?;
            let mut any_stale = false;
            let mut found: Option<(CacheEntry, f32)> = None;

            for hit in &candidates {
                let similarity = (1.0 - hit.distance).clamp(0.0, 1.0);
                if similarity < threshold {
                    break;
                }
                let entry_id = entry_id_for_vector(self.config.backend, hit.id);
                match state.store.get(&entry_id, now) {
                    Some(entry) => {
                        found = Some((entry, similarity));
                        break;
                    }
                    None => any_stale = true,
                }
            }

            if let Some((entry, similarity)) = found {
                match decompress(&entry.compressed_response, Some(entry.original_response_size)) {
                    Ok(bytes) => {
                        state.counters.hits += 1;
                        let response = String::from_utf8_lossy(&bytes).into_owned();
                        return Ok(Some(Hit {
                            response,
                            similarity,
                            is_exact_match: false,
                            cached_at: entry.created_at,
                            metadata: entry,
                        }));
                    }
                    Err(e) => {
                        log::warn!("corrupted payload for entry {}: {e}", entry.id);
                        state.store.remove(&entry.id);
                    }
                }
            }

            if !any_stale || k >= kmax {
                break;
            }
            k = kmax.min(k + 5);
        }

        state.counters.misses += 1;
        Ok(None)
    }

    /// Insert (or overwrite, for a repeat normalized prompt) a prompt/
    /// response pair. The Metadata Store `set` call is the commit point: a
    /// cancellation before that point leaves at most an orphaned vector,
    /// which is harmless (see the vector-correspondence invariant in
    /// `index`'s module doc).
    pub async fn insert(
        &self,
        prompt: &str,
        response: &str,
        embedding: &[f32],
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        let normalized_prompt = normalize::normalize(prompt);
        let prompt_hash = normalize::hash(&normalized_prompt, true);
        let compressed_prompt = compress(prompt.as_bytes());
        let compressed_response = compress(response.as_bytes());
        let quantized = quantize(embedding, self.config.dim)?;

        let mut state = self.state.lock().await;
        let hint = vector_id_hint(self.config.backend, &prompt_hash);
        let vector_id = state.index.add_item(&quantized, hint)?;
        let id = entry_id_for_vector(self.config.backend, vector_id);

        // Enforce at-most-one-live-entry-per-fingerprint even when the new
        // id differs from whatever was there before (graph backend).
        state.store.remove_by_prompt_hash(&prompt_hash);

        let now = now_ms();
        let ttl = ttl_seconds.or(self.config.default_ttl_seconds);
        let expires_at = ttl.map(|secs| now + secs as i64 * 1000);

        let entry = CacheEntry {
            id,
            vector_id,
            prompt_hash,
            normalized_prompt,
            original_prompt_size: prompt.len(),
            original_response_size: response.len(),
            compressed_prompt_size: compressed_prompt.len(),
            compressed_response_size: compressed_response.len(),
            compressed_prompt,
            compressed_response,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            expires_at,
            vector_metric_hint: self.config.metric.into(),
        };

        state.store.set(entry);
        Ok(())
    }

    pub async fn delete(&self, prompt: &str) -> bool {
        let prompt_hash = normalize::hash(prompt, false);
        let mut state = self.state.lock().await;
        state.store.remove_by_prompt_hash(&prompt_hash).is_some()
    }

    /// Rebuild the vector index from scratch, with the same construction
    /// parameters, and clear the metadata store. Counters reset to zero.
    ///
    /// A fresh `index::build` is used instead of `VectorIndexBackend::destroy`
    /// because the graph backend's underlying `hora` index has no true
    /// "empty in place": `destroy` only clears its own side table, leaving
    /// stale nodes in the graph that a subsequent insert's reused auto-
    /// increment ids would collide with.
    pub async fn clear(&self) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        state.index = index::build(self.config.backend, self.config.dim, self.config.metric)?;
        state.store.clear();
        state.counters = Counters::default();
        Ok(())
    }

    pub async fn stats(&self) -> Stats {
        let state = self.state.lock().await;
        let entries = state.store.iter_entries();
        let total_entries = entries.len();
        let total_compressed: usize = entries.iter().map(|e| e.compressed_response_size).sum();
        let total_original: usize = entries.iter().map(|e| e.original_response_size).sum();
        let compression_ratio = if total_original == 0 {
            0.0
        } else {
            total_compressed as f64 / total_original as f64
        };
        let vectors_bytes = total_entries * self.config.dim;

        Stats {
            total_entries,
            memory_usage: MemoryUsage {
                vectors: vectors_bytes,
                metadata: total_compressed,
                total: vectors_bytes + total_compressed,
            },
            compression_ratio,
            cache_hits: state.counters.hits,
            cache_misses: state.counters.misses,
            hit_rate: if state.counters.total_queries == 0 {
                "0.0000".to_string()
            } else {
                format!(
                    "{:.4}",
                    state.counters.hits as f64 / state.counters.total_queries as f64
                )
            },
            total_queries: state.counters.total_queries,
            saved_tokens: state.savings.saved_tokens(),
            saved_usd: state.savings.saved_usd(),
        }
    }

    pub async fn track_savings(&self, tokens: u64, usd: f64) {
        self.state.lock().await.savings.track(tokens, usd);
    }

    /// Write `index.bin` (back-end opaque) and `metadata.json`
    /// (`{counters, entries[], config}`) into `dir`.
    pub async fn snapshot(&self, dir: &Path) -> CacheResult<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CacheError::Storage(format!("creating {}: {e}", dir.display())))?;

        let state = self.state.lock().await;
        state.index.save(&dir.join("index.bin"))?;

        let file = SnapshotFile {
            counters: state.counters.clone(),
            entries: state.store.iter_entries(),
            config: self.config.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| CacheError::Storage(format!("serializing metadata.json: {e}")))?;
        std::fs::write(dir.join("metadata.json"), bytes)
            .map_err(|e| CacheError::Storage(format!("writing metadata.json: {e}")))
    }

    /// Restore from a directory written by `snapshot`. Entries already past
    /// their deadline are skipped; live entries are re-inserted as-is since
    /// `expires_at` is an absolute timestamp, not a relative TTL.
    pub async fn restore(&self, dir: &Path) -> CacheResult<()> {
        let bytes = std::fs::read(dir.join("metadata.json"))
            .map_err(|e| CacheError::Storage(format!("reading metadata.json: {e}")))?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::Storage(format!("parsing metadata.json: {e}")))?;

        let mut state = self.state.lock().await;
        state.index.load(&dir.join("index.bin"))?;
        state.store.clear();
        let now = now_ms();
        for entry in file.entries {
            if !entry.is_expired(now) {
                state.store.set(entry);
            }
        }
        state.counters = file.counters;
        Ok(())
    }
}
