//! Cache entry — the immutable-except-for-hit-bookkeeping tuple created by
//! `insert`. Content-addressed by `prompt_hash`, exactly like
//! `BlackboardEntry` is content-addressed by `content_hash`; the
//! lifecycle/builder shape is carried over directly, the fields are not.

use serde::{Deserialize, Serialize};

use crate::config::Metric;

/// A single cached prompt/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Identifier known to both the metadata store and the vector index.
    /// The fingerprint for the tree-forest backend, an auto-incrementing
    /// decimal for the graph backend (see `index` module).
    pub id: String,
    /// Id the vector index itself uses. Usually equal to `id`.
    pub vector_id: u64,
    /// 16-hex-char fingerprint of the normalized prompt.
    pub prompt_hash: String,
    pub normalized_prompt: String,
    pub compressed_prompt: Vec<u8>,
    pub compressed_response: Vec<u8>,
    pub original_prompt_size: usize,
    pub original_response_size: usize,
    pub compressed_prompt_size: usize,
    pub compressed_response_size: usize,
    /// Wall-clock milliseconds at insert.
    pub created_at: i64,
    /// Wall-clock milliseconds, mutated on every hit.
    pub last_accessed: i64,
    /// Mutated on every hit.
    pub access_count: u64,
    /// Absolute deadline in milliseconds. `None` means no expiry.
    pub expires_at: Option<i64>,
    /// Informational: which metric the index was configured with at
    /// insert time, surfaced in stats/snapshots for operators debugging a
    /// changed `metric` config across restarts.
    pub vector_metric_hint: MetricHint,
}

/// Serializable mirror of [`Metric`] for entry/snapshot persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricHint {
    Cosine,
    L2,
    Ip,
}

impl From<Metric> for MetricHint {
    fn from(m: Metric) -> Self {
        match m {
            Metric::Cosine => Self::Cosine,
            Metric::L2 => Self::L2,
            Metric::Ip => Self::Ip,
        }
    }
}

impl CacheEntry {
    /// Is this entry expired as of `now_ms`?
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(deadline) if now_ms >= deadline)
    }

    /// Record a hit: bump access bookkeeping. The only mutation permitted
    /// outside of `insert`.
    pub fn record_hit(&mut self, now_ms: i64) {
        self.last_accessed = now_ms;
        self.access_count += 1;
    }
}

impl std::fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] accessed={} hits={} size={}B->{}B",
            self.prompt_hash,
            self.last_accessed,
            self.access_count,
            self.original_response_size,
            self.compressed_response_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            id: "abc123".into(),
            vector_id: 1,
            prompt_hash: "abc123".into(),
            normalized_prompt: "what is ml?".into(),
            compressed_prompt: vec![1, 2, 3],
            compressed_response: vec![4, 5, 6],
            original_prompt_size: 11,
            original_response_size: 20,
            compressed_prompt_size: 3,
            compressed_response_size: 3,
            created_at: 1_000,
            last_accessed: 1_000,
            access_count: 0,
            expires_at: None,
            vector_metric_hint: MetricHint::Cosine,
        }
    }

    #[test]
    fn never_expires_without_deadline() {
        let e = sample_entry();
        assert!(!e.is_expired(i64::MAX));
    }

    #[test]
    fn expires_when_now_reaches_deadline() {
        let mut e = sample_entry();
        e.expires_at = Some(2_000);
        assert!(!e.is_expired(1_999));
        assert!(e.is_expired(2_000));
        assert!(e.is_expired(2_001));
    }

    #[test]
    fn record_hit_updates_bookkeeping_only() {
        let mut e = sample_entry();
        e.record_hit(5_000);
        assert_eq!(e.last_accessed, 5_000);
        assert_eq!(e.access_count, 1);
        assert_eq!(e.prompt_hash, "abc123");
    }
}
