//! Cache configuration — a single immutable record, overridable from
//! environment variables the same way `BlackboardConfig` resolves its
//! `CREWAI_BLACKBOARD_*` knobs: `Config::default()` for struct-only
//! construction, `Config::from_env()` when a process wrapper wants to
//! layer env vars on top.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Distance metric used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Cosine,
    L2,
    Ip,
}

impl Default for Metric {
    fn default() -> Self {
        Self::Cosine
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "ip" => Ok(Self::Ip),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// Which vector index back end to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Forest of random-projection trees. Pure Rust, no native deps.
    TreeForest,
    /// HNSW graph, higher QPS at larger scale.
    Graph,
}

impl Default for Backend {
    fn default() -> Self {
        Self::TreeForest
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tree-forest" | "tree_forest" | "treeforest" => Ok(Self::TreeForest),
            "graph" | "hnsw" => Ok(Self::Graph),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Construction-time configuration for the cache controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Embedding dimension. Default 1536 (OpenAI-sized); 384 is the value
    /// used with the bundled small stub embedder.
    pub dim: usize,
    /// Metadata store capacity before LRU eviction kicks in.
    pub max_elements: usize,
    /// Minimum similarity for an approximate hit.
    pub similarity_threshold: f32,
    /// Informational only; not enforced by the core.
    pub memory_limit: String,
    /// Default TTL in seconds applied when `insert` is not given one.
    /// `None` means entries never expire unless a per-call TTL is given.
    pub default_ttl_seconds: Option<u64>,
    pub backend: Backend,
    pub metric: Metric,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 1536,
            max_elements: 100_000,
            similarity_threshold: 0.85,
            memory_limit: "1gb".to_string(),
            default_ttl_seconds: Some(3600),
            backend: Backend::default(),
            metric: Metric::default(),
        }
    }
}

impl Config {
    /// Layer recognized environment variables over `Config::default()`.
    /// Malformed values are logged and ignored rather than panicking —
    /// a process wrapper's misconfigured env var should not crash the
    /// whole cache, it should fall back to the documented default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("VECTOR_INDEX_BACKEND") {
            match v.parse() {
                Ok(backend) => cfg.backend = backend,
                Err(e) => log::warn!("ignoring VECTOR_INDEX_BACKEND={v:?}: {e}"),
            }
        }

        if let Ok(v) = std::env::var("CACHE_SIMILARITY_THRESHOLD") {
            match v.parse::<f32>() {
                Ok(t) if (0.0..=1.0).contains(&t) => cfg.similarity_threshold = t,
                Ok(t) => log::warn!("ignoring CACHE_SIMILARITY_THRESHOLD={t}: out of [0,1]"),
                Err(e) => log::warn!("ignoring CACHE_SIMILARITY_THRESHOLD={v:?}: {e}"),
            }
        }

        if let Ok(v) = std::env::var("CACHE_MAX_ELEMENTS") {
            match v.parse() {
                Ok(n) => cfg.max_elements = n,
                Err(e) => log::warn!("ignoring CACHE_MAX_ELEMENTS={v:?}: {e}"),
            }
        }

        if let Ok(v) = std::env::var("CACHE_DEFAULT_TTL") {
            match v.parse() {
                Ok(secs) => cfg.default_ttl_seconds = Some(secs),
                Err(e) => log::warn!("ignoring CACHE_DEFAULT_TTL={v:?}: {e}"),
            }
        }

        cfg
    }
}
