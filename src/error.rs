//! Error taxonomy for the cache core.
//!
//! One variant per failure mode named in the error-handling design: schema
//! violations and shape mismatches are local to the caller, corruption is
//! logged on the diagnostic channel and downgraded to a miss/`isError`
//! envelope by the controller and tool dispatcher respectively, and
//! construction errors propagate straight through.

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Parameter schema violation: missing required field, wrong type, or
    /// an out-of-range value (e.g. `similarityThreshold` outside `[0, 1]`).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Embedding length did not match the configured dimension.
    #[error("invalid shape: expected dimension {expected}, got {actual}")]
    InvalidShape { expected: usize, actual: usize },

    /// Decompression or quantized-vector deserialization failed. The
    /// offending entry is deleted by the caller; this error never reaches
    /// an external caller as-is.
    #[error("corrupted payload: {0}")]
    CorruptedPayload(String),

    /// The requested vector index back end could not be constructed.
    #[error("vector index backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The embedder returned nothing (or errored) and the caller has no
    /// fallback embedding to store.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Internal control flow only; never surfaced directly to a caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Snapshot/restore I/O or (de)serialization failure.
    #[error("storage error: {0}")]
    Storage(String),
}
