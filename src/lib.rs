//! A semantic response cache for LLM clients.
//!
//! Sits between an LLM client and a provider, recognizing when a new prompt
//! is semantically equivalent to one already answered and returning the
//! prior response instead of paying for another round trip. Composes six
//! pieces: a prompt normalizer/fingerprinter for exact hits, a vector
//! quantizer and LZ4 compressor for compact storage, a pluggable
//! approximate-nearest-neighbour index for semantic hits, a TTL/LRU
//! metadata store, and a controller that orchestrates all of the above
//! behind [`tools::dispatch`].

pub mod compress;
pub mod config;
pub mod controller;
pub mod embedder;
pub mod entry;
pub mod error;
pub mod index;
pub mod normalize;
pub mod quantize;
pub mod savings;
pub mod store;
pub mod tools;

pub use config::Config;
pub use controller::{CacheController, Hit, Stats};
pub use embedder::{Embedder, Embedding, StubEmbedder};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult};
pub use tools::Tool;

/// Install `env_logger` as the diagnostic channel's backing implementation.
/// A no-op past the first call (including from another crate), so binaries
/// and test harnesses can call it unconditionally.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
