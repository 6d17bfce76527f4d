//! UTF-8 byte compressor — LZ4 block framing via `lz4_flex`.
//!
//! `compress_prepend_size` stores the uncompressed length ahead of the
//! compressed block, so decompression is self-describing; the
//! `original_size` hint some back ends need is accepted for contract
//! compatibility but unused here.

use crate::error::{CacheError, CacheResult};

/// Compress a UTF-8 byte sequence. Empty input returns empty output.
pub fn compress(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        return Vec::new();
    }
    lz4_flex::block::compress_prepend_size(bytes)
}

/// Decompress a byte sequence produced by [`compress`]. `original_size` is
/// an optional hint, accepted for symmetry with back ends that cannot
/// self-describe their output; the LZ4 framing here ignores it.
pub fn decompress(bytes: &[u8], _original_size: Option<usize>) -> CacheResult<Vec<u8>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    lz4_flex::block::decompress_size_prepended(bytes)
        .map_err(|e| CacheError::CorruptedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round_trips_to_empty() {
        assert_eq!(compress(b""), Vec::<u8>::new());
        assert_eq!(decompress(b"", None).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let text = "ML is the study of algorithms that improve through experience.".repeat(8);
        let compressed = compress(text.as_bytes());
        let restored = decompress(&compressed, None).unwrap();
        assert_eq!(restored, text.as_bytes());
    }

    #[test]
    fn truncated_input_is_corrupted_payload() {
        let text = "some response text worth compressing more than a few bytes".repeat(4);
        let compressed = compress(text.as_bytes());
        let truncated = &compressed[..compressed.len() / 2];
        let err = decompress(truncated, None).unwrap_err();
        assert!(matches!(err, CacheError::CorruptedPayload(_)));
    }

    #[test]
    fn non_lz4_input_is_corrupted_payload() {
        let garbage = vec![0xFFu8; 64];
        let err = decompress(&garbage, None).unwrap_err();
        assert!(matches!(err, CacheError::CorruptedPayload(_)));
    }
}
