//! Prompt normalization and fingerprinting.
//!
//! Keeps the exact-hit fast path cheap: lowercase, trim, collapse internal
//! whitespace runs to a single space, then hash with a seeded xxh64. The
//! hash is semantically opaque — only determinism and a low collision rate
//! matter, so a 64-bit non-cryptographic hash with an all-zero seed is the
//! right tool, not SHA-256.

const FINGERPRINT_SEED: u64 = 0;

/// Lowercase, trim, and collapse whitespace runs to a single space.
/// Non-empty-only normalization; empty input yields the empty string.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            in_run = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// 16-character lowercase hex fingerprint of the normalized prompt.
pub fn hash(text: &str, already_normalized: bool) -> String {
    let normalized = if already_normalized {
        text.to_string()
    } else {
        normalize(text)
    };
    let digest = xxhash_rust::xxh64::xxh64(normalized.as_bytes(), FINGERPRINT_SEED);
    format!("{digest:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(normalize("  What   is\tML?\n"), "what is ml?");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n  "), "");
    }

    #[test]
    fn idempotent() {
        let samples = ["What is ML?", "  FOO  bar ", "", "already normal"];
        for s in samples {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn hash_is_stable_and_16_hex_chars() {
        let h1 = hash("What is ML?", false);
        let h2 = hash("what   is ml?", false);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn already_normalized_skips_renormalization() {
        // Passing text with uppercase but claiming it's already normalized
        // must hash the literal bytes, not the normalized form.
        let literal = hash("Not Actually Normalized", true);
        let normalized = hash("Not Actually Normalized", false);
        assert_ne!(literal, normalized);
    }
}
