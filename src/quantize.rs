//! Vector quantizer — full-precision floats to 8-bit integers and back.
//!
//! `scale = max(|E[i]|) / 127`; each component is clamped to `[-127, 127]`
//! after scaling. An all-zero embedding quantizes to an all-zero vector
//! with `scale = 0` (there's nothing to recover a ratio from).

use crate::error::{CacheError, CacheResult};

/// A quantized embedding: signed 8-bit components plus the scale that
/// recovers an approximation of the original floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub components: Vec<i8>,
    pub scale: f32,
}

impl Quantized {
    pub fn dim(&self) -> usize {
        self.components.len()
    }
}

/// Quantize a dense embedding of length `dim`.
pub fn quantize(embedding: &[f32], dim: usize) -> CacheResult<Quantized> {
    if embedding.len() != dim {
        return Err(CacheError::InvalidShape {
            expected: dim,
            actual: embedding.len(),
        });
    }

    let max_abs = embedding.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if max_abs == 0.0 {
        return Ok(Quantized {
            components: vec![0i8; dim],
            scale: 0.0,
        });
    }

    let scale = max_abs / 127.0;
    let components = embedding
        .iter()
        .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
        .collect();

    Ok(Quantized { components, scale })
}

/// Dequantize back to an approximate float vector.
pub fn dequantize(q: &Quantized) -> Vec<f32> {
    q.components.iter().map(|&c| c as f32 * q.scale).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_vector_quantizes_to_zero_scale() {
        let q = quantize(&[0.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(q.scale, 0.0);
        assert_eq!(q.components, vec![0, 0, 0]);
    }

    #[test]
    fn dimension_mismatch_is_invalid_shape() {
        let err = quantize(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(err, CacheError::InvalidShape { expected: 3, actual: 2 }));
    }

    #[test]
    fn round_trip_error_bounded_by_scale() {
        let e = [1.0f32, -0.5, 0.25, 0.0, -1.0];
        let q = quantize(&e, e.len()).unwrap();
        let back = dequantize(&q);
        for (orig, approx) in e.iter().zip(back.iter()) {
            assert!((orig - approx).abs() <= q.scale + f32::EPSILON);
        }
    }

    #[test]
    fn max_component_maps_to_127() {
        let e = [3.0f32, -1.5, 0.0];
        let q = quantize(&e, 3).unwrap();
        assert_eq!(q.components[0], 127);
    }
}
