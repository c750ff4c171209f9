// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reduced-precision re-encoding of weight values.
//!
//! Int8 quantization is per-tensor and asymmetric. The observed range is
//! widened to include zero so that `0.0` is exactly representable:
//!
//! ```text
//! scale      = (max - min) / 255
//! zero_point = clamp(round(-128 - min / scale), -128, 127)
//! q          = clamp(round(x / scale) + zero_point, -128, 127)
//! x'         = (q - zero_point) * scale
//! ```
//!
//! `round` is round-half-to-even and every step is computed in `f32`, so the
//! same input always yields the same bytes on every platform.

use crate::TensorError;

/// Affine dequantization parameters attached to an `I8` tensor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantParams {
    /// Step between adjacent quantized levels.
    pub scale: f32,
    /// Quantized value that represents `0.0`.
    pub zero_point: i32,
}

impl QuantParams {
    /// Derives parameters from an observed `[min, max]` range.
    ///
    /// # Errors
    /// Returns [`TensorError::Numeric`] when the range is not finite or
    /// collapses to a single point (an all-zero tensor), since no scale can
    /// be chosen.
    pub fn from_range(min: f32, max: f32) -> Result<Self, TensorError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(TensorError::Numeric {
                op: "quantize_i8",
                detail: format!("non-finite value range [{min}, {max}]"),
            });
        }
        let lo = min.min(0.0);
        let hi = max.max(0.0);
        let scale = (hi - lo) / 255.0;
        if !scale.is_normal() {
            return Err(TensorError::Numeric {
                op: "quantize_i8",
                detail: format!("degenerate value range [{min}, {max}]"),
            });
        }
        let zero_point = (-128.0 - lo / scale).round_ties_even().clamp(-128.0, 127.0) as i32;
        Ok(Self { scale, zero_point })
    }

    /// Quantizes a single value.
    pub fn quantize(&self, x: f32) -> i8 {
        ((x / self.scale).round_ties_even() + self.zero_point as f32).clamp(-128.0, 127.0) as i8
    }

    /// Recovers the approximate real value of a quantized level.
    pub fn dequantize(&self, q: i8) -> f32 {
        (q as i32 - self.zero_point) as f32 * self.scale
    }
}

/// Quantizes `values` to int8 with parameters chosen from their range.
///
/// # Errors
/// See [`QuantParams::from_range`]. An empty slice is also degenerate.
pub fn quantize_i8(values: &[f32]) -> Result<(Vec<i8>, QuantParams), TensorError> {
    if values.is_empty() {
        return Err(TensorError::Numeric {
            op: "quantize_i8",
            detail: "empty tensor".into(),
        });
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if values.iter().any(|v| v.is_nan()) {
        return Err(TensorError::Numeric {
            op: "quantize_i8",
            detail: "tensor contains NaN".into(),
        });
    }
    let params = QuantParams::from_range(min, max)?;
    let q = values.iter().map(|&x| params.quantize(x)).collect();
    Ok((q, params))
}

/// Expands int8 values back to `f32`.
pub fn dequantize_i8(values: &[i8], params: QuantParams) -> Vec<f32> {
    values.iter().map(|&q| params.dequantize(q)).collect()
}

/// Encodes `values` as little-endian IEEE half floats.
///
/// # Errors
/// Returns [`TensorError::Numeric`] if a value is non-finite or would
/// overflow the f16 range (|x| > 65504).
pub fn encode_f16(values: &[f32]) -> Result<Vec<u8>, TensorError> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for &v in values {
        let h = half::f16::from_f32(v);
        if !v.is_finite() || !h.is_finite() {
            return Err(TensorError::Numeric {
                op: "encode_f16",
                detail: format!("value {v} is not representable as f16"),
            });
        }
        out.extend_from_slice(&h.to_le_bytes());
    }
    Ok(out)
}
