// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax activation operation.

use crate::{Shape, TensorError};

/// Computes `softmax(beta * x)` along the last dimension.
///
/// Uses the numerically stable variant that subtracts the row maximum
/// before exponentiation.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if `input.len()` does not match
/// `shape`.
pub fn softmax(input: &[f32], shape: &Shape, beta: f32) -> Result<Vec<f32>, TensorError> {
    if input.len() != shape.num_elements() {
        return Err(TensorError::ShapeMismatch {
            op: "softmax",
            lhs: shape.clone(),
            rhs: Shape::vector(input.len()),
        });
    }

    let last_dim = shape.last_dim().unwrap_or(1);
    let mut out = vec![0.0f32; input.len()];
    if last_dim == 0 {
        return Ok(out);
    }

    for (row_src, row_dst) in input.chunks_exact(last_dim).zip(out.chunks_exact_mut(last_dim)) {
        let max_val = row_src.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for (d, &s) in row_dst.iter_mut().zip(row_src) {
            let e = (beta * (s - max_val)).exp();
            *d = e;
            sum += e;
        }

        if sum > 0.0 {
            let inv_sum = 1.0 / sum;
            row_dst.iter_mut().for_each(|d| *d *= inv_sum);
        }
    }

    Ok(out)
}
