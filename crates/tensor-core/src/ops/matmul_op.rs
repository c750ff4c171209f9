// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication and dense (fully-connected) layers.

use crate::{Shape, TensorError};

/// Performs `lhs @ rhs` where `lhs` is `[..., K]` and `rhs` is `[K, N]`.
///
/// Leading dimensions of `lhs` are treated as independent rows, so the
/// output shape is `lhs_shape` with its last dimension replaced by `N`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the inner dimensions differ or
/// `rhs` is not 2-D.
pub fn matmul(
    lhs: &[f32],
    lhs_shape: &Shape,
    rhs: &[f32],
    rhs_shape: &Shape,
) -> Result<(Vec<f32>, Shape), TensorError> {
    let mismatch = || TensorError::ShapeMismatch {
        op: "matmul",
        lhs: lhs_shape.clone(),
        rhs: rhs_shape.clone(),
    };
    if rhs_shape.rank() != 2 || lhs_shape.rank() == 0 {
        return Err(mismatch());
    }
    let k = lhs_shape.last_dim().ok_or_else(mismatch)?;
    if rhs_shape.dims()[0] != k {
        return Err(mismatch());
    }
    let n = rhs_shape.dims()[1];
    let m = if k == 0 { 0 } else { lhs.len() / k };

    let mut out = vec![0.0f32; m * n];
    matmul_f32_generic(lhs, rhs, &mut out, m, k, n);
    Ok((out, lhs_shape.with_last_dim(n)))
}

/// Dense layer: `input @ kernel + bias`, with `kernel` laid out `[in, units]`.
pub fn linear(
    input: &[f32],
    input_shape: &Shape,
    kernel: &[f32],
    kernel_shape: &Shape,
    bias: Option<&[f32]>,
) -> Result<(Vec<f32>, Shape), TensorError> {
    let (mut out, shape) = matmul(input, input_shape, kernel, kernel_shape)?;
    if let Some(bias) = bias {
        let units = kernel_shape.dims()[1];
        if bias.len() != units {
            return Err(TensorError::ShapeMismatch {
                op: "linear (bias)",
                lhs: Shape::vector(units),
                rhs: Shape::vector(bias.len()),
            });
        }
        for row in out.chunks_exact_mut(units.max(1)) {
            for (o, b) in row.iter_mut().zip(bias) {
                *o += b;
            }
        }
    }
    Ok((out, shape))
}

/// Portable f32 matrix multiplication.
///
/// ikj loop order: the inner loop is a saxpy over a row of `c`, which is
/// sequential in memory.
fn matmul_f32_generic(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    for i in 0..m {
        for p in 0..k {
            let a_ip = a[i * k + p];
            let c_row = &mut c[i * n..(i + 1) * n];
            let b_row = &b[p * n..(p + 1) * n];
            for j in 0..n {
                c_row[j] += a_ip * b_row[j];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_2x3_times_3x2() {
        // [[1, 2, 3], [4, 5, 6]] @ [[7, 8], [9, 10], [11, 12]] = [[58, 64], [139, 154]]
        let (c, shape) = matmul(
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            &Shape::matrix(2, 3),
            &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
            &Shape::matrix(3, 2),
        )
        .unwrap();
        assert_eq!(shape, Shape::matrix(2, 2));
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_rank3_lhs() {
        let (c, shape) = matmul(
            &[1.0, 0.0, 0.0, 1.0],
            &Shape::new(vec![1, 2, 2]),
            &[2.0, 3.0, 4.0, 5.0],
            &Shape::matrix(2, 2),
        )
        .unwrap();
        assert_eq!(shape, Shape::new(vec![1, 2, 2]));
        assert_eq!(c, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let result = matmul(
            &[0.0; 6],
            &Shape::matrix(2, 3),
            &[0.0; 8],
            &Shape::matrix(4, 2),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_linear_with_bias() {
        let (y, shape) = linear(
            &[1.0, 2.0],
            &Shape::matrix(1, 2),
            &[1.0, 0.0, 0.0, 1.0],
            &Shape::matrix(2, 2),
            Some(&[0.5, -0.5]),
        )
        .unwrap();
        assert_eq!(shape, Shape::matrix(1, 2));
        assert_eq!(y, vec![1.5, 1.5]);
    }

    #[test]
    fn test_linear_bias_length_checked() {
        let result = linear(
            &[1.0, 2.0],
            &Shape::matrix(1, 2),
            &[1.0, 0.0, 0.0, 1.0],
            &Shape::matrix(2, 2),
            Some(&[0.5]),
        );
        assert!(result.is_err());
    }
}
