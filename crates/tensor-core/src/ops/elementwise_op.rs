// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise unary and broadcasting binary operations.

use crate::{Shape, TensorError};

/// Unary element-wise functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Relu6,
    Sigmoid,
    Tanh,
    /// Reciprocal square root, `1 / sqrt(x)`.
    Rsqrt,
}

impl UnaryOp {
    #[inline]
    fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Relu6 => x.clamp(0.0, 6.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Rsqrt => 1.0 / x.sqrt(),
        }
    }
}

/// Applies `op` to every element of `input`.
pub fn unary(op: UnaryOp, input: &[f32]) -> Vec<f32> {
    input.iter().map(|&x| op.apply(x)).collect()
}

/// Binary element-wise functions with numpy-style broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    #[inline]
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
        }
    }
}

/// Applies `op` to `a` and `b`, broadcasting their shapes.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] when the shapes cannot be
/// broadcast together or a buffer length disagrees with its shape.
pub fn binary(
    op: BinaryOp,
    a: &[f32],
    a_shape: &Shape,
    b: &[f32],
    b_shape: &Shape,
) -> Result<(Vec<f32>, Shape), TensorError> {
    let mismatch = || TensorError::ShapeMismatch {
        op: op.name(),
        lhs: a_shape.clone(),
        rhs: b_shape.clone(),
    };
    if a.len() != a_shape.num_elements() || b.len() != b_shape.num_elements() {
        return Err(mismatch());
    }
    let out_shape = a_shape.broadcast(b_shape).ok_or_else(mismatch)?;

    // Fast path: identical shapes.
    if a_shape == b_shape {
        let out = a.iter().zip(b).map(|(&x, &y)| op.apply(x, y)).collect();
        return Ok((out, out_shape));
    }

    let rank = out_shape.rank();
    let a_strides = broadcast_strides(a_shape, rank);
    let b_strides = broadcast_strides(b_shape, rank);
    let out_dims = out_shape.dims();

    let total = out_shape.num_elements();
    let mut out = Vec::with_capacity(total);
    let mut index = vec![0usize; rank];
    for _ in 0..total {
        let mut ai = 0;
        let mut bi = 0;
        for d in 0..rank {
            ai += index[d] * a_strides[d];
            bi += index[d] * b_strides[d];
        }
        out.push(op.apply(a[ai], b[bi]));

        // Advance the multi-dimensional counter.
        for d in (0..rank).rev() {
            index[d] += 1;
            if index[d] < out_dims[d] {
                break;
            }
            index[d] = 0;
        }
    }
    Ok((out, out_shape))
}

/// Strides of `shape` right-aligned to `rank`, with broadcast axes set to 0.
fn broadcast_strides(shape: &Shape, rank: usize) -> Vec<usize> {
    let own = shape.strides();
    let offset = rank - shape.rank();
    let mut strides = vec![0usize; rank];
    for (i, (&dim, &stride)) in shape.dims().iter().zip(&own).enumerate() {
        strides[offset + i] = if dim == 1 { 0 } else { stride };
    }
    strides
}
