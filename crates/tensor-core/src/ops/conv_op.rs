// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2-D convolution and pooling over NHWC activations.
//!
//! Convolution kernels are laid out `[kh, kw, in_channels, out_channels]`.

use serde::{Deserialize, Serialize};

use crate::{Shape, TensorError};

/// Spatial padding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding; windows that would overrun the input are dropped.
    Valid,
    /// Pad so that `out = ceil(in / stride)`.
    Same,
}

impl Padding {
    /// Output extent along one spatial axis.
    pub fn output_size(self, input: usize, window: usize, stride: usize) -> usize {
        let stride = stride.max(1);
        match self {
            Padding::Valid => {
                if input < window {
                    0
                } else {
                    (input - window) / stride + 1
                }
            }
            Padding::Same => input.div_ceil(stride),
        }
    }

    /// Padding inserted before the first element along one axis.
    pub fn pad_before(self, input: usize, window: usize, stride: usize) -> usize {
        match self {
            Padding::Valid => 0,
            Padding::Same => {
                let out = self.output_size(input, window, stride);
                let needed = ((out.saturating_sub(1)) * stride.max(1) + window).saturating_sub(input);
                needed / 2
            }
        }
    }
}

/// Pooling reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    /// Mean over the in-bounds cells of each window.
    Average,
}

fn expect_rank4(op: &'static str, shape: &Shape, other: &Shape) -> Result<[usize; 4], TensorError> {
    match shape.dims() {
        &[a, b, c, d] => Ok([a, b, c, d]),
        _ => Err(TensorError::ShapeMismatch {
            op,
            lhs: shape.clone(),
            rhs: other.clone(),
        }),
    }
}

/// 2-D convolution.
///
/// `input` is `[n, h, w, cin]`, `kernel` is `[kh, kw, cin, cout]` and `bias`
/// (if any) has `cout` elements. Returns the `[n, oh, ow, cout]` output.
pub fn conv2d(
    input: &[f32],
    input_shape: &Shape,
    kernel: &[f32],
    kernel_shape: &Shape,
    bias: Option<&[f32]>,
    strides: [usize; 2],
    padding: Padding,
) -> Result<(Vec<f32>, Shape), TensorError> {
    let [n, h, w, cin] = expect_rank4("conv2d", input_shape, kernel_shape)?;
    let [kh, kw, kcin, cout] = expect_rank4("conv2d", kernel_shape, input_shape)?;
    if kcin != cin || input.len() != input_shape.num_elements() {
        return Err(TensorError::ShapeMismatch {
            op: "conv2d",
            lhs: input_shape.clone(),
            rhs: kernel_shape.clone(),
        });
    }
    if let Some(b) = bias {
        if b.len() != cout {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d (bias)",
                lhs: Shape::vector(cout),
                rhs: Shape::vector(b.len()),
            });
        }
    }

    let [sh, sw] = [strides[0].max(1), strides[1].max(1)];
    let oh = padding.output_size(h, kh, sh);
    let ow = padding.output_size(w, kw, sw);
    let pt = padding.pad_before(h, kh, sh) as isize;
    let pl = padding.pad_before(w, kw, sw) as isize;

    let mut out = vec![0.0f32; n * oh * ow * cout];
    for b in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                let dst = &mut out[((b * oh + oy) * ow + ox) * cout..][..cout];
                if let Some(bias) = bias {
                    dst.copy_from_slice(bias);
                }
                for ky in 0..kh {
                    let iy = (oy * sh + ky) as isize - pt;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..kw {
                        let ix = (ox * sw + kx) as isize - pl;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        let src = &input[((b * h + iy as usize) * w + ix as usize) * cin..][..cin];
                        for (ci, &x) in src.iter().enumerate() {
                            let k_row = &kernel[((ky * kw + kx) * cin + ci) * cout..][..cout];
                            for (d, &k) in dst.iter_mut().zip(k_row) {
                                *d += x * k;
                            }
                        }
                    }
                }
            }
        }
    }
    Ok((out, Shape::new(vec![n, oh, ow, cout])))
}

/// 2-D max or average pooling over `[n, h, w, c]` input.
pub fn pool2d(
    kind: PoolKind,
    input: &[f32],
    input_shape: &Shape,
    pool: [usize; 2],
    strides: [usize; 2],
    padding: Padding,
) -> Result<(Vec<f32>, Shape), TensorError> {
    let [n, h, w, c] = expect_rank4("pool2d", input_shape, input_shape)?;
    if input.len() != input_shape.num_elements() {
        return Err(TensorError::ShapeMismatch {
            op: "pool2d",
            lhs: input_shape.clone(),
            rhs: Shape::vector(input.len()),
        });
    }
    let [ph, pw] = pool;
    let [sh, sw] = [strides[0].max(1), strides[1].max(1)];
    let oh = padding.output_size(h, ph, sh);
    let ow = padding.output_size(w, pw, sw);
    let pt = padding.pad_before(h, ph, sh) as isize;
    let pl = padding.pad_before(w, pw, sw) as isize;

    let mut out = vec![0.0f32; n * oh * ow * c];
    for b in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                for ch in 0..c {
                    let mut acc = match kind {
                        PoolKind::Max => f32::NEG_INFINITY,
                        PoolKind::Average => 0.0,
                    };
                    let mut count = 0usize;
                    for ky in 0..ph {
                        let iy = (oy * sh + ky) as isize - pt;
                        if iy < 0 || iy >= h as isize {
                            continue;
                        }
                        for kx in 0..pw {
                            let ix = (ox * sw + kx) as isize - pl;
                            if ix < 0 || ix >= w as isize {
                                continue;
                            }
                            let v = input[((b * h + iy as usize) * w + ix as usize) * c + ch];
                            acc = match kind {
                                PoolKind::Max => acc.max(v),
                                PoolKind::Average => acc + v,
                            };
                            count += 1;
                        }
                    }
                    out[((b * oh + oy) * ow + ox) * c + ch] = match kind {
                        PoolKind::Max if count == 0 => 0.0,
                        PoolKind::Max => acc,
                        PoolKind::Average if count == 0 => 0.0,
                        PoolKind::Average => acc / count as f32,
                    };
                }
            }
        }
    }
    Ok((out, Shape::new(vec![n, oh, ow, c])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size() {
        assert_eq!(Padding::Valid.output_size(5, 3, 1), 3);
        assert_eq!(Padding::Valid.output_size(5, 3, 2), 2);
        assert_eq!(Padding::Same.output_size(5, 3, 2), 3);
        assert_eq!(Padding::Same.output_size(4, 2, 2), 2);
        assert_eq!(Padding::Valid.output_size(2, 3, 1), 0);
    }

    #[test]
    fn test_same_padding_split() {
        // in=5, k=3, s=1: total pad 2, one on each side.
        assert_eq!(Padding::Same.pad_before(5, 3, 1), 1);
        // in=4, k=2, s=2: no padding needed.
        assert_eq!(Padding::Same.pad_before(4, 2, 2), 0);
    }

    #[test]
    fn test_conv2d_identity_kernel() {
        // 1x1 kernel copying a single channel.
        let input: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let (out, shape) = conv2d(
            &input,
            &Shape::new(vec![1, 3, 3, 1]),
            &[1.0],
            &Shape::new(vec![1, 1, 1, 1]),
            Some(&[0.5]),
            [1, 1],
            Padding::Valid,
        )
        .unwrap();
        assert_eq!(shape, Shape::new(vec![1, 3, 3, 1]));
        assert_eq!(out[4], 4.5);
    }

    #[test]
    fn test_conv2d_same_padding_sum() {
        // 3x3 ones kernel with same padding sums each neighbourhood.
        let input = vec![1.0f32; 9];
        let (out, shape) = conv2d(
            &input,
            &Shape::new(vec![1, 3, 3, 1]),
            &[1.0; 9],
            &Shape::new(vec![3, 3, 1, 1]),
            None,
            [1, 1],
            Padding::Same,
        )
        .unwrap();
        assert_eq!(shape, Shape::new(vec![1, 3, 3, 1]));
        assert_eq!(out, vec![4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    }

    #[test]
    fn test_conv2d_channel_mismatch() {
        let result = conv2d(
            &[0.0; 8],
            &Shape::new(vec![1, 2, 2, 2]),
            &[0.0; 3],
            &Shape::new(vec![1, 1, 3, 1]),
            None,
            [1, 1],
            Padding::Valid,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_max_pool() {
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let (out, shape) = pool2d(
            PoolKind::Max,
            &input,
            &Shape::new(vec![1, 2, 2, 1]),
            [2, 2],
            [2, 2],
            Padding::Valid,
        )
        .unwrap();
        assert_eq!(shape, Shape::new(vec![1, 1, 1, 1]));
        assert_eq!(out, vec![4.0]);
    }

    #[test]
    fn test_average_pool_excludes_padding() {
        // 3x3 input, 2x2 window, stride 2, same padding: the bottom-right
        // window covers a single in-bounds cell.
        let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let (out, shape) = pool2d(
            PoolKind::Average,
            &input,
            &Shape::new(vec![1, 3, 3, 1]),
            [2, 2],
            [2, 2],
            Padding::Same,
        )
        .unwrap();
        assert_eq!(shape, Shape::new(vec![1, 2, 2, 1]));
        assert_eq!(out, vec![3.0, 4.5, 7.5, 9.0]);
    }
}
