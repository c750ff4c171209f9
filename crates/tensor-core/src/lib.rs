// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor containers and numeric building blocks shared by the conversion
//! pipeline.
//!
//! This crate provides:
//! - [`Tensor`]: an owned, dtype-tagged byte buffer with a [`Shape`].
//! - [`DType`]: the element types weights may be stored in (f32, f16, bf16, i8).
//! - [`QuantParams`] and the int8 / f16 re-encoding helpers used by the
//!   optimization passes.
//! - Reference kernels (linear, conv2d, pooling, softmax, GELU, element-wise
//!   ops) used to evaluate source and converted graphs during parity checks.
//!
//! All byte encodings are little-endian so buffers can be written to disk
//! unchanged.

mod dtype;
mod error;
mod ops;
mod quant;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use ops::{
    binary, conv2d, gelu, linear, matmul, pool2d, softmax, unary, BinaryOp, Padding, PoolKind,
    UnaryOp,
};
pub use quant::{dequantize_i8, encode_f16, quantize_i8, QuantParams};
pub use shape::Shape;
pub use tensor::Tensor;
