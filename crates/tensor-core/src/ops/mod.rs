// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference f32 kernels.
//!
//! These kernels favour clarity over speed: they exist so that a source
//! graph and its converted counterpart can be evaluated with the same
//! arithmetic and compared. Every kernel takes decoded `f32` slices plus
//! their shapes and returns a freshly allocated output.

mod conv_op;
mod elementwise_op;
mod gelu_op;
mod matmul_op;
mod softmax_op;

pub use conv_op::{conv2d, pool2d, Padding, PoolKind};
pub use elementwise_op::{binary, unary, BinaryOp, UnaryOp};
pub use gelu_op::gelu;
pub use matmul_op::{linear, matmul};
pub use softmax_op::softmax;
