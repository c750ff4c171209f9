// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for reference evaluation and parity checks.

use tensor_core::{Shape, TensorError};

/// Errors raised while evaluating or comparing models.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A signature input was not supplied.
    #[error("missing value for input '{0}'")]
    MissingInput(String),

    /// A supplied input has the wrong shape.
    #[error("input '{name}' has shape {actual}, expected {expected}")]
    InputShape {
        name: String,
        expected: Shape,
        actual: Shape,
    },

    /// A layer or operator reads a tensor that has not been computed.
    #[error("tensor '{0}' read before it was computed")]
    Unbound(String),

    /// The reference evaluator has no semantics for this layer.
    #[error("layer '{layer}' of type '{layer_type}' cannot be evaluated")]
    Unsupported { layer: String, layer_type: String },

    /// The two models disagree on their signatures.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// A reference kernel failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
