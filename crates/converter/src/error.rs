// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the conversion engine.

use flat_model::FormatError;

use crate::OptimizationKind;

/// Errors raised while converting a source model.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// A source layer has no destination lowering.
    #[error("layer '{layer}': operation '{op}' is not supported by the destination format")]
    UnsupportedOperation { layer: String, op: String },

    /// An optimization pass could not process a tensor under the strict policy.
    #[error("{kind} optimization failed on tensor '{tensor}': {reason}")]
    Optimization {
        tensor: String,
        kind: OptimizationKind,
        reason: String,
    },

    /// The destination signature differs from the source signature.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// A source weight is missing from, or reshaped in, the destination model.
    #[error("weight mismatch: {0}")]
    WeightMismatch(String),

    /// The destination model could not be encoded.
    #[error("encoding failed: {0}")]
    Format(#[from] FormatError),

    /// An engine invariant was violated while building the destination graph.
    #[error("internal conversion error: {0}")]
    Internal(String),

    /// The conversion configuration is invalid or unreadable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConvertError {
    /// Returns `true` for errors caused by a bug in the engine rather than
    /// by the input model or configuration.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::SignatureMismatch(_) | Self::WeightMismatch(_) | Self::Format(_) | Self::Internal(_)
        )
    }
}
