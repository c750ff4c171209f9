// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading and IR construction.

use std::path::PathBuf;

use tensor_core::{Shape, TensorError};

/// Errors that can occur while loading a source model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model path does not exist.
    #[error("model not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The model path exists but could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The SafeTensors container is malformed.
    #[error("malformed SafeTensors container: {0}")]
    Container(String),

    /// A single-file artifact carries no architecture metadata.
    #[error("SafeTensors metadata has no '{key}' entry")]
    MissingArchitecture { key: &'static str },

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// The manifest was written for a different format revision.
    #[error("unsupported manifest format_version {found} (expected {expected})")]
    UnsupportedVersion { found: u64, expected: u64 },

    /// A layer type string is not recognised.
    #[error("layer '{layer}' has unknown type '{type_name}'")]
    UnknownLayerType { layer: String, type_name: String },

    /// A layer definition is invalid (bad configuration, arity, or shapes).
    #[error("invalid layer '{layer}': {detail}")]
    InvalidLayer { layer: String, detail: String },

    /// A weight tensor referenced in the manifest is absent from the weights.
    #[error("layer '{layer}' references missing weight tensor '{name}'")]
    WeightNotFound { layer: String, name: String },

    /// A weight tensor's shape disagrees with the layer configuration.
    #[error("weight '{name}' has shape {actual}, expected {expected}")]
    WeightShapeMismatch {
        name: String,
        expected: Shape,
        actual: Shape,
    },

    /// A weight is stored in a dtype the loader does not accept.
    #[error("weight '{name}' has unsupported dtype {dtype}")]
    UnsupportedDType { name: String, dtype: String },

    /// A layer input edge names a tensor that is not produced earlier.
    #[error("layer '{layer}' consumes unknown tensor '{tensor}'")]
    UnknownTensor { layer: String, tensor: String },

    /// Two layers, or a layer and a model input, share a name.
    #[error("duplicate tensor name '{0}'")]
    DuplicateName(String),

    /// The model's input/output signature is malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The model graph is otherwise malformed.
    #[error("invalid model graph: {0}")]
    InvalidGraph(String),

    /// Tensor construction failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl ModelError {
    pub(crate) fn layer(layer: &str, detail: impl Into<String>) -> Self {
        Self::InvalidLayer {
            layer: layer.to_string(),
            detail: detail.into(),
        }
    }
}
