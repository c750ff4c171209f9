// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON architecture manifest parsing.
//!
//! The manifest describes the model's inputs, its layers in execution
//! order, the tensors each layer consumes and the weight tensors it owns.
//! It is stored either as `model.json` next to the weights or embedded in
//! the SafeTensors `__metadata__` under the `architecture` key.
//!
//! # Format
//! ```json
//! {
//!   "name": "mri_classifier",
//!   "format_version": 1,
//!   "inputs": [{ "name": "image", "shape": [1, 4], "dtype": "f32" }],
//!   "outputs": ["dense"],
//!   "layers": [
//!     {
//!       "name": "dense",
//!       "type": "dense",
//!       "inputs": ["image"],
//!       "config": { "units": 2, "activation": "linear" },
//!       "weights": { "kernel": "dense/kernel", "bias": "dense/bias" }
//!     }
//!   ]
//! }
//! ```
//!
//! A layer's output tensor is named after the layer. When `inputs` is
//! omitted the layer consumes the previous layer's output (or the first
//! model input for the first layer).

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::ModelError;

/// The only manifest revision this loader understands.
pub const FORMAT_VERSION: u64 = 1;

/// Top-level architecture manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name.
    pub name: String,
    /// Manifest revision; must equal [`FORMAT_VERSION`].
    pub format_version: u64,
    /// Model inputs, in signature order.
    pub inputs: Vec<InputSpec>,
    /// Names of the tensors exposed as model outputs, in signature order.
    pub outputs: Vec<String>,
    /// Layers in execution order.
    pub layers: Vec<ManifestLayer>,
}

/// A declared model input.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

fn default_dtype() -> String {
    "f32".to_string()
}

/// A single layer entry in the manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestLayer {
    /// Layer name; also the name of the tensor it produces.
    pub name: String,
    /// Layer type string (e.g. `"dense"`, `"conv2d"`).
    #[serde(rename = "type")]
    pub layer_type: String,
    /// Names of the tensors this layer consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Type-specific configuration.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
    /// Weight role (`"kernel"`, `"bias"`, ...) to tensor name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weights: BTreeMap<String, String>,
}

impl ModelManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    ///
    /// The format revision is checked before the rest of the document, so a
    /// manifest from a newer revision reports
    /// [`ModelError::UnsupportedVersion`] rather than a schema error.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(found) = value.get("format_version").and_then(|v| v.as_u64()) {
            if found != FORMAT_VERSION {
                return Err(ModelError::UnsupportedVersion {
                    found,
                    expected: FORMAT_VERSION,
                });
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes the manifest to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - At least one input, one output and one layer are declared.
    /// - Input dtypes are `f32` and input shapes are non-empty.
    /// - Layer type strings are recognised.
    /// - No two layers or inputs share a name.
    /// - No layer or input shares a name with a weight tensor.
    /// - No output is listed twice.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::InvalidGraph("manifest contains no layers".into()));
        }
        if self.inputs.is_empty() {
            return Err(ModelError::InvalidSignature("no inputs declared".into()));
        }
        if self.outputs.is_empty() {
            return Err(ModelError::InvalidSignature("no outputs declared".into()));
        }

        let mut seen_names = HashSet::new();
        for input in &self.inputs {
            if !seen_names.insert(input.name.as_str()) {
                return Err(ModelError::DuplicateName(input.name.clone()));
            }
            match tensor_core::DType::parse(&input.dtype) {
                Some(tensor_core::DType::F32) => {}
                _ => {
                    return Err(ModelError::InvalidSignature(format!(
                        "input '{}' has dtype '{}', only f32 inputs are supported",
                        input.name, input.dtype
                    )))
                }
            }
            if input.shape.is_empty() || input.shape.contains(&0) {
                return Err(ModelError::InvalidSignature(format!(
                    "input '{}' has invalid shape {:?}",
                    input.name, input.shape
                )));
            }
        }

        for layer in &self.layers {
            if !seen_names.insert(layer.name.as_str()) {
                return Err(ModelError::DuplicateName(layer.name.clone()));
            }
            if crate::LayerType::from_str_loose(&layer.layer_type).is_none() {
                return Err(ModelError::UnknownLayerType {
                    layer: layer.name.clone(),
                    type_name: layer.layer_type.clone(),
                });
            }
        }

        if let Some(name) = self.weight_names().into_iter().find(|w| seen_names.contains(w)) {
            return Err(ModelError::DuplicateName(name.to_string()));
        }

        let mut seen_outputs = HashSet::new();
        for output in &self.outputs {
            if !seen_outputs.insert(output.as_str()) {
                return Err(ModelError::InvalidSignature(format!(
                    "output '{output}' is listed twice"
                )));
            }
        }

        Ok(())
    }

    /// Returns the distinct weight tensor names referenced by all layers.
    pub fn weight_names(&self) -> Vec<&str> {
        let mut unique: Vec<&str> = self
            .layers
            .iter()
            .flat_map(|l| l.weights.values().map(String::as_str))
            .collect();
        unique.sort_unstable();
        unique.dedup();
        unique
    }
}
