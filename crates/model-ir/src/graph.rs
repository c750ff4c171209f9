// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Source model: layers, materialized weights and the I/O signature.
//!
//! # Type-State Pattern
//!
//! The model transitions through states enforced at compile time:
//!
//! ```text
//! SourceModel<Unchecked>  (assembled, not yet checked)
//!       │  .validate()
//!       ▼
//! SourceModel<Validated>  (edges, weights and signature verified)
//! ```
//!
//! The converter only accepts `SourceModel<Validated>`. The marker types are
//! zero-sized, and a validated model exposes no mutators.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;

use tensor_core::{DType, Shape, Tensor};

use crate::{LayerDef, ModelError};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: model has been assembled but not validated.
#[derive(Debug, Clone)]
pub struct Unchecked;

/// Marker: model has been validated and may be converted.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for model states.
pub trait ModelState: fmt::Debug + Clone {}
impl ModelState for Unchecked {}
impl ModelState for Validated {}

// ── Signature ──────────────────────────────────────────────────────

/// Name, shape and element type of a model input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.dtype, self.shape)
    }
}

/// Ordered model inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Signature {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

// ── SourceModel ────────────────────────────────────────────────────

/// A fully materialized source model.
#[derive(Debug, Clone)]
pub struct SourceModel<S: ModelState = Unchecked> {
    name: String,
    layers: Vec<LayerDef>,
    weights: BTreeMap<String, Tensor>,
    signature: Signature,
    _state: PhantomData<S>,
}

// ── Unchecked state ────────────────────────────────────────────────

impl SourceModel<Unchecked> {
    /// Creates a new model in the `Unchecked` state.
    pub fn new(
        name: String,
        layers: Vec<LayerDef>,
        weights: BTreeMap<String, Tensor>,
        signature: Signature,
    ) -> Self {
        Self {
            name,
            layers,
            weights,
            signature,
            _state: PhantomData,
        }
    }

    /// Validates the model and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The model has at least one layer, input and output.
    /// - Layer indices are consecutive starting from 0.
    /// - Tensor names (inputs, layers and weights) are unique.
    /// - Every input edge references a model input or an earlier layer.
    /// - Every referenced weight exists, is a float dtype and every stored
    ///   weight is referenced by some layer.
    /// - Every output is produced by a layer and its signature shape matches
    ///   that layer's inferred shape.
    pub fn validate(self) -> Result<SourceModel<Validated>, ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::InvalidGraph("model contains no layers".into()));
        }
        if self.signature.inputs.is_empty() || self.signature.outputs.is_empty() {
            return Err(ModelError::InvalidSignature(
                "model must declare at least one input and one output".into(),
            ));
        }

        let mut produced: HashMap<&str, &Shape> = HashMap::new();
        for input in &self.signature.inputs {
            if input.dtype != DType::F32 {
                return Err(ModelError::InvalidSignature(format!(
                    "input '{}' must be f32, found {}",
                    input.name, input.dtype
                )));
            }
            if produced.insert(&input.name, &input.shape).is_some() {
                return Err(ModelError::DuplicateName(input.name.clone()));
            }
        }

        let mut referenced = BTreeSet::new();
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.index != i {
                return Err(ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    detail: format!("expected index {i}, got {}", layer.index),
                });
            }
            if layer.inputs.is_empty() {
                return Err(ModelError::layer(&layer.name, "layer has no inputs"));
            }
            for tensor in &layer.inputs {
                if !produced.contains_key(tensor.as_str()) {
                    return Err(ModelError::UnknownTensor {
                        layer: layer.name.clone(),
                        tensor: tensor.clone(),
                    });
                }
            }
            for name in layer.weight_names() {
                let weight = self.weights.get(name).ok_or_else(|| ModelError::WeightNotFound {
                    layer: layer.name.clone(),
                    name: name.to_string(),
                })?;
                if !weight.dtype().is_float() {
                    return Err(ModelError::UnsupportedDType {
                        name: name.to_string(),
                        dtype: weight.dtype().to_string(),
                    });
                }
                referenced.insert(name);
            }
            if layer.output_shape.rank() == 0 || layer.output_shape.num_elements() == 0 {
                return Err(ModelError::layer(&layer.name, "output shape has zero elements"));
            }
            if produced.insert(&layer.name, &layer.output_shape).is_some() {
                return Err(ModelError::DuplicateName(layer.name.clone()));
            }
        }

        if let Some(name) = self.weights.keys().find(|k| produced.contains_key(k.as_str())) {
            return Err(ModelError::DuplicateName(name.clone()));
        }

        if let Some(unused) = self.weights.keys().find(|k| !referenced.contains(k.as_str())) {
            return Err(ModelError::InvalidGraph(format!(
                "weight tensor '{unused}' is not referenced by any layer"
            )));
        }

        let layer_names: BTreeSet<&str> = self.layers.iter().map(|l| l.name.as_str()).collect();
        for output in &self.signature.outputs {
            if !layer_names.contains(output.name.as_str()) {
                return Err(ModelError::InvalidSignature(format!(
                    "output '{}' is not produced by any layer",
                    output.name
                )));
            }
            if produced.get(output.name.as_str()) != Some(&&output.shape) {
                return Err(ModelError::InvalidSignature(format!(
                    "output '{}' declares shape {} but the layer produces a different shape",
                    output.name, output.shape
                )));
            }
        }

        Ok(SourceModel {
            name: self.name,
            layers: self.layers,
            weights: self.weights,
            signature: self.signature,
            _state: PhantomData,
        })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl SourceModel<Validated> {
    /// Returns the model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the total number of layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Returns an iterator over the layers in execution order.
    pub fn iter_layers(&self) -> impl Iterator<Item = &LayerDef> {
        self.layers.iter()
    }

    /// Returns a reference to a layer by index.
    pub fn layer(&self, index: usize) -> Option<&LayerDef> {
        self.layers.get(index)
    }

    /// Returns the weight tensors, ordered by name.
    pub fn weights(&self) -> &BTreeMap<String, Tensor> {
        &self.weights
    }

    /// Returns a weight tensor by name.
    pub fn weight(&self, name: &str) -> Option<&Tensor> {
        self.weights.get(name)
    }

    /// Returns the model's input/output signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the total weight memory in bytes.
    pub fn total_weight_bytes(&self) -> usize {
        self.weights.values().map(Tensor::size_bytes).sum()
    }

    /// Returns a summary string describing the model.
    pub fn summary(&self) -> String {
        let total_weight_kb = self.total_weight_bytes() as f64 / 1024.0;
        format!(
            "Model '{}': {} layers, {} weight tensors ({:.1} KB), {} inputs, {} outputs",
            self.name,
            self.num_layers(),
            self.weights.len(),
            total_weight_kb,
            self.signature.inputs.len(),
            self.signature.outputs.len(),
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: ModelState> fmt::Display for SourceModel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SourceModel '{}' ({} layers):", self.name, self.layers.len())?;
        for input in &self.signature.inputs {
            writeln!(f, "  input  {input}")?;
        }
        for layer in &self.layers {
            writeln!(f, "  {}", layer.summary())?;
        }
        for output in &self.signature.outputs {
            writeln!(f, "  output {output}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activation, LayerConfig, LayerType, WeightRole};

    fn spec(name: &str, shape: Shape) -> TensorSpec {
        TensorSpec {
            name: name.into(),
            shape,
            dtype: DType::F32,
        }
    }

    /// Helper: a chain of `n` dense layers of width `hidden`.
    fn make_model(n: usize, hidden: usize) -> SourceModel<Unchecked> {
        let mut layers = Vec::new();
        let mut weights = BTreeMap::new();
        let mut prev = "x".to_string();
        for i in 0..n {
            let kernel = format!("d{i}/kernel");
            weights.insert(
                kernel.clone(),
                Tensor::zeros(Shape::matrix(hidden, hidden), DType::F32),
            );
            layers.push(LayerDef {
                name: format!("d{i}"),
                layer_type: LayerType::Dense,
                config: LayerConfig::Dense {
                    units: hidden,
                    activation: Activation::Linear,
                    use_bias: false,
                },
                index: i,
                inputs: vec![prev.clone()],
                weights: BTreeMap::from([(WeightRole::Kernel, kernel)]),
                output_shape: Shape::matrix(1, hidden),
            });
            prev = format!("d{i}");
        }
        let signature = Signature {
            inputs: vec![spec("x", Shape::matrix(1, hidden))],
            outputs: vec![spec(&prev, Shape::matrix(1, hidden))],
        };
        SourceModel::new("test".into(), layers, weights, signature)
    }

    #[test]
    fn test_validate_ok() {
        let model = make_model(3, 8).validate().unwrap();
        assert_eq!(model.num_layers(), 3);
        assert_eq!(model.weights().len(), 3);
        assert_eq!(model.total_weight_bytes(), 3 * 8 * 8 * 4);
    }

    #[test]
    fn test_validate_bad_index() {
        let mut model = make_model(3, 8);
        model.layers[1].index = 5;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_edge() {
        let mut model = make_model(2, 8);
        model.layers[1].inputs = vec!["nowhere".into()];
        assert!(matches!(
            model.validate(),
            Err(ModelError::UnknownTensor { .. })
        ));
    }

    #[test]
    fn test_validate_forward_edge_rejected() {
        let mut model = make_model(2, 8);
        model.layers[0].inputs = vec!["d1".into()];
        assert!(matches!(
            model.validate(),
            Err(ModelError::UnknownTensor { .. })
        ));
    }

    #[test]
    fn test_validate_missing_weight() {
        let mut model = make_model(2, 8);
        model.weights.remove("d0/kernel");
        assert!(matches!(
            model.validate(),
            Err(ModelError::WeightNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_unreferenced_weight() {
        let mut model = make_model(1, 8);
        model
            .weights
            .insert("orphan".into(), Tensor::zeros(Shape::vector(2), DType::F32));
        assert!(matches!(model.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_validate_unknown_output() {
        let mut model = make_model(1, 8);
        model.signature.outputs[0].name = "x".into();
        assert!(matches!(
            model.validate(),
            Err(ModelError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_validate_duplicate_name() {
        let mut model = make_model(2, 8);
        model.layers[1].name = "d0".into();
        assert!(matches!(model.validate(), Err(ModelError::DuplicateName(_))));
    }

    #[test]
    fn test_validate_weight_named_like_layer() {
        let mut model = make_model(2, 8);
        if let Some(kernel) = model.weights.remove("d0/kernel") {
            model.weights.insert("d1".into(), kernel);
        }
        model.layers[0].weights.insert(WeightRole::Kernel, "d1".into());
        match model.validate() {
            Err(ModelError::DuplicateName(name)) => assert_eq!(name, "d1"),
            other => panic!("expected DuplicateName, got {other:?}"),
        }
    }

    #[test]
    fn test_summary_and_display() {
        let model = make_model(2, 4).validate().unwrap();
        let s = model.summary();
        assert!(s.contains("'test'"));
        assert!(s.contains("2 layers"));
        let display = format!("{model}");
        assert!(display.contains("d0"));
        assert!(display.contains("output d1"));
    }

    #[test]
    fn test_layer_access() {
        let model = make_model(3, 4).validate().unwrap();
        assert_eq!(model.layer(0).unwrap().name, "d0");
        assert!(model.layer(3).is_none());
        let names: Vec<_> = model.iter_layers().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["d0", "d1", "d2"]);
    }
}
