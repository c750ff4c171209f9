// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lowering of source layers to EdgeFlat operators.
//!
//! | source layer | destination operators |
//! |---|---|
//! | dense | `FULLY_CONNECTED` (+ activation operator) |
//! | conv2d | `CONV_2D` (+ activation operator) |
//! | max/average pooling | `MAX_POOL_2D` / `AVERAGE_POOL_2D` |
//! | flatten, reshape | `RESHAPE` |
//! | dropout, linear activation | removed (a `RESHAPE` keeps the name of a model output) |
//! | activation, softmax | `RELU`, `RELU6`, `LOGISTIC`, `TANH`, `GELU`, `SOFTMAX` |
//! | batch normalization | `ADD` → `RSQRT` → `SUB` → `MUL` → `MUL` → `ADD` |
//! | add | `ADD` chain |
//!
//! The tensor table lists model inputs first, then every source weight in
//! name order, then intermediate tensors in creation order. Weight bytes,
//! names and shapes are copied unchanged. Layer outputs keep the layer name;
//! generated tensors never take a name that a layer will need.

use std::collections::{BTreeMap, BTreeSet};

use flat_model::{FlatModel, FlatTensor, FusedActivation, Op, Operator};
use model_ir::{Activation, LayerConfig, LayerDef, LayerType, SourceModel, Validated, WeightRole};
use tensor_core::{DType, Shape, Tensor};
use tracing::debug;

use crate::ConvertError;

/// Lowers a validated source model to an unoptimized EdgeFlat graph.
pub(crate) fn lower(source: &SourceModel<Validated>) -> Result<FlatModel, ConvertError> {
    let mut builder = GraphBuilder {
        reserved: source.iter_layers().map(|l| l.name.clone()).collect(),
        ..GraphBuilder::default()
    };

    let mut inputs = Vec::with_capacity(source.signature().inputs.len());
    for spec in &source.signature().inputs {
        let idx = builder.add_tensor(FlatTensor::activation(&spec.name, spec.shape.clone()));
        builder.bound.insert(spec.name.clone(), idx);
        inputs.push(idx);
    }
    for (name, tensor) in source.weights() {
        let idx = builder.add_tensor(constant(name, tensor));
        builder.weights.insert(name.clone(), idx);
    }

    let outputs: Vec<&str> = source
        .signature()
        .outputs
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    for layer in source.iter_layers() {
        let before = builder.operators.len();
        builder.lower_layer(layer, outputs.contains(&layer.name.as_str()))?;
        debug!(
            "lowered layer '{}' ({}) to {} operators",
            layer.name,
            layer.layer_type,
            builder.operators.len() - before
        );
    }

    let outputs = outputs
        .iter()
        .map(|name| builder.lookup("<outputs>", name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FlatModel {
        name: source.name().to_string(),
        producer: flat_model::PRODUCER.to_string(),
        tensors: builder.tensors,
        operators: builder.operators,
        inputs,
        outputs,
    })
}

/// Standalone operator implementing `activation`, if it is not the identity.
pub(crate) fn activation_op(activation: Activation) -> Option<Op> {
    match activation {
        Activation::Linear => None,
        Activation::Relu => Some(Op::Relu),
        Activation::Relu6 => Some(Op::Relu6),
        Activation::Sigmoid => Some(Op::Logistic),
        Activation::Tanh => Some(Op::Tanh),
        Activation::Gelu => Some(Op::Gelu),
        Activation::Softmax => Some(Op::Softmax { beta: 1.0 }),
    }
}

fn constant(name: &str, tensor: &Tensor) -> FlatTensor {
    FlatTensor {
        name: name.to_string(),
        shape: tensor.shape().clone(),
        dtype: tensor.dtype(),
        data: Some(tensor.as_bytes().to_vec()),
        quantization: None,
    }
}

#[derive(Default)]
struct GraphBuilder {
    tensors: Vec<FlatTensor>,
    operators: Vec<Operator>,
    /// Every flat tensor name, for uniqueness.
    names: BTreeMap<String, usize>,
    /// Source activation name → flat tensor index.
    bound: BTreeMap<String, usize>,
    /// Source weight name → flat tensor index.
    weights: BTreeMap<String, usize>,
    /// Layer names, kept free for the layer's own output tensor.
    reserved: BTreeSet<String>,
}

impl GraphBuilder {
    fn add_tensor(&mut self, tensor: FlatTensor) -> usize {
        let idx = self.tensors.len();
        self.names.insert(tensor.name.clone(), idx);
        self.tensors.push(tensor);
        idx
    }

    fn is_taken(&self, name: &str) -> bool {
        self.names.contains_key(name) || self.reserved.contains(name)
    }

    /// `base` if neither used nor reserved, otherwise `base_1`, `base_2`, ...
    fn fresh_name(&self, base: &str) -> String {
        if !self.is_taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{base}_{i}"))
            .find(|candidate| !self.is_taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn intermediate(&mut self, base: &str, shape: Shape) -> usize {
        let name = self.fresh_name(base);
        self.add_tensor(FlatTensor::activation(name, shape))
    }

    /// Creates the tensor that carries the layer's result, under the layer's
    /// own name, and binds it.
    fn layer_output(&mut self, layer: &LayerDef) -> usize {
        let name = if self.names.contains_key(&layer.name) {
            self.fresh_name(&layer.name)
        } else {
            layer.name.clone()
        };
        let idx = self.add_tensor(FlatTensor::activation(name, layer.output_shape.clone()));
        self.bound.insert(layer.name.clone(), idx);
        idx
    }

    fn push(&mut self, op: Op, inputs: Vec<usize>, outputs: Vec<usize>) {
        self.operators.push(Operator {
            op,
            inputs,
            outputs,
        });
    }

    fn lookup(&self, layer: &str, name: &str) -> Result<usize, ConvertError> {
        self.bound.get(name).copied().ok_or_else(|| {
            ConvertError::Internal(format!("layer '{layer}' reads unbound tensor '{name}'"))
        })
    }

    fn weight(&self, layer: &LayerDef, role: WeightRole) -> Result<Option<usize>, ConvertError> {
        let Some(name) = layer.weight(role) else {
            return Ok(None);
        };
        self.weights.get(name).copied().map(Some).ok_or_else(|| {
            ConvertError::Internal(format!(
                "layer '{}' references unknown weight '{name}'",
                layer.name
            ))
        })
    }

    fn required_weight(&self, layer: &LayerDef, role: WeightRole) -> Result<usize, ConvertError> {
        self.weight(layer, role)?.ok_or_else(|| {
            ConvertError::Internal(format!(
                "layer '{}' has no {} weight",
                layer.name,
                role.as_str()
            ))
        })
    }

    fn lower_layer(&mut self, layer: &LayerDef, is_output: bool) -> Result<(), ConvertError> {
        let inputs = layer
            .inputs
            .iter()
            .map(|name| self.lookup(&layer.name, name))
            .collect::<Result<Vec<_>, _>>()?;
        let first = *inputs.first().ok_or_else(|| {
            ConvertError::Internal(format!("layer '{}' has no inputs", layer.name))
        })?;

        match &layer.config {
            LayerConfig::Dense { activation, .. } => {
                let operands = self.with_kernel(layer, first)?;
                let op = Op::FullyConnected {
                    fused_activation: FusedActivation::None,
                };
                self.with_activation(layer, op, operands, *activation);
            }
            LayerConfig::Conv2D {
                strides,
                padding,
                activation,
                ..
            } => {
                let operands = self.with_kernel(layer, first)?;
                let op = Op::Conv2D {
                    strides: *strides,
                    padding: *padding,
                    fused_activation: FusedActivation::None,
                };
                self.with_activation(layer, op, operands, *activation);
            }
            LayerConfig::Pool2D {
                pool_size,
                strides,
                padding,
            } => {
                let op = if layer.layer_type == LayerType::MaxPooling2D {
                    Op::MaxPool2D {
                        pool: *pool_size,
                        strides: *strides,
                        padding: *padding,
                    }
                } else {
                    Op::AveragePool2D {
                        pool: *pool_size,
                        strides: *strides,
                        padding: *padding,
                    }
                };
                self.single(layer, op, vec![first]);
            }
            LayerConfig::Flatten | LayerConfig::Reshape { .. } => {
                let op = Op::Reshape {
                    new_shape: layer.output_shape.dims().to_vec(),
                };
                self.single(layer, op, vec![first]);
            }
            LayerConfig::Dropout { .. } => self.identity(layer, first, is_output),
            LayerConfig::Activation { activation } => match activation_op(*activation) {
                Some(op) => self.single(layer, op, vec![first]),
                None => self.identity(layer, first, is_output),
            },
            LayerConfig::Softmax => self.single(layer, Op::Softmax { beta: 1.0 }, vec![first]),
            LayerConfig::BatchNorm { epsilon, .. } => self.batch_norm(layer, first, *epsilon)?,
            LayerConfig::Add => {
                let mut acc = first;
                for (k, &rhs) in inputs.iter().enumerate().skip(1) {
                    let out = if k + 1 == inputs.len() {
                        self.layer_output(layer)
                    } else {
                        let base = format!("{}/partial_sum_{k}", layer.name);
                        self.intermediate(&base, layer.output_shape.clone())
                    };
                    self.push(Op::Add, vec![acc, rhs], vec![out]);
                    acc = out;
                }
            }
            LayerConfig::Opaque { .. } => {
                return Err(ConvertError::UnsupportedOperation {
                    layer: layer.name.clone(),
                    op: layer.layer_type.as_str().to_string(),
                });
            }
        }
        Ok(())
    }

    /// `[x, kernel, bias?]` operand list for dense and conv layers.
    fn with_kernel(&self, layer: &LayerDef, x: usize) -> Result<Vec<usize>, ConvertError> {
        let mut operands = vec![x, self.required_weight(layer, WeightRole::Kernel)?];
        operands.extend(self.weight(layer, WeightRole::Bias)?);
        Ok(operands)
    }

    fn single(&mut self, layer: &LayerDef, op: Op, inputs: Vec<usize>) {
        let out = self.layer_output(layer);
        self.push(op, inputs, vec![out]);
    }

    fn with_activation(&mut self, layer: &LayerDef, op: Op, inputs: Vec<usize>, activation: Activation) {
        match activation_op(activation) {
            None => self.single(layer, op, inputs),
            Some(act) => {
                let base = format!("{}/pre_activation", layer.name);
                let pre = self.intermediate(&base, layer.output_shape.clone());
                self.push(op, inputs, vec![pre]);
                self.single(layer, act, vec![pre]);
            }
        }
    }

    fn identity(&mut self, layer: &LayerDef, input: usize, is_output: bool) {
        if is_output {
            let op = Op::Reshape {
                new_shape: layer.output_shape.dims().to_vec(),
            };
            self.single(layer, op, vec![input]);
        } else {
            self.bound.insert(layer.name.clone(), input);
        }
    }

    /// `y = (x - mean) * rsqrt(var + eps) * gamma + beta`, with the optional
    /// `gamma`/`beta` steps omitted when the layer has no such weight.
    fn batch_norm(&mut self, layer: &LayerDef, x: usize, epsilon: f32) -> Result<(), ConvertError> {
        let mean = self.required_weight(layer, WeightRole::MovingMean)?;
        let var = self.required_weight(layer, WeightRole::MovingVariance)?;
        let gamma = self.weight(layer, WeightRole::Gamma)?;
        let beta = self.weight(layer, WeightRole::Beta)?;
        let param_shape = self.tensors[var].shape.clone();
        let shape = layer.output_shape.clone();

        let eps_name = self.fresh_name(&format!("{}/epsilon", layer.name));
        let eps = self.add_tensor(FlatTensor {
            name: eps_name,
            shape: Shape::scalar(),
            dtype: DType::F32,
            data: Some(epsilon.to_le_bytes().to_vec()),
            quantization: None,
        });

        let var_eps = self.intermediate(&format!("{}/variance_eps", layer.name), param_shape.clone());
        self.push(Op::Add, vec![var, eps], vec![var_eps]);
        let inv_std = self.intermediate(&format!("{}/inv_std", layer.name), param_shape);
        self.push(Op::Rsqrt, vec![var_eps], vec![inv_std]);
        let centered = self.intermediate(&format!("{}/centered", layer.name), shape.clone());
        self.push(Op::Sub, vec![x, mean], vec![centered]);

        let mut steps = vec![(Op::Mul, inv_std, "normalized")];
        steps.extend(gamma.map(|g| (Op::Mul, g, "scaled")));
        steps.extend(beta.map(|b| (Op::Add, b, "shifted")));

        let last = steps.len() - 1;
        let mut acc = centered;
        for (k, (op, operand, label)) in steps.into_iter().enumerate() {
            let out = if k == last {
                self.layer_output(layer)
            } else {
                self.intermediate(&format!("{}/{label}", layer.name), shape.clone())
            };
            self.push(op, vec![acc, operand], vec![out]);
            acc = out;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{ModelLoader, ModelManifest};

    fn weight(shape: Shape) -> Tensor {
        let values: Vec<f32> = (0..shape.num_elements())
            .map(|i| (i as f32 * 0.37).sin())
            .collect();
        Tensor::from_f32(shape, &values).unwrap()
    }

    fn load(json: &str, weights: &[(&str, Shape)]) -> SourceModel<Validated> {
        let manifest = ModelManifest::from_json(json).unwrap();
        let weights = weights
            .iter()
            .map(|(name, shape)| (name.to_string(), weight(shape.clone())))
            .collect();
        ModelLoader::from_parts(&manifest, weights).unwrap()
    }

    fn op_names(model: &FlatModel) -> Vec<&'static str> {
        model.operators.iter().map(|o| o.op.name()).collect()
    }

    fn mlp() -> SourceModel<Validated> {
        load(
            r#"{
                "name": "mlp", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [1, 4] }],
                "outputs": ["out"],
                "layers": [
                    { "name": "hidden", "type": "dense",
                      "config": { "units": 3, "activation": "relu" },
                      "weights": { "kernel": "hidden/kernel", "bias": "hidden/bias" } },
                    { "name": "drop", "type": "dropout", "config": { "rate": 0.5 } },
                    { "name": "out", "type": "dense",
                      "config": { "units": 2, "activation": "softmax", "use_bias": false },
                      "weights": { "kernel": "out/kernel" } }
                ]
            }"#,
            &[
                ("hidden/kernel", Shape::matrix(4, 3)),
                ("hidden/bias", Shape::vector(3)),
                ("out/kernel", Shape::matrix(3, 2)),
            ],
        )
    }

    #[test]
    fn test_lower_mlp() {
        let flat = lower(&mlp()).unwrap();
        flat.validate().unwrap();
        assert_eq!(
            op_names(&flat),
            vec!["FULLY_CONNECTED", "RELU", "FULLY_CONNECTED", "SOFTMAX"]
        );
        // Dropout removed: the second dense reads the relu output directly.
        assert_eq!(flat.operators[2].inputs[0], flat.operators[1].outputs[0]);
        assert_eq!(flat.operators[2].inputs.len(), 2);
        assert_eq!(flat.tensors[flat.outputs[0]].name, "out");
        assert_eq!(flat.tensors[flat.inputs[0]].name, "x");
    }

    #[test]
    fn test_weights_pass_through_unchanged() {
        let source = mlp();
        let flat = lower(&source).unwrap();
        for (name, tensor) in source.weights() {
            let t = flat.tensor(name).unwrap();
            assert_eq!(&t.shape, tensor.shape());
            assert_eq!(t.dtype, tensor.dtype());
            assert_eq!(t.data.as_deref(), Some(tensor.as_bytes()));
        }
    }

    #[test]
    fn test_identity_output_keeps_name() {
        let source = load(
            r#"{
                "name": "id", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [1, 2] }],
                "outputs": ["drop"],
                "layers": [
                    { "name": "fc", "type": "dense", "config": { "units": 2 },
                      "weights": { "kernel": "fc/kernel", "bias": "fc/bias" } },
                    { "name": "drop", "type": "dropout" }
                ]
            }"#,
            &[("fc/kernel", Shape::matrix(2, 2)), ("fc/bias", Shape::vector(2))],
        );
        let flat = lower(&source).unwrap();
        assert_eq!(op_names(&flat), vec!["FULLY_CONNECTED", "RESHAPE"]);
        assert_eq!(flat.tensors[flat.outputs[0]].name, "drop");
        assert_eq!(flat.tensors[flat.outputs[0]].shape, Shape::matrix(1, 2));
    }

    #[test]
    fn test_lower_cnn_with_batch_norm() {
        let source = load(
            r#"{
                "name": "cnn", "format_version": 1,
                "inputs": [{ "name": "image", "shape": [1, 6, 6, 1] }],
                "outputs": ["probs"],
                "layers": [
                    { "name": "conv", "type": "conv2d",
                      "config": { "filters": 2, "kernel_size": 3 },
                      "weights": { "kernel": "conv/kernel", "bias": "conv/bias" } },
                    { "name": "bn", "type": "batch_normalization", "config": { "epsilon": 0.001 },
                      "weights": { "gamma": "bn/gamma", "beta": "bn/beta",
                                   "moving_mean": "bn/mean", "moving_variance": "bn/var" } },
                    { "name": "pool", "type": "average_pooling2d" },
                    { "name": "flat", "type": "flatten" },
                    { "name": "probs", "type": "softmax" }
                ]
            }"#,
            &[
                ("conv/kernel", Shape::new(vec![3, 3, 1, 2])),
                ("conv/bias", Shape::vector(2)),
                ("bn/gamma", Shape::vector(2)),
                ("bn/beta", Shape::vector(2)),
                ("bn/mean", Shape::vector(2)),
                ("bn/var", Shape::vector(2)),
            ],
        );
        let flat = lower(&source).unwrap();
        flat.validate().unwrap();
        assert_eq!(
            op_names(&flat),
            vec![
                "CONV_2D",
                "ADD",
                "RSQRT",
                "SUB",
                "MUL",
                "MUL",
                "ADD",
                "AVERAGE_POOL_2D",
                "RESHAPE",
                "SOFTMAX"
            ]
        );
        let eps = flat.tensor("bn/epsilon").unwrap();
        assert_eq!(eps.data.as_deref(), Some(&0.001f32.to_le_bytes()[..]));
        assert_eq!(
            flat.operators[8].op,
            Op::Reshape {
                new_shape: vec![1, 8]
            }
        );
        assert_eq!(flat.tensor("bn").unwrap().shape, Shape::new(vec![1, 4, 4, 2]));
    }

    #[test]
    fn test_add_chain() {
        let source = load(
            r#"{
                "name": "sum", "format_version": 1,
                "inputs": [{ "name": "a", "shape": [1, 2] }, { "name": "b", "shape": [1, 2] },
                           { "name": "c", "shape": [1, 2] }],
                "outputs": ["total"],
                "layers": [ { "name": "total", "type": "add", "inputs": ["a", "b", "c"] } ]
            }"#,
            &[],
        );
        let flat = lower(&source).unwrap();
        assert_eq!(op_names(&flat), vec!["ADD", "ADD"]);
        assert_eq!(flat.operators[0].inputs, vec![0, 1]);
        assert_eq!(flat.operators[1].inputs, vec![flat.operators[0].outputs[0], 2]);
    }

    #[test]
    fn test_layer_name_wins_over_pre_activation() {
        let source = load(
            r#"{
                "name": "clash", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [1, 2] }],
                "outputs": ["fc/pre_activation"],
                "layers": [
                    { "name": "fc", "type": "dense",
                      "config": { "units": 2, "activation": "relu" },
                      "weights": { "kernel": "fc/kernel", "bias": "fc/bias" } },
                    { "name": "fc/pre_activation", "type": "activation",
                      "config": { "activation": "tanh" } }
                ]
            }"#,
            &[("fc/kernel", Shape::matrix(2, 2)), ("fc/bias", Shape::vector(2))],
        );
        let flat = lower(&source).unwrap();
        flat.validate().unwrap();
        assert_eq!(op_names(&flat), vec!["FULLY_CONNECTED", "RELU", "TANH"]);
        assert_eq!(flat.tensors[flat.operators[0].outputs[0]].name, "fc/pre_activation_1");
        assert_eq!(flat.tensors[flat.outputs[0]].name, "fc/pre_activation");
        assert_eq!(&crate::flat_signature(&flat), source.signature());

        let config = crate::ConversionConfig::new(crate::FailurePolicy::Strict)
            .with_optimization(crate::OptimizationKind::FuseActivations);
        let converted = crate::convert(&source, &config).unwrap();
        assert_eq!(
            &crate::flat_signature(converted.model()),
            source.signature()
        );
    }

    #[test]
    fn test_batch_norm_tensors_avoid_layer_names() {
        let source = load(
            r#"{
                "name": "clash", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [1, 2] }],
                "outputs": ["bn/epsilon"],
                "layers": [
                    { "name": "bn", "type": "batch_normalization",
                      "config": { "center": false, "scale": false },
                      "weights": { "moving_mean": "bn/mean", "moving_variance": "bn/var" } },
                    { "name": "bn/centered", "type": "activation",
                      "config": { "activation": "relu" } },
                    { "name": "bn/epsilon", "type": "activation",
                      "config": { "activation": "sigmoid" } }
                ]
            }"#,
            &[("bn/mean", Shape::vector(2)), ("bn/var", Shape::vector(2))],
        );
        let flat = lower(&source).unwrap();
        flat.validate().unwrap();
        assert_eq!(op_names(&flat), vec!["ADD", "RSQRT", "SUB", "MUL", "RELU", "LOGISTIC"]);
        assert!(flat.tensor("bn/epsilon_1").unwrap().is_constant());
        assert!(!flat.tensor("bn/epsilon").unwrap().is_constant());
        let sub = &flat.operators[2];
        assert_eq!(sub.op, Op::Sub);
        assert_eq!(flat.tensors[sub.outputs[0]].name, "bn/centered_1");
        assert_eq!(flat.tensors[flat.outputs[0]].name, "bn/epsilon");
        assert_eq!(&crate::flat_signature(&flat), source.signature());
    }

    #[test]
    fn test_partial_sum_avoids_layer_name() {
        let source = load(
            r#"{
                "name": "clash", "format_version": 1,
                "inputs": [{ "name": "a", "shape": [1, 2] }, { "name": "b", "shape": [1, 2] },
                           { "name": "c", "shape": [1, 2] }],
                "outputs": ["total/partial_sum_1"],
                "layers": [
                    { "name": "total", "type": "add", "inputs": ["a", "b", "c"] },
                    { "name": "total/partial_sum_1", "type": "activation",
                      "config": { "activation": "relu" } }
                ]
            }"#,
            &[],
        );
        let flat = lower(&source).unwrap();
        flat.validate().unwrap();
        assert_eq!(
            flat.tensors[flat.operators[0].outputs[0]].name,
            "total/partial_sum_1_1"
        );
        assert_eq!(flat.tensors[flat.operators[1].outputs[0]].name, "total");
        assert_eq!(flat.tensors[flat.outputs[0]].name, "total/partial_sum_1");
    }

    #[test]
    fn test_layer_named_like_weight_rejected_at_load() {
        let manifest = ModelManifest::from_json(
            r#"{
                "name": "clash", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [1, 2] }],
                "outputs": ["dense"],
                "layers": [
                    { "name": "dense", "type": "dense",
                      "config": { "units": 2, "use_bias": false },
                      "weights": { "kernel": "dense" } }
                ]
            }"#,
        )
        .unwrap();
        let weights = [("dense".to_string(), weight(Shape::matrix(2, 2)))].into();
        assert!(matches!(
            ModelLoader::from_parts(&manifest, weights),
            Err(model_ir::ModelError::DuplicateName(name)) if name == "dense"
        ));
    }

    #[test]
    fn test_recurrent_layer_unsupported() {
        let source = load(
            r#"{
                "name": "rnn", "format_version": 1,
                "inputs": [{ "name": "seq", "shape": [1, 5, 3] }],
                "outputs": ["lstm"],
                "layers": [
                    { "name": "lstm", "type": "LSTM", "config": { "output_shape": [1, 4] },
                      "weights": { "kernel": "lstm/kernel" } }
                ]
            }"#,
            &[("lstm/kernel", Shape::matrix(3, 16))],
        );
        match lower(&source) {
            Err(ConvertError::UnsupportedOperation { layer, op }) => {
                assert_eq!(layer, "lstm");
                assert_eq!(op, "lstm");
            }
            other => panic!("expected UnsupportedOperation, got {other:?}"),
        }
    }
}
