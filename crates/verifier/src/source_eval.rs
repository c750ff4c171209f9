// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference evaluation of source graphs, layer by layer in `f32`.

use std::collections::BTreeMap;

use model_ir::{Activation, LayerConfig, LayerDef, LayerType, SourceModel, Validated, WeightRole};
use tensor_core::{
    binary, conv2d, gelu, linear, pool2d, softmax, unary, BinaryOp, PoolKind, Shape, UnaryOp,
};

use crate::value::{Value, Values};
use crate::VerifyError;

/// Evaluates a validated source model on concrete inputs.
///
/// Weights are widened to `f32` once, at construction.
pub struct SourceEvaluator<'a> {
    model: &'a SourceModel<Validated>,
    weights: BTreeMap<&'a str, Vec<f32>>,
}

impl<'a> SourceEvaluator<'a> {
    pub fn new(model: &'a SourceModel<Validated>) -> Result<Self, VerifyError> {
        let weights = model
            .weights()
            .iter()
            .map(|(name, t)| -> Result<_, VerifyError> { Ok((name.as_str(), t.to_f32_vec()?)) })
            .collect::<Result<_, VerifyError>>()?;
        Ok(Self { model, weights })
    }

    /// Runs every layer and returns the signature outputs by name.
    pub fn evaluate(&self, inputs: &Values) -> Result<Values, VerifyError> {
        let mut env: BTreeMap<&str, Value> = BTreeMap::new();
        for spec in &self.model.signature().inputs {
            let value = inputs
                .get(&spec.name)
                .ok_or_else(|| VerifyError::MissingInput(spec.name.clone()))?;
            if value.shape != spec.shape {
                return Err(VerifyError::InputShape {
                    name: spec.name.clone(),
                    expected: spec.shape.clone(),
                    actual: value.shape.clone(),
                });
            }
            env.insert(&spec.name, value.clone());
        }

        for layer in self.model.iter_layers() {
            let args = layer
                .inputs
                .iter()
                .map(|name| env.get(name.as_str()).ok_or_else(|| VerifyError::Unbound(name.clone())))
                .collect::<Result<Vec<_>, _>>()?;
            let out = self.eval_layer(layer, &args)?;
            env.insert(&layer.name, out);
        }

        self.model
            .signature()
            .outputs
            .iter()
            .map(|spec| {
                env.remove(spec.name.as_str())
                    .map(|v| (spec.name.clone(), v))
                    .ok_or_else(|| VerifyError::Unbound(spec.name.clone()))
            })
            .collect()
    }

    fn weight(&self, layer: &LayerDef, role: WeightRole) -> Option<&[f32]> {
        layer
            .weight(role)
            .and_then(|name| self.weights.get(name))
            .map(Vec::as_slice)
    }

    fn required(&self, layer: &LayerDef, role: WeightRole) -> Result<&[f32], VerifyError> {
        self.weight(layer, role).ok_or_else(|| {
            VerifyError::Unbound(format!("{}:{}", layer.name, role.as_str()))
        })
    }

    fn weight_shape(&self, layer: &LayerDef, role: WeightRole) -> Result<&Shape, VerifyError> {
        layer
            .weight(role)
            .and_then(|name| self.model.weight(name))
            .map(|t| t.shape())
            .ok_or_else(|| VerifyError::Unbound(format!("{}:{}", layer.name, role.as_str())))
    }

    fn eval_layer(&self, layer: &LayerDef, args: &[&Value]) -> Result<Value, VerifyError> {
        let x = args[0];
        let out = match &layer.config {
            LayerConfig::Dense { activation, .. } => {
                let kernel = self.required(layer, WeightRole::Kernel)?;
                let kshape = self.weight_shape(layer, WeightRole::Kernel)?;
                let bias = self.weight(layer, WeightRole::Bias);
                let (data, shape) = linear(&x.data, &x.shape, kernel, kshape, bias)?;
                activate(*activation, Value::new(shape, data))?
            }
            LayerConfig::Conv2D {
                strides,
                padding,
                activation,
                ..
            } => {
                let kernel = self.required(layer, WeightRole::Kernel)?;
                let kshape = self.weight_shape(layer, WeightRole::Kernel)?;
                let bias = self.weight(layer, WeightRole::Bias);
                let (data, shape) =
                    conv2d(&x.data, &x.shape, kernel, kshape, bias, *strides, *padding)?;
                activate(*activation, Value::new(shape, data))?
            }
            LayerConfig::Pool2D {
                pool_size,
                strides,
                padding,
            } => {
                let kind = if layer.layer_type == LayerType::MaxPooling2D {
                    PoolKind::Max
                } else {
                    PoolKind::Average
                };
                let (data, shape) = pool2d(kind, &x.data, &x.shape, *pool_size, *strides, *padding)?;
                Value::new(shape, data)
            }
            LayerConfig::Flatten | LayerConfig::Reshape { .. } => {
                Value::new(layer.output_shape.clone(), x.data.clone())
            }
            LayerConfig::Dropout { .. } => x.clone(),
            LayerConfig::Activation { activation } => activate(*activation, x.clone())?,
            LayerConfig::Softmax => activate(Activation::Softmax, x.clone())?,
            LayerConfig::BatchNorm { epsilon, .. } => {
                let mean = self.required(layer, WeightRole::MovingMean)?;
                let var = self.required(layer, WeightRole::MovingVariance)?;
                let gamma = self.weight(layer, WeightRole::Gamma);
                let beta = self.weight(layer, WeightRole::Beta);
                let channels = mean.len().max(1);
                let data = x
                    .data
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| {
                        let c = i % channels;
                        let mut y = (v - mean[c]) / (var[c] + epsilon).sqrt();
                        if let Some(g) = gamma {
                            y *= g[c];
                        }
                        if let Some(b) = beta {
                            y += b[c];
                        }
                        y
                    })
                    .collect();
                Value::new(x.shape.clone(), data)
            }
            LayerConfig::Add => {
                let mut acc = x.clone();
                for rhs in &args[1..] {
                    let (data, shape) =
                        binary(BinaryOp::Add, &acc.data, &acc.shape, &rhs.data, &rhs.shape)?;
                    acc = Value::new(shape, data);
                }
                acc
            }
            LayerConfig::Opaque { .. } => {
                return Err(VerifyError::Unsupported {
                    layer: layer.name.clone(),
                    layer_type: layer.layer_type.to_string(),
                })
            }
        };
        Ok(out)
    }
}

/// Applies a source activation function.
fn activate(activation: Activation, x: Value) -> Result<Value, VerifyError> {
    let data = match activation {
        Activation::Linear => return Ok(x),
        Activation::Relu => unary(UnaryOp::Relu, &x.data),
        Activation::Relu6 => unary(UnaryOp::Relu6, &x.data),
        Activation::Sigmoid => unary(UnaryOp::Sigmoid, &x.data),
        Activation::Tanh => unary(UnaryOp::Tanh, &x.data),
        Activation::Gelu => gelu(&x.data),
        Activation::Softmax => softmax(&x.data, &x.shape, 1.0)?,
    };
    Ok(Value::new(x.shape, data))
}
