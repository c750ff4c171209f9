// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer definitions for the source model IR.
//!
//! Each [`LayerDef`] describes one computation in the source graph: its
//! type, its typed configuration, the tensors it consumes, the weights it
//! owns (by role) and its inferred output shape. Weight *data* lives in the
//! model's weight map, keyed by tensor name.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use tensor_core::{Padding, Shape};

use crate::ModelError;

/// The type of computation a layer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    /// Fully-connected projection over the last axis.
    Dense,
    /// 2-D convolution over NHWC activations.
    Conv2D,
    MaxPooling2D,
    AveragePooling2D,
    /// Collapse all non-batch axes into one.
    Flatten,
    Reshape,
    /// Identity at inference time.
    Dropout,
    /// Standalone activation function.
    Activation,
    Softmax,
    /// Inference-mode batch normalization over the last axis.
    BatchNormalization,
    /// Element-wise sum of two or more equally shaped tensors.
    Add,
    /// Recurrent layer; recognised but has no destination lowering.
    Lstm,
    /// Recurrent layer; recognised but has no destination lowering.
    Gru,
    /// Arbitrary user code; recognised but has no destination lowering.
    Lambda,
}

impl LayerType {
    /// Parses a layer type from a manifest string.
    ///
    /// Case-insensitive; accepts snake_case names plus common aliases
    /// (`"Conv2D"`, `"maxpool2d"`, `"batchnorm"`, `"fc"`).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dense" | "fully_connected" | "fc" => Some(Self::Dense),
            "conv2d" | "conv_2d" | "convolution2d" => Some(Self::Conv2D),
            "max_pooling2d" | "maxpooling2d" | "max_pool2d" | "maxpool2d" => {
                Some(Self::MaxPooling2D)
            }
            "average_pooling2d" | "averagepooling2d" | "avg_pool2d" | "avgpool2d" => {
                Some(Self::AveragePooling2D)
            }
            "flatten" => Some(Self::Flatten),
            "reshape" => Some(Self::Reshape),
            "dropout" => Some(Self::Dropout),
            "activation" => Some(Self::Activation),
            "softmax" => Some(Self::Softmax),
            "batch_normalization" | "batchnormalization" | "batch_norm" | "batchnorm" => {
                Some(Self::BatchNormalization)
            }
            "add" => Some(Self::Add),
            "lstm" => Some(Self::Lstm),
            "gru" => Some(Self::Gru),
            "lambda" => Some(Self::Lambda),
            _ => None,
        }
    }

    /// Returns the canonical manifest label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Conv2D => "conv2d",
            Self::MaxPooling2D => "max_pooling2d",
            Self::AveragePooling2D => "average_pooling2d",
            Self::Flatten => "flatten",
            Self::Reshape => "reshape",
            Self::Dropout => "dropout",
            Self::Activation => "activation",
            Self::Softmax => "softmax",
            Self::BatchNormalization => "batch_normalization",
            Self::Add => "add",
            Self::Lstm => "lstm",
            Self::Gru => "gru",
            Self::Lambda => "lambda",
        }
    }

    /// Layers whose semantics the loader cannot infer; their output shape
    /// must be declared in the manifest.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Lstm | Self::Gru | Self::Lambda)
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activation functions accepted in layer configurations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Relu6,
    Sigmoid,
    Tanh,
    Softmax,
    Gelu,
}

impl Activation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Relu6 => "relu6",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
            Self::Gelu => "gelu",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part a weight tensor plays in its layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WeightRole {
    Kernel,
    Bias,
    RecurrentKernel,
    Gamma,
    Beta,
    MovingMean,
    MovingVariance,
}

impl WeightRole {
    /// Parses a manifest weight key.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kernel" | "weight" => Some(Self::Kernel),
            "bias" => Some(Self::Bias),
            "recurrent_kernel" => Some(Self::RecurrentKernel),
            "gamma" => Some(Self::Gamma),
            "beta" => Some(Self::Beta),
            "moving_mean" => Some(Self::MovingMean),
            "moving_variance" => Some(Self::MovingVariance),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Bias => "bias",
            Self::RecurrentKernel => "recurrent_kernel",
            Self::Gamma => "gamma",
            Self::Beta => "beta",
            Self::MovingMean => "moving_mean",
            Self::MovingVariance => "moving_variance",
        }
    }
}

impl fmt::Display for WeightRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed, validated configuration of a layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerConfig {
    Dense {
        units: usize,
        activation: Activation,
        use_bias: bool,
    },
    Conv2D {
        filters: usize,
        kernel_size: [usize; 2],
        strides: [usize; 2],
        padding: Padding,
        activation: Activation,
        use_bias: bool,
    },
    Pool2D {
        pool_size: [usize; 2],
        strides: [usize; 2],
        padding: Padding,
    },
    Flatten,
    /// `target_shape` excludes the batch axis and may hold one `-1`.
    Reshape {
        target_shape: Vec<i64>,
    },
    Dropout {
        rate: f32,
    },
    Activation {
        activation: Activation,
    },
    Softmax,
    BatchNorm {
        epsilon: f32,
        center: bool,
        scale: bool,
    },
    Add,
    /// Layer without inferable semantics; carries its declared output shape.
    Opaque {
        output_shape: Vec<usize>,
    },
}

/// An integer or a `[h, w]` pair, as written in Keras-style configs.
#[derive(Deserialize)]
#[serde(untagged)]
enum Pair {
    One(usize),
    Two([usize; 2]),
}

impl Pair {
    fn get(&self) -> [usize; 2] {
        match *self {
            Pair::One(v) => [v, v],
            Pair::Two(p) => p,
        }
    }
}

fn yes() -> bool {
    true
}

fn one_one() -> Pair {
    Pair::Two([1, 1])
}

fn default_epsilon() -> f32 {
    1e-3
}

fn default_axis() -> i64 {
    -1
}

#[derive(Deserialize)]
struct DenseRaw {
    units: usize,
    #[serde(default)]
    activation: Activation,
    #[serde(default = "yes")]
    use_bias: bool,
}

#[derive(Deserialize)]
struct ConvRaw {
    filters: usize,
    kernel_size: Pair,
    #[serde(default = "one_one")]
    strides: Pair,
    #[serde(default = "valid")]
    padding: Padding,
    #[serde(default = "one_one")]
    dilation_rate: Pair,
    #[serde(default)]
    activation: Activation,
    #[serde(default = "yes")]
    use_bias: bool,
}

#[derive(Deserialize)]
struct PoolRaw {
    #[serde(default)]
    pool_size: Option<Pair>,
    #[serde(default)]
    strides: Option<Pair>,
    #[serde(default = "valid")]
    padding: Padding,
}

fn valid() -> Padding {
    Padding::Valid
}

#[derive(Deserialize)]
struct ReshapeRaw {
    target_shape: Vec<i64>,
}

#[derive(Deserialize)]
struct DropoutRaw {
    #[serde(default)]
    rate: f32,
}

#[derive(Deserialize)]
struct ActivationRaw {
    activation: Activation,
}

#[derive(Deserialize)]
struct SoftmaxRaw {
    #[serde(default = "default_axis")]
    axis: i64,
}

#[derive(Deserialize)]
struct BatchNormRaw {
    #[serde(default = "default_axis")]
    axis: i64,
    #[serde(default = "default_epsilon")]
    epsilon: f32,
    #[serde(default = "yes")]
    center: bool,
    #[serde(default = "yes")]
    scale: bool,
}

#[derive(Deserialize)]
struct OpaqueRaw {
    output_shape: Option<Vec<usize>>,
}

impl LayerConfig {
    /// Builds the typed configuration for `layer_type` from its manifest
    /// `config` object. A missing config is treated as `{}`.
    ///
    /// # Errors
    /// [`ModelError::InvalidLayer`] for unknown activation or padding names,
    /// missing required fields, or unsupported parameter values (zero
    /// units, dilation other than 1, softmax over a non-last axis).
    pub fn from_json(
        layer: &str,
        layer_type: LayerType,
        config: &serde_json::Value,
    ) -> Result<Self, ModelError> {
        let config = if config.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            config.clone()
        };
        let parse_err = |e: serde_json::Error| ModelError::layer(layer, e.to_string());

        let parsed = match layer_type {
            LayerType::Dense => {
                let raw: DenseRaw = serde_json::from_value(config).map_err(parse_err)?;
                if raw.units == 0 {
                    return Err(ModelError::layer(layer, "units must be positive"));
                }
                Self::Dense {
                    units: raw.units,
                    activation: raw.activation,
                    use_bias: raw.use_bias,
                }
            }
            LayerType::Conv2D => {
                let raw: ConvRaw = serde_json::from_value(config).map_err(parse_err)?;
                if raw.dilation_rate.get() != [1, 1] {
                    return Err(ModelError::layer(layer, "dilation_rate other than 1 is not supported"));
                }
                let kernel_size = raw.kernel_size.get();
                let strides = raw.strides.get();
                if raw.filters == 0 || kernel_size.contains(&0) || strides.contains(&0) {
                    return Err(ModelError::layer(
                        layer,
                        "filters, kernel_size and strides must be positive",
                    ));
                }
                Self::Conv2D {
                    filters: raw.filters,
                    kernel_size,
                    strides,
                    padding: raw.padding,
                    activation: raw.activation,
                    use_bias: raw.use_bias,
                }
            }
            LayerType::MaxPooling2D | LayerType::AveragePooling2D => {
                let raw: PoolRaw = serde_json::from_value(config).map_err(parse_err)?;
                let pool_size = raw.pool_size.map(|p| p.get()).unwrap_or([2, 2]);
                let strides = raw.strides.map(|p| p.get()).unwrap_or(pool_size);
                if pool_size.contains(&0) || strides.contains(&0) {
                    return Err(ModelError::layer(layer, "pool_size and strides must be positive"));
                }
                Self::Pool2D {
                    pool_size,
                    strides,
                    padding: raw.padding,
                }
            }
            LayerType::Flatten => Self::Flatten,
            LayerType::Reshape => {
                let raw: ReshapeRaw = serde_json::from_value(config).map_err(parse_err)?;
                Self::Reshape {
                    target_shape: raw.target_shape,
                }
            }
            LayerType::Dropout => {
                let raw: DropoutRaw = serde_json::from_value(config).map_err(parse_err)?;
                Self::Dropout { rate: raw.rate }
            }
            LayerType::Activation => {
                let raw: ActivationRaw = serde_json::from_value(config).map_err(parse_err)?;
                Self::Activation {
                    activation: raw.activation,
                }
            }
            LayerType::Softmax => {
                let raw: SoftmaxRaw = serde_json::from_value(config).map_err(parse_err)?;
                if raw.axis != -1 {
                    return Err(ModelError::layer(layer, "softmax is only supported over the last axis"));
                }
                Self::Softmax
            }
            LayerType::BatchNormalization => {
                let raw: BatchNormRaw = serde_json::from_value(config).map_err(parse_err)?;
                if raw.axis != -1 {
                    return Err(ModelError::layer(
                        layer,
                        "batch normalization is only supported over the last axis",
                    ));
                }
                if !(raw.epsilon.is_finite() && raw.epsilon >= 0.0) {
                    return Err(ModelError::layer(layer, "epsilon must be finite and non-negative"));
                }
                Self::BatchNorm {
                    epsilon: raw.epsilon,
                    center: raw.center,
                    scale: raw.scale,
                }
            }
            LayerType::Add => Self::Add,
            LayerType::Lstm | LayerType::Gru | LayerType::Lambda => {
                let raw: OpaqueRaw = serde_json::from_value(config).map_err(parse_err)?;
                let output_shape = raw.output_shape.ok_or_else(|| {
                    ModelError::layer(layer, format!("{layer_type} layers must declare output_shape"))
                })?;
                Self::Opaque { output_shape }
            }
        };
        Ok(parsed)
    }

    /// Weight roles this configuration requires, and those it permits.
    pub(crate) fn weight_roles(&self) -> (Vec<WeightRole>, Vec<WeightRole>) {
        use WeightRole::*;
        match self {
            Self::Dense { use_bias, .. } | Self::Conv2D { use_bias, .. } => {
                if *use_bias {
                    (vec![Kernel, Bias], vec![Kernel, Bias])
                } else {
                    (vec![Kernel], vec![Kernel])
                }
            }
            Self::BatchNorm { center, scale, .. } => {
                let mut required = vec![MovingMean, MovingVariance];
                if *scale {
                    required.push(Gamma);
                }
                if *center {
                    required.push(Beta);
                }
                (required.clone(), required)
            }
            Self::Opaque { .. } => (vec![], vec![Kernel, RecurrentKernel, Bias]),
            _ => (vec![], vec![]),
        }
    }

    /// Fused activation carried by the configuration, if any.
    pub fn activation(&self) -> Option<Activation> {
        match self {
            Self::Dense { activation, .. }
            | Self::Conv2D { activation, .. }
            | Self::Activation { activation } => Some(*activation),
            Self::Softmax => Some(Activation::Softmax),
            _ => None,
        }
    }
}

/// Metadata describing a single layer in the source graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LayerDef {
    /// Unique layer name; also the name of the tensor it produces.
    pub name: String,
    /// The type of computation this layer performs.
    pub layer_type: LayerType,
    /// Typed configuration.
    pub config: LayerConfig,
    /// Index in the execution order (0-based).
    pub index: usize,
    /// Names of the tensors this layer consumes, in order.
    pub inputs: Vec<String>,
    /// Weight tensor names keyed by role.
    pub weights: BTreeMap<WeightRole, String>,
    /// Inferred shape of the produced tensor.
    pub output_shape: Shape,
}

impl LayerDef {
    /// Returns the tensor name bound to `role`, if any.
    pub fn weight(&self, role: WeightRole) -> Option<&str> {
        self.weights.get(&role).map(String::as_str)
    }

    /// Iterates over the weight tensor names of this layer.
    pub fn weight_names(&self) -> impl Iterator<Item = &str> {
        self.weights.values().map(String::as_str)
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} ({}) <- [{}] -> {}, {} weight tensors",
            self.index,
            self.name,
            self.layer_type,
            self.inputs.join(", "),
            self.output_shape,
            self.weights.len(),
        )
    }
}
