// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-memory EdgeFlat model: a tensor table and a flat operator list.
//!
//! Operators reference tensors by index. Constant tensors (weights) carry
//! their data; activation tensors carry only name, shape and dtype.

use std::fmt;

use tensor_core::{DType, Padding, QuantParams, Shape};

use crate::FormatError;

/// Activation folded into a `FullyConnected` or `Conv2D` operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FusedActivation {
    #[default]
    None,
    Relu,
    Relu6,
    Tanh,
    Logistic,
}

impl FusedActivation {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Relu => 1,
            Self::Relu6 => 2,
            Self::Tanh => 3,
            Self::Logistic => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self, FormatError> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Relu),
            2 => Ok(Self::Relu6),
            3 => Ok(Self::Tanh),
            4 => Ok(Self::Logistic),
            other => Err(FormatError::Malformed(format!(
                "unknown fused activation code {other}"
            ))),
        }
    }
}

/// A destination operator and its options.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `inputs = [x, kernel[in, units], bias?]`.
    FullyConnected {
        fused_activation: FusedActivation,
    },
    /// `inputs = [x, kernel[kh, kw, cin, cout], bias?]`.
    Conv2D {
        strides: [usize; 2],
        padding: Padding,
        fused_activation: FusedActivation,
    },
    MaxPool2D {
        pool: [usize; 2],
        strides: [usize; 2],
        padding: Padding,
    },
    AveragePool2D {
        pool: [usize; 2],
        strides: [usize; 2],
        padding: Padding,
    },
    Reshape {
        new_shape: Vec<usize>,
    },
    Relu,
    Relu6,
    Logistic,
    Tanh,
    Gelu,
    Softmax {
        beta: f32,
    },
    Add,
    Sub,
    Mul,
    Rsqrt,
}

impl Op {
    /// Stable on-disk opcode.
    pub fn opcode(&self) -> u8 {
        match self {
            Op::FullyConnected { .. } => 1,
            Op::Conv2D { .. } => 2,
            Op::MaxPool2D { .. } => 3,
            Op::AveragePool2D { .. } => 4,
            Op::Reshape { .. } => 5,
            Op::Relu => 6,
            Op::Relu6 => 7,
            Op::Logistic => 8,
            Op::Tanh => 9,
            Op::Gelu => 10,
            Op::Softmax { .. } => 11,
            Op::Add => 12,
            Op::Sub => 13,
            Op::Mul => 14,
            Op::Rsqrt => 15,
        }
    }

    /// Operator name as used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Op::FullyConnected { .. } => "FULLY_CONNECTED",
            Op::Conv2D { .. } => "CONV_2D",
            Op::MaxPool2D { .. } => "MAX_POOL_2D",
            Op::AveragePool2D { .. } => "AVERAGE_POOL_2D",
            Op::Reshape { .. } => "RESHAPE",
            Op::Relu => "RELU",
            Op::Relu6 => "RELU6",
            Op::Logistic => "LOGISTIC",
            Op::Tanh => "TANH",
            Op::Gelu => "GELU",
            Op::Softmax { .. } => "SOFTMAX",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Rsqrt => "RSQRT",
        }
    }

    /// Indices into `inputs` that must be constant weights of this op.
    pub fn weight_inputs(&self) -> &'static [usize] {
        match self {
            Op::FullyConnected { .. } | Op::Conv2D { .. } => &[1, 2],
            _ => &[],
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the operator list.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub op: Op,
    /// Tensor-table indices consumed, in operand order.
    pub inputs: Vec<usize>,
    /// Tensor-table indices produced.
    pub outputs: Vec<usize>,
}

/// One entry of the tensor table.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTensor {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
    /// Constant buffer (little-endian), `None` for activations.
    pub data: Option<Vec<u8>>,
    /// Dequantization parameters; present exactly when `dtype` is `I8`.
    pub quantization: Option<QuantParams>,
}

impl FlatTensor {
    /// A non-constant `F32` tensor.
    pub fn activation(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype: DType::F32,
            data: None,
            quantization: None,
        }
    }

    /// Returns `true` if the tensor carries constant data.
    pub fn is_constant(&self) -> bool {
        self.data.is_some()
    }

    /// Checks the buffer length and quantization invariants.
    pub fn check(&self) -> Result<(), FormatError> {
        if let Some(data) = &self.data {
            let expected = self.shape.size_bytes(self.dtype);
            if data.len() != expected {
                return Err(FormatError::Malformed(format!(
                    "tensor '{}' holds {} bytes, shape {} {} needs {expected}",
                    self.name,
                    data.len(),
                    self.shape,
                    self.dtype
                )));
            }
        }
        if (self.dtype == DType::I8) != self.quantization.is_some() {
            return Err(FormatError::Malformed(format!(
                "tensor '{}' of dtype {} has inconsistent quantization parameters",
                self.name, self.dtype
            )));
        }
        if self.dtype == DType::I8 && self.data.is_none() {
            return Err(FormatError::Malformed(format!(
                "int8 tensor '{}' is not a constant",
                self.name
            )));
        }
        Ok(())
    }
}

/// A complete destination-format model.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatModel {
    pub name: String,
    /// Free-form identifier of the tool that produced the file.
    pub producer: String,
    pub tensors: Vec<FlatTensor>,
    pub operators: Vec<Operator>,
    /// Tensor indices of the model inputs, in signature order.
    pub inputs: Vec<usize>,
    /// Tensor indices of the model outputs, in signature order.
    pub outputs: Vec<usize>,
}

/// Header flag: the model contains int8 tensors.
pub const FLAG_HAS_INT8: u32 = 1 << 0;
/// Header flag: the model contains f16 tensors.
pub const FLAG_HAS_F16: u32 = 1 << 1;

impl FlatModel {
    /// Returns the index of the tensor called `name`.
    pub fn tensor_index(&self, name: &str) -> Option<usize> {
        self.tensors.iter().position(|t| t.name == name)
    }

    /// Returns the tensor called `name`.
    pub fn tensor(&self, name: &str) -> Option<&FlatTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Iterates over constant tensors.
    pub fn constants(&self) -> impl Iterator<Item = &FlatTensor> {
        self.tensors.iter().filter(|t| t.is_constant())
    }

    /// Header flags derived from the tensor dtypes.
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        for t in &self.tensors {
            match t.dtype {
                DType::I8 => flags |= FLAG_HAS_INT8,
                DType::F16 => flags |= FLAG_HAS_F16,
                _ => {}
            }
        }
        flags
    }

    /// Total bytes held by constant buffers.
    pub fn constant_bytes(&self) -> usize {
        self.constants()
            .filter_map(|t| t.data.as_ref())
            .map(Vec::len)
            .sum()
    }

    /// Checks structural invariants:
    /// - tensor names are unique and buffers match their shapes;
    /// - every index is in bounds;
    /// - operators appear in execution order (inputs are constants or
    ///   produced earlier);
    /// - each tensor has at most one producer, and model inputs and
    ///   constants are never written;
    /// - every model output is an input, a constant or an operator output.
    pub fn validate(&self) -> Result<(), FormatError> {
        let n = self.tensors.len();
        let mut names = std::collections::HashSet::new();
        for t in &self.tensors {
            if !names.insert(t.name.as_str()) {
                return Err(FormatError::Malformed(format!(
                    "duplicate tensor name '{}'",
                    t.name
                )));
            }
            t.check()?;
        }

        let in_bounds = |what: &'static str, idx: usize| {
            if idx < n {
                Ok(())
            } else {
                Err(FormatError::OutOfBounds {
                    what,
                    detail: format!("tensor index {idx} >= {n}"),
                })
            }
        };

        let mut produced = vec![false; n];
        for &i in &self.inputs {
            in_bounds("model input", i)?;
            produced[i] = true;
        }
        for (op_index, operator) in self.operators.iter().enumerate() {
            for &i in &operator.inputs {
                in_bounds("operator input", i)?;
                if !produced[i] && !self.tensors[i].is_constant() {
                    return Err(FormatError::Malformed(format!(
                        "operator {op_index} ({}) reads '{}' before it is produced",
                        operator.op, self.tensors[i].name
                    )));
                }
            }
            if operator.outputs.is_empty() {
                return Err(FormatError::Malformed(format!(
                    "operator {op_index} ({}) has no outputs",
                    operator.op
                )));
            }
            for &i in &operator.outputs {
                in_bounds("operator output", i)?;
                if produced[i] || self.tensors[i].is_constant() {
                    return Err(FormatError::Malformed(format!(
                        "tensor '{}' is written more than once",
                        self.tensors[i].name
                    )));
                }
                produced[i] = true;
            }
        }
        for &i in &self.outputs {
            in_bounds("model output", i)?;
            if !produced[i] && !self.tensors[i].is_constant() {
                return Err(FormatError::Malformed(format!(
                    "model output '{}' is never produced",
                    self.tensors[i].name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> FlatModel {
        let kernel: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        FlatModel {
            name: "tiny".into(),
            producer: "test".into(),
            tensors: vec![
                FlatTensor::activation("x", Shape::matrix(1, 2)),
                FlatTensor {
                    name: "w".into(),
                    shape: Shape::matrix(2, 2),
                    dtype: DType::F32,
                    data: Some(kernel),
                    quantization: None,
                },
                FlatTensor::activation("y", Shape::matrix(1, 2)),
            ],
            operators: vec![Operator {
                op: Op::FullyConnected {
                    fused_activation: FusedActivation::Relu,
                },
                inputs: vec![0, 1],
                outputs: vec![2],
            }],
            inputs: vec![0],
            outputs: vec![2],
        }
    }

    #[test]
    fn test_validate_ok() {
        let m = tiny_model();
        m.validate().unwrap();
        assert_eq!(m.flags(), 0);
        assert_eq!(m.constant_bytes(), 16);
        assert_eq!(m.tensor_index("w"), Some(1));
    }

    #[test]
    fn test_validate_out_of_bounds() {
        let mut m = tiny_model();
        m.operators[0].inputs.push(9);
        assert!(matches!(
            m.validate(),
            Err(FormatError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_validate_double_write() {
        let mut m = tiny_model();
        m.operators[0].outputs = vec![0];
        assert!(matches!(m.validate(), Err(FormatError::Malformed(_))));
    }

    #[test]
    fn test_unproduced_output_rejected() {
        let mut m = tiny_model();
        m.tensors.push(FlatTensor::activation("orphan", Shape::matrix(1, 2)));
        m.outputs = vec![2, 3];
        match m.validate() {
            Err(FormatError::Malformed(detail)) => assert!(detail.contains("orphan")),
            other => panic!("expected Malformed, got {other:?}"),
        }

        m.outputs = vec![0];
        m.validate().unwrap();
    }

    #[test]
    fn test_int8_requires_quantization() {
        let mut m = tiny_model();
        m.tensors[1].dtype = DType::I8;
        m.tensors[1].data = Some(vec![0; 4]);
        assert!(m.validate().is_err());
        m.tensors[1].quantization = Some(QuantParams {
            scale: 0.1,
            zero_point: 0,
        });
        m.validate().unwrap();
        assert_eq!(m.flags(), FLAG_HAS_INT8);
    }

    #[test]
    fn test_buffer_size_checked() {
        let mut m = tiny_model();
        m.tensors[1].data = Some(vec![0; 3]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_op_names_and_codes_unique() {
        let ops = [
            Op::FullyConnected {
                fused_activation: FusedActivation::None,
            },
            Op::Relu,
            Op::Softmax { beta: 1.0 },
            Op::Rsqrt,
        ];
        let codes: std::collections::HashSet<_> = ops.iter().map(Op::opcode).collect();
        assert_eq!(codes.len(), ops.len());
        assert_eq!(Op::Rsqrt.to_string(), "RSQRT");
    }
}
