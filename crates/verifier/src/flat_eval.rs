// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference evaluation of EdgeFlat models.
//!
//! Constants are expanded to `f32` up front: int8 tensors through their
//! quantization parameters, f16/bf16 tensors by widening. Operators then run
//! in list order on the same kernels as the source evaluator.

use flat_model::{FlatModel, FlatTensor, FusedActivation, Op};
use tensor_core::{
    binary, conv2d, dequantize_i8, gelu, linear, pool2d, softmax, unary, BinaryOp, DType,
    PoolKind, Tensor, UnaryOp,
};

use crate::value::{Value, Values};
use crate::VerifyError;

/// Evaluates a decoded EdgeFlat model on concrete inputs.
pub struct FlatEvaluator<'a> {
    model: &'a FlatModel,
    constants: Vec<Option<Value>>,
}

impl<'a> FlatEvaluator<'a> {
    /// Expands every constant of `model`. The model should already be
    /// validated (as [`flat_model::decode`] does).
    pub fn new(model: &'a FlatModel) -> Result<Self, VerifyError> {
        let constants = model
            .tensors
            .iter()
            .map(expand_constant)
            .collect::<Result<_, _>>()?;
        Ok(Self { model, constants })
    }

    /// Runs every operator and returns the model outputs by name.
    pub fn evaluate(&self, inputs: &Values) -> Result<Values, VerifyError> {
        let mut env: Vec<Option<Value>> = self.constants.clone();
        for &i in &self.model.inputs {
            let t = &self.model.tensors[i];
            let value = inputs
                .get(&t.name)
                .ok_or_else(|| VerifyError::MissingInput(t.name.clone()))?;
            if value.shape != t.shape {
                return Err(VerifyError::InputShape {
                    name: t.name.clone(),
                    expected: t.shape.clone(),
                    actual: value.shape.clone(),
                });
            }
            env[i] = Some(value.clone());
        }

        for operator in &self.model.operators {
            let args = operator
                .inputs
                .iter()
                .map(|&i| {
                    env.get(i)
                        .and_then(Option::as_ref)
                        .ok_or_else(|| VerifyError::Unbound(self.name(i)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let out = eval_op(&operator.op, &args)?;
            let [target] = operator.outputs[..] else {
                return Err(VerifyError::Unbound(format!(
                    "{} with {} outputs",
                    operator.op,
                    operator.outputs.len()
                )));
            };
            env[target] = Some(out);
        }

        self.model
            .outputs
            .iter()
            .map(|&i| {
                env[i]
                    .clone()
                    .map(|v| (self.name(i), v))
                    .ok_or_else(|| VerifyError::Unbound(self.name(i)))
            })
            .collect()
    }

    fn name(&self, i: usize) -> String {
        self.model
            .tensors
            .get(i)
            .map_or_else(|| format!("#{i}"), |t| t.name.clone())
    }
}

fn expand_constant(t: &FlatTensor) -> Result<Option<Value>, VerifyError> {
    let Some(data) = &t.data else {
        return Ok(None);
    };
    let values = match (t.dtype, t.quantization) {
        (DType::I8, Some(params)) => {
            let q: Vec<i8> = data.iter().map(|&b| b as i8).collect();
            dequantize_i8(&q, params)
        }
        _ => Tensor::from_bytes(t.shape.clone(), t.dtype, data.clone())?.to_f32_vec()?,
    };
    Ok(Some(Value::new(t.shape.clone(), values)))
}

fn apply_fused(fused: FusedActivation, data: Vec<f32>) -> Vec<f32> {
    match fused {
        FusedActivation::None => data,
        FusedActivation::Relu => unary(UnaryOp::Relu, &data),
        FusedActivation::Relu6 => unary(UnaryOp::Relu6, &data),
        FusedActivation::Tanh => unary(UnaryOp::Tanh, &data),
        FusedActivation::Logistic => unary(UnaryOp::Sigmoid, &data),
    }
}

fn eval_op(op: &Op, args: &[&Value]) -> Result<Value, VerifyError> {
    let x = args[0];
    let bias = || args.get(2).map(|b| b.data.as_slice());
    let binary_op = |kind: BinaryOp| -> Result<Value, VerifyError> {
        let y = args.get(1).ok_or_else(|| VerifyError::Unbound(format!("{op} rhs")))?;
        let (data, shape) = binary(kind, &x.data, &x.shape, &y.data, &y.shape)?;
        Ok(Value::new(shape, data))
    };
    let elementwise = |data: Vec<f32>| Value::new(x.shape.clone(), data);

    let out = match op {
        Op::FullyConnected { fused_activation } => {
            let k = args.get(1).ok_or_else(|| VerifyError::Unbound(format!("{op} kernel")))?;
            let (data, shape) = linear(&x.data, &x.shape, &k.data, &k.shape, bias())?;
            Value::new(shape, apply_fused(*fused_activation, data))
        }
        Op::Conv2D {
            strides,
            padding,
            fused_activation,
        } => {
            let k = args.get(1).ok_or_else(|| VerifyError::Unbound(format!("{op} kernel")))?;
            let (data, shape) =
                conv2d(&x.data, &x.shape, &k.data, &k.shape, bias(), *strides, *padding)?;
            Value::new(shape, apply_fused(*fused_activation, data))
        }
        Op::MaxPool2D {
            pool,
            strides,
            padding,
        } => {
            let (data, shape) = pool2d(PoolKind::Max, &x.data, &x.shape, *pool, *strides, *padding)?;
            Value::new(shape, data)
        }
        Op::AveragePool2D {
            pool,
            strides,
            padding,
        } => {
            let (data, shape) =
                pool2d(PoolKind::Average, &x.data, &x.shape, *pool, *strides, *padding)?;
            Value::new(shape, data)
        }
        Op::Reshape { new_shape } => {
            Value::new(tensor_core::Shape::new(new_shape.clone()), x.data.clone())
        }
        Op::Relu => elementwise(unary(UnaryOp::Relu, &x.data)),
        Op::Relu6 => elementwise(unary(UnaryOp::Relu6, &x.data)),
        Op::Logistic => elementwise(unary(UnaryOp::Sigmoid, &x.data)),
        Op::Tanh => elementwise(unary(UnaryOp::Tanh, &x.data)),
        Op::Rsqrt => elementwise(unary(UnaryOp::Rsqrt, &x.data)),
        Op::Gelu => elementwise(gelu(&x.data)),
        Op::Softmax { beta } => elementwise(softmax(&x.data, &x.shape, *beta)?),
        Op::Add => binary_op(BinaryOp::Add)?,
        Op::Sub => binary_op(BinaryOp::Sub)?,
        Op::Mul => binary_op(BinaryOp::Mul)?,
    };
    Ok(out)
}
