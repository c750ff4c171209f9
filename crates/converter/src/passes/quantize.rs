// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Dynamic-range int8 weight quantization (the `default` optimization).
//!
//! Only the kernel operand of `FULLY_CONNECTED` and `CONV_2D` is quantized,
//! and only while it is still `F32`. Biases and all other constants keep
//! their encoding. Parameters are per tensor, see [`tensor_core::quantize_i8`].

use std::collections::BTreeSet;

use flat_model::{FlatModel, Op};
use tensor_core::{quantize_i8, DType};
use tracing::debug;

use super::{f32_values, OptimizationPass, PassReport};
use crate::{ConvertError, FailurePolicy, OptimizationKind};

#[derive(Debug, Clone, Default)]
pub struct DynamicRangeQuantization;

/// Tensor indices of `FULLY_CONNECTED`/`CONV_2D` kernels, ascending.
pub(crate) fn kernel_indices(model: &FlatModel) -> BTreeSet<usize> {
    model
        .operators
        .iter()
        .filter(|o| matches!(o.op, Op::FullyConnected { .. } | Op::Conv2D { .. }))
        .filter_map(|o| o.inputs.get(1).copied())
        .collect()
}

impl OptimizationPass for DynamicRangeQuantization {
    fn kind(&self) -> OptimizationKind {
        OptimizationKind::Default
    }

    fn run(
        &self,
        model: &mut FlatModel,
        policy: FailurePolicy,
        report: &mut PassReport,
    ) -> Result<(), ConvertError> {
        for idx in kernel_indices(model) {
            let tensor = &model.tensors[idx];
            let Some(data) = tensor.data.as_deref() else {
                continue;
            };
            if tensor.dtype != DType::F32 {
                debug!(
                    "default: kernel '{}' is {}, not quantized",
                    tensor.name, tensor.dtype
                );
                continue;
            }

            match quantize_i8(&f32_values(data)) {
                Ok((values, params)) => {
                    let tensor = &mut model.tensors[idx];
                    tensor.data = Some(values.iter().map(|&q| q as u8).collect());
                    tensor.dtype = DType::I8;
                    tensor.quantization = Some(params);
                    debug!(
                        "default: quantized '{}' (scale {}, zero point {})",
                        tensor.name, params.scale, params.zero_point
                    );
                    report.quantized.push(tensor.name.clone());
                }
                Err(e) => report.tensor_failed(policy, self.kind(), tensor, e.to_string())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flat_model::{FlatTensor, FusedActivation, Operator};
    use tensor_core::{QuantParams, Shape};

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn dense(kernel: &[f32]) -> FlatModel {
        FlatModel {
            name: "m".into(),
            producer: "test".into(),
            tensors: vec![
                FlatTensor::activation("x", Shape::matrix(1, 2)),
                FlatTensor {
                    name: "fc/kernel".into(),
                    shape: Shape::matrix(2, 2),
                    dtype: DType::F32,
                    data: Some(f32_bytes(kernel)),
                    quantization: None,
                },
                FlatTensor {
                    name: "fc/bias".into(),
                    shape: Shape::vector(2),
                    dtype: DType::F32,
                    data: Some(f32_bytes(&[0.5, -0.5])),
                    quantization: None,
                },
                FlatTensor::activation("y", Shape::matrix(1, 2)),
            ],
            operators: vec![Operator {
                op: Op::FullyConnected {
                    fused_activation: FusedActivation::None,
                },
                inputs: vec![0, 1, 2],
                outputs: vec![3],
            }],
            inputs: vec![0],
            outputs: vec![3],
        }
    }

    #[test]
    fn test_quantizes_kernel_only() {
        let mut model = dense(&[-1.0, 0.0, 0.5, 1.0]);
        let mut report = PassReport::default();
        DynamicRangeQuantization
            .run(&mut model, FailurePolicy::Strict, &mut report)
            .unwrap();
        model.validate().unwrap();

        let kernel = &model.tensors[1];
        assert_eq!(kernel.dtype, DType::I8);
        assert_eq!(kernel.shape, Shape::matrix(2, 2));
        let params = kernel.quantization.unwrap();
        assert_eq!(params, QuantParams::from_range(-1.0, 1.0).unwrap());
        assert_eq!(kernel.data.as_ref().unwrap().len(), 4);
        assert_eq!(model.tensors[2].dtype, DType::F32);
        assert_eq!(report.quantized, vec!["fc/kernel".to_string()]);
    }

    #[test]
    fn test_all_zero_kernel_strict() {
        let mut model = dense(&[0.0; 4]);
        let err = DynamicRangeQuantization
            .run(&mut model, FailurePolicy::Strict, &mut PassReport::default())
            .unwrap_err();
        match err {
            ConvertError::Optimization { tensor, kind, .. } => {
                assert_eq!(tensor, "fc/kernel");
                assert_eq!(kind, OptimizationKind::Default);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_all_zero_kernel_lenient() {
        let mut model = dense(&[0.0; 4]);
        let before = model.clone();
        let mut report = PassReport::default();
        DynamicRangeQuantization
            .run(&mut model, FailurePolicy::Lenient, &mut report)
            .unwrap();
        assert_eq!(model, before);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].tensor, "fc/kernel");
    }

    #[test]
    fn test_non_finite_kernel_rejected() {
        let mut model = dense(&[1.0, f32::INFINITY, 0.0, 2.0]);
        assert!(DynamicRangeQuantization
            .run(&mut model, FailurePolicy::Strict, &mut PassReport::default())
            .is_err());
    }

    #[test]
    fn test_half_kernel_left_alone() {
        let mut model = dense(&[1.0, 2.0, 3.0, 4.0]);
        model.tensors[1].dtype = DType::F16;
        model.tensors[1].data = Some(vec![0; 8]);
        let mut report = PassReport::default();
        DynamicRangeQuantization
            .run(&mut model, FailurePolicy::Strict, &mut report)
            .unwrap();
        assert_eq!(model.tensors[1].dtype, DType::F16);
        assert!(report.quantized.is_empty());
    }
}
