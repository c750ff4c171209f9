// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Half-precision re-encoding of every remaining `F32` constant.

use flat_model::FlatModel;
use tensor_core::{encode_f16, DType};
use tracing::debug;

use super::{f32_values, OptimizationPass, PassReport};
use crate::{ConvertError, FailurePolicy, OptimizationKind};

#[derive(Debug, Clone, Default)]
pub struct Float16;

impl OptimizationPass for Float16 {
    fn kind(&self) -> OptimizationKind {
        OptimizationKind::Float16
    }

    fn run(
        &self,
        model: &mut FlatModel,
        policy: FailurePolicy,
        report: &mut PassReport,
    ) -> Result<(), ConvertError> {
        for idx in 0..model.tensors.len() {
            let tensor = &model.tensors[idx];
            let Some(data) = tensor.data.as_deref() else {
                continue;
            };
            if tensor.dtype != DType::F32 {
                continue;
            }
            match encode_f16(&f32_values(data)) {
                Ok(bytes) => {
                    let tensor = &mut model.tensors[idx];
                    tensor.data = Some(bytes);
                    tensor.dtype = DType::F16;
                    debug!("float16: converted '{}'", tensor.name);
                    report.float16.push(tensor.name.clone());
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
    use flat_model::FlatTensor;
    use tensor_core::{QuantParams, Shape};

    fn constant(name: &str, values: &[f32]) -> FlatTensor {
        FlatTensor {
            name: name.into(),
            shape: Shape::vector(values.len()),
            dtype: DType::F32,
            data: Some(values.iter().flat_map(|v| v.to_le_bytes()).collect()),
            quantization: None,
        }
    }

    fn model(tensors: Vec<FlatTensor>) -> FlatModel {
        FlatModel {
            name: "m".into(),
            producer: "test".into(),
            tensors,
            operators: vec![],
            inputs: vec![],
            outputs: vec![],
        }
    }

    #[test]
    fn test_converts_f32_constants() {
        let mut m = model(vec![
            FlatTensor::activation("x", Shape::vector(2)),
            constant("w", &[1.0, -2.5]),
            FlatTensor {
                name: "q".into(),
                shape: Shape::vector(1),
                dtype: DType::I8,
                data: Some(vec![3]),
                quantization: Some(QuantParams {
                    scale: 0.1,
                    zero_point: 0,
                }),
            },
        ]);
        let mut report = PassReport::default();
        Float16.run(&mut m, FailurePolicy::Strict, &mut report).unwrap();
        m.validate().unwrap();

        assert_eq!(m.tensors[0].dtype, DType::F32);
        assert_eq!(m.tensors[1].dtype, DType::F16);
        let expected: Vec<u8> = [1.0f32, -2.5]
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
            .collect();
        assert_eq!(m.tensors[1].data.as_deref(), Some(&expected[..]));
        assert_eq!(m.tensors[2].dtype, DType::I8);
        assert_eq!(report.float16, vec!["w".to_string()]);
    }

    #[test]
    fn test_overflow_strict_and_lenient() {
        let mut strict = model(vec![constant("big", &[1.0e6])]);
        let err = Float16
            .run(&mut strict, FailurePolicy::Strict, &mut PassReport::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Optimization {
                kind: OptimizationKind::Float16,
                ..
            }
        ));

        let mut lenient = model(vec![constant("big", &[1.0e6]), constant("ok", &[0.25])]);
        let mut report = PassReport::default();
        Float16
            .run(&mut lenient, FailurePolicy::Lenient, &mut report)
            .unwrap();
        assert_eq!(lenient.tensors[0].dtype, DType::F32);
        assert_eq!(lenient.tensors[1].dtype, DType::F16);
        assert_eq!(report.skipped[0].tensor, "big");
    }
}
