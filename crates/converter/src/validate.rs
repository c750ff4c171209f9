// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Post-conversion checks of the destination graph against its source.

use flat_model::FlatModel;
use model_ir::{Signature, SourceModel, TensorSpec, Validated};

use crate::ConvertError;

/// Reads the input/output signature of an EdgeFlat model.
///
/// Indices must be in bounds; call after [`FlatModel::validate`].
pub fn flat_signature(flat: &FlatModel) -> Signature {
    let spec = |&i: &usize| {
        let t = &flat.tensors[i];
        TensorSpec {
            name: t.name.clone(),
            shape: t.shape.clone(),
            dtype: t.dtype,
        }
    };
    Signature {
        inputs: flat.inputs.iter().map(spec).collect(),
        outputs: flat.outputs.iter().map(spec).collect(),
    }
}

/// Checks that `flat` is structurally valid, keeps the source signature and
/// carries every source weight with its name and shape.
pub(crate) fn check(source: &SourceModel<Validated>, flat: &FlatModel) -> Result<(), ConvertError> {
    flat.validate()?;

    let actual = flat_signature(flat);
    let expected = source.signature();
    if &actual != expected {
        return Err(ConvertError::SignatureMismatch(format!(
            "expected inputs [{}] outputs [{}], found inputs [{}] outputs [{}]",
            join(&expected.inputs),
            join(&expected.outputs),
            join(&actual.inputs),
            join(&actual.outputs),
        )));
    }
    if let Some(&i) = flat
        .inputs
        .iter()
        .chain(&flat.outputs)
        .find(|&&i| flat.tensors[i].is_constant())
    {
        return Err(ConvertError::SignatureMismatch(format!(
            "signature tensor '{}' is a constant",
            flat.tensors[i].name
        )));
    }

    for (name, weight) in source.weights() {
        let Some(t) = flat.tensor(name).filter(|t| t.is_constant()) else {
            return Err(ConvertError::WeightMismatch(format!(
                "source weight '{name}' has no destination constant"
            )));
        };
        if &t.shape != weight.shape() {
            return Err(ConvertError::WeightMismatch(format!(
                "weight '{name}' changed shape from {} to {}",
                weight.shape(),
                t.shape
            )));
        }
    }
    Ok(())
}

fn join(specs: &[TensorSpec]) -> String {
    specs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
