// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Evaluated tensors and deterministic sample inputs.

use std::collections::BTreeMap;

use model_ir::Signature;
use tensor_core::Shape;

/// A dense `f32` tensor produced or consumed by an evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub shape: Shape,
    pub data: Vec<f32>,
}

impl Value {
    pub fn new(shape: Shape, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Largest absolute element, or `0.0` for an empty tensor.
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }
}

/// Named values, ordered by name.
pub type Values = BTreeMap<String, Value>;

/// Builds one input per signature entry, filled with values in `[-1, 1)`
/// drawn from a SplitMix64 stream seeded by `seed`.
///
/// The same signature and seed always give the same values.
pub fn sample_inputs(signature: &Signature, seed: u64) -> Values {
    let mut state = seed;
    signature
        .inputs
        .iter()
        .map(|spec| {
            let data = (0..spec.shape.num_elements())
                .map(|_| unit(splitmix64(&mut state)))
                .collect();
            (spec.name.clone(), Value::new(spec.shape.clone(), data))
        })
        .collect()
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Maps the top 24 bits to `[-1, 1)`.
fn unit(bits: u64) -> f32 {
    ((bits >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
}
