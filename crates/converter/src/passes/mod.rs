// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`OptimizationPass`] trait and pass implementations.

pub mod float16;
pub mod fuse;
pub mod quantize;

pub use float16::Float16;
pub use fuse::FuseActivations;
pub use quantize::DynamicRangeQuantization;

use flat_model::{FlatModel, FlatTensor};
use tracing::warn;

use crate::{ConvertError, FailurePolicy, OptimizationKind};

/// A transformation of a lowered EdgeFlat graph.
///
/// Passes are purely in-memory and deterministic: the same graph and
/// policy always produce the same result.
pub trait OptimizationPass: Send + Sync {
    /// The configuration kind that selects this pass.
    fn kind(&self) -> OptimizationKind;

    /// Applies the pass to `model`, recording its effects in `report`.
    fn run(
        &self,
        model: &mut FlatModel,
        policy: FailurePolicy,
        report: &mut PassReport,
    ) -> Result<(), ConvertError>;
}

/// Creates the pass for `kind`.
pub fn create_pass(kind: OptimizationKind) -> Box<dyn OptimizationPass> {
    match kind {
        OptimizationKind::FuseActivations => Box::new(FuseActivations),
        OptimizationKind::Default => Box::new(DynamicRangeQuantization),
        OptimizationKind::Float16 => Box::new(Float16),
    }
}

/// A tensor a lenient pass left unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SkippedTensor {
    pub tensor: String,
    pub kind: OptimizationKind,
    pub reason: String,
}

/// What the optimization passes did.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PassReport {
    /// Passes that ran, in execution order.
    pub applied: Vec<OptimizationKind>,
    /// Output tensors of operators that absorbed an activation.
    pub fused: Vec<String>,
    /// Constants re-encoded as int8.
    pub quantized: Vec<String>,
    /// Constants re-encoded as f16.
    pub float16: Vec<String>,
    /// Tensors left unchanged under the lenient policy.
    pub skipped: Vec<SkippedTensor>,
}

impl PassReport {
    /// Routes a per-tensor failure through `policy`.
    ///
    /// Strict turns it into [`ConvertError::Optimization`]; lenient logs a
    /// warning and records the tensor as skipped.
    pub(crate) fn tensor_failed(
        &mut self,
        policy: FailurePolicy,
        kind: OptimizationKind,
        tensor: &FlatTensor,
        reason: String,
    ) -> Result<(), ConvertError> {
        match policy {
            FailurePolicy::Strict => Err(ConvertError::Optimization {
                tensor: tensor.name.clone(),
                kind,
                reason,
            }),
            FailurePolicy::Lenient => {
                warn!(
                    "{kind}: leaving tensor '{}' unchanged: {reason}",
                    tensor.name
                );
                self.skipped.push(SkippedTensor {
                    tensor: tensor.name.clone(),
                    kind,
                    reason,
                });
                Ok(())
            }
        }
    }
}

/// Decodes a little-endian f32 constant buffer.
pub(crate) fn f32_values(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
