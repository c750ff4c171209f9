// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Numeric parity between a source model and its converted form.

use flat_model::FlatModel;
use model_ir::{SourceModel, Validated};
use tracing::{debug, info, warn};

use crate::value::sample_inputs;
use crate::{FlatEvaluator, SourceEvaluator, VerifyError};

/// Number of sample batches evaluated by [`check_parity`].
pub const SAMPLE_ROUNDS: u64 = 4;

/// Worst-case disagreement observed on one output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputParity {
    pub name: String,
    /// Largest element-wise absolute difference.
    pub max_abs_error: f32,
    /// Largest absolute reference value, the scale errors are relative to.
    pub reference_magnitude: f32,
    /// `max_abs_error / reference_magnitude` (or the absolute error when the
    /// reference is all zeros).
    pub relative_error: f32,
}

/// Result of [`check_parity`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParityReport {
    pub tolerance: f32,
    pub rounds: u64,
    pub outputs: Vec<OutputParity>,
}

impl ParityReport {
    /// The largest relative error over all outputs.
    pub fn worst_relative_error(&self) -> f32 {
        self.outputs
            .iter()
            .fold(0.0f32, |m, o| m.max(o.relative_error))
    }

    /// `true` when every output is within tolerance.
    pub fn passed(&self) -> bool {
        self.outputs
            .iter()
            .all(|o| o.relative_error <= self.tolerance)
    }
}

/// Evaluates `source` and `flat` on [`SAMPLE_ROUNDS`] deterministic sample
/// batches and reports, per output, the worst error relative to the output
/// magnitude.
///
/// # Errors
/// [`VerifyError::SignatureMismatch`] when the output names differ, and any
/// evaluation error of either model. A result outside `tolerance` is not an
/// error; inspect [`ParityReport::passed`].
pub fn check_parity(
    source: &SourceModel<Validated>,
    flat: &FlatModel,
    tolerance: f32,
) -> Result<ParityReport, VerifyError> {
    let reference = SourceEvaluator::new(source)?;
    let candidate = FlatEvaluator::new(flat)?;

    let mut outputs: Vec<OutputParity> = source
        .signature()
        .outputs
        .iter()
        .map(|spec| OutputParity {
            name: spec.name.clone(),
            max_abs_error: 0.0,
            reference_magnitude: 0.0,
            relative_error: 0.0,
        })
        .collect();

    for seed in 0..SAMPLE_ROUNDS {
        let inputs = sample_inputs(source.signature(), seed);
        let expected = reference.evaluate(&inputs)?;
        let actual = candidate.evaluate(&inputs)?;
        for parity in &mut outputs {
            let (Some(e), Some(a)) = (expected.get(&parity.name), actual.get(&parity.name)) else {
                return Err(VerifyError::SignatureMismatch(format!(
                    "output '{}' is missing from one of the models",
                    parity.name
                )));
            };
            if e.shape != a.shape {
                return Err(VerifyError::SignatureMismatch(format!(
                    "output '{}' has shape {} in the source and {} after conversion",
                    parity.name, e.shape, a.shape
                )));
            }
            let err = e
                .data
                .iter()
                .zip(&a.data)
                .fold(0.0f32, |m, (x, y)| m.max((x - y).abs()));
            parity.max_abs_error = parity.max_abs_error.max(err);
            parity.reference_magnitude = parity.reference_magnitude.max(e.max_abs());
        }
        debug!("parity round {seed} evaluated");
    }

    for parity in &mut outputs {
        parity.relative_error = if parity.reference_magnitude > 0.0 {
            parity.max_abs_error / parity.reference_magnitude
        } else {
            parity.max_abs_error
        };
    }

    let report = ParityReport {
        tolerance,
        rounds: SAMPLE_ROUNDS,
        outputs,
    };
    if report.passed() {
        info!(
            "parity check passed: worst relative error {:.3e} (tolerance {tolerance})",
            report.worst_relative_error()
        );
    } else {
        warn!(
            "parity check failed: worst relative error {:.3e} exceeds {tolerance}",
            report.worst_relative_error()
        );
    }
    Ok(report)
}
