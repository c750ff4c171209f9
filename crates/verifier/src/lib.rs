// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # verifier
//!
//! Reference evaluation used to check that a conversion preserved behavior.
//!
//! - [`SourceEvaluator`]: runs a source graph layer by layer.
//! - [`FlatEvaluator`]: runs a decoded EdgeFlat model, expanding int8 and
//!   f16 constants back to `f32`.
//! - [`sample_inputs`]: deterministic inputs for a signature.
//! - [`check_parity`]: compares the two on sample inputs.
//!
//! These evaluators favour clarity over speed and are not an inference
//! runtime.

mod error;
mod flat_eval;
mod parity;
mod source_eval;
mod value;

pub use error::VerifyError;
pub use flat_eval::FlatEvaluator;
pub use parity::{check_parity, OutputParity, ParityReport, SAMPLE_ROUNDS};
pub use source_eval::SourceEvaluator;
pub use value::{sample_inputs, Value, Values};
