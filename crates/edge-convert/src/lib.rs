// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # edge-convert
//!
//! The pipeline that turns a trained model into an EdgeFlat file.
//!
//! The pipeline takes:
//! - A source model path, loaded by `model-ir`.
//! - A [`converter::ConversionConfig`] naming the optimization passes and
//!   the failure policy.
//! - A destination path, written atomically by `flat-model`.
//!
//! And returns a [`ConversionReport`] describing what was done.
//!
//! # Type-State Pipeline
//! ```text
//! Pipeline<Idle> → Pipeline<Loaded> → Pipeline<Converted> → ConversionReport
//! ```
//! Transitions are compile-time checked. [`convert_file`] runs all three.
//!
//! # Async Execution
//! [`convert_batch`] and [`convert_file_async`] run conversions on tokio's
//! blocking pool, one task per job.

mod batch;
mod config;
mod error;
mod pipeline;
mod report;

pub use batch::{convert_batch, convert_file_async};
pub use config::{BatchConfig, JobSpec};
pub use error::{ConversionError, PipelineStage};
pub use pipeline::{
    convert_file, save, verify_conversion, Converted, Idle, Loaded, Pipeline, PipelineState,
};
pub use report::{ConversionReport, StageTimings};
