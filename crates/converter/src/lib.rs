// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # converter
//!
//! The conversion engine. Takes a validated [`model_ir::SourceModel`],
//! lowers it to EdgeFlat operators, applies the configured
//! [`OptimizationPass`]es and encodes the result.
//!
//! - [`ConversionConfig`]: requested passes, failure policy and target,
//!   loadable from TOML.
//! - [`convert`]: the engine entry point, producing a [`ConvertedModel`].
//! - [`passes`]: activation fusion, int8 weight quantization and f16
//!   re-encoding.
//!
//! # Example
//! ```no_run
//! use converter::{convert, ConversionConfig, FailurePolicy, OptimizationKind};
//! use model_ir::ModelLoader;
//! use std::path::Path;
//!
//! let source = ModelLoader::load(Path::new("./models/mri_classifier")).unwrap();
//! let config = ConversionConfig::new(FailurePolicy::Strict)
//!     .with_optimization(OptimizationKind::Default);
//! let converted = convert(&source, &config).unwrap();
//! println!("{} bytes, digest {}", converted.size_bytes(), converted.digest());
//! ```

mod config;
mod engine;
mod error;
mod lowering;
pub mod passes;
mod validate;

pub use config::{
    ConversionConfig, FailurePolicy, OptimizationKind, PolicyOverrides, TargetFormat,
};
pub use engine::{convert, ConvertedModel};
pub use error::ConvertError;
pub use passes::{OptimizationPass, PassReport, SkippedTensor};
pub use validate::flat_signature;
