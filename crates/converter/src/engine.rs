// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The conversion entry point: lower, optimize, validate, encode.

use flat_model::{FlatModel, Header};
use model_ir::{SourceModel, Validated};
use tracing::info;

use crate::passes::{create_pass, PassReport};
use crate::{lowering, validate, ConversionConfig, ConvertError, TargetFormat};

/// The result of a successful conversion.
///
/// Holds the destination graph, its encoded bytes and the hex SHA-256
/// content digest stored in the header. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConvertedModel {
    model: FlatModel,
    bytes: Vec<u8>,
    digest: String,
    report: PassReport,
}

impl ConvertedModel {
    /// The destination graph.
    pub fn model(&self) -> &FlatModel {
        &self.model
    }

    /// Encoded EdgeFlat bytes, ready to be written.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex content digest of the graph and data sections.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn report(&self) -> &PassReport {
        &self.report
    }

    /// Size of the encoded model in bytes.
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Consumes the model, returning its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Converts a validated source model according to `config`.
///
/// Steps:
/// 1. Lower every layer to destination operators.
/// 2. Run the configured passes in their fixed order.
/// 3. Check the signature and weights against the source.
/// 4. Encode to EdgeFlat bytes.
///
/// # Errors
/// [`ConvertError::UnsupportedOperation`] for layers without a lowering,
/// [`ConvertError::Optimization`] when a strict pass fails on a tensor, and
/// the internal variants ([`ConvertError::is_internal`]) for engine bugs.
pub fn convert(
    source: &SourceModel<Validated>,
    config: &ConversionConfig,
) -> Result<ConvertedModel, ConvertError> {
    match config.target {
        TargetFormat::EdgeFlat => {}
    }
    let requested: Vec<&str> = config.optimizations.iter().map(|k| k.as_str()).collect();
    info!(
        "converting '{}' ({} layers) with optimizations [{}]",
        source.name(),
        source.num_layers(),
        requested.join(", ")
    );

    let mut model = lowering::lower(source)?;
    let mut report = PassReport::default();
    for &kind in &config.optimizations {
        create_pass(kind).run(&mut model, config.policy_for(kind), &mut report)?;
        report.applied.push(kind);
    }
    validate::check(source, &model)?;

    let bytes = flat_model::encode(&model)?;
    let digest = Header::parse(&bytes)?.digest_hex();
    info!(
        "converted '{}': {} operators, {} tensors ({} int8, {} f16, {} fused, {} skipped), {} bytes",
        model.name,
        model.operators.len(),
        model.tensors.len(),
        report.quantized.len(),
        report.float16.len(),
        report.fused.len(),
        report.skipped.len(),
        bytes.len()
    );

    Ok(ConvertedModel {
        model,
        bytes,
        digest,
        report,
    })
}
