// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The conversion pipeline with type-state–enforced stage order.
//!
//! ```text
//! Pipeline<Idle>
//!     │  .load(source)
//!     ▼
//! Pipeline<Loaded>
//!     │  .convert()
//!     ▼
//! Pipeline<Converted>
//!     │  .save(destination)
//!     ▼
//!   ConversionReport
//! ```
//!
//! Each transition consumes the pipeline, so a stage cannot be skipped or
//! repeated. A failing transition returns a [`ConversionError`] whose
//! [`stage`](ConversionError::stage) names where it stopped; nothing is
//! written to the destination before the `Serializing` stage.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use converter::{ConversionConfig, ConvertedModel};
use model_ir::{ModelLoader, SourceModel, Validated, MANIFEST_FILE, WEIGHTS_FILE};
use tracing::{debug, info, warn};
use verifier::ParityReport;

use crate::{ConversionError, ConversionReport, PipelineStage, StageTimings};

// ── Type-state markers ─────────────────────────────────────────

/// No model is loaded yet.
#[derive(Debug)]
pub struct Idle;

/// The source model is loaded and validated.
#[derive(Debug)]
pub struct Loaded;

/// The model is converted and encoded, ready to be written.
#[derive(Debug)]
pub struct Converted;

/// Sealed trait for pipeline states.
pub trait PipelineState: std::fmt::Debug {
    /// The stage the next transition enters.
    const NEXT: PipelineStage;
}
impl PipelineState for Idle {
    const NEXT: PipelineStage = PipelineStage::Loading;
}
impl PipelineState for Loaded {
    const NEXT: PipelineStage = PipelineStage::Converting;
}
impl PipelineState for Converted {
    const NEXT: PipelineStage = PipelineStage::Serializing;
}

/// Stage data carried between transitions.
#[derive(Debug)]
struct Artifacts {
    source: SourceModel<Validated>,
    source_bytes: u64,
    converted: Option<ConvertedModel>,
}

// ── Pipeline ───────────────────────────────────────────────────

/// A single conversion: load, convert, serialize.
///
/// # Example
/// ```no_run
/// use converter::{ConversionConfig, FailurePolicy, OptimizationKind};
/// use edge_convert::Pipeline;
/// use std::path::Path;
///
/// # fn example() -> Result<(), edge_convert::ConversionError> {
/// let config = ConversionConfig::new(FailurePolicy::Strict)
///     .with_optimization(OptimizationKind::Default);
/// let report = Pipeline::new(config)
///     .load(Path::new("./models/mri_classifier"))?
///     .convert()?
///     .save(Path::new("./out/mri_classifier.eflat"))?;
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline<S: PipelineState = Idle> {
    config: ConversionConfig,
    timings: StageTimings,
    artifacts: Option<Artifacts>,
    _state: PhantomData<S>,
}

impl<S: PipelineState> Pipeline<S> {
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// The stage the next transition enters.
    pub fn next_stage(&self) -> PipelineStage {
        S::NEXT
    }

    fn advance<T: PipelineState>(self, artifacts: Artifacts) -> Pipeline<T> {
        Pipeline {
            config: self.config,
            timings: self.timings,
            artifacts: Some(artifacts),
            _state: PhantomData,
        }
    }

    fn artifacts(&self) -> Result<&Artifacts, ConversionError> {
        self.artifacts.as_ref().ok_or_else(|| missing(S::NEXT))
    }
}

// ── Idle → Loaded ──────────────────────────────────────────────

impl Pipeline<Idle> {
    /// Creates a pipeline for one conversion under `config`.
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config,
            timings: StageTimings::default(),
            artifacts: None,
            _state: PhantomData,
        }
    }

    /// Loads and validates the source model at `source` (a single file or
    /// a model directory).
    pub fn load(mut self, source: &Path) -> Result<Pipeline<Loaded>, ConversionError> {
        debug!("stage {}: {}", PipelineStage::Loading, source.display());
        let start = Instant::now();
        let model = ModelLoader::load(source).map_err(|e| failed(e.into()))?;
        self.timings.loading = start.elapsed();

        let source_bytes = artifact_size(source);
        Ok(self.advance(Artifacts {
            source: model,
            source_bytes,
            converted: None,
        }))
    }

    /// Starts from an already loaded model. The source size is taken to be
    /// its weight bytes.
    pub fn from_source(
        config: ConversionConfig,
        source: SourceModel<Validated>,
    ) -> Pipeline<Loaded> {
        let source_bytes = source.total_weight_bytes() as u64;
        Self::new(config).advance(Artifacts {
            source,
            source_bytes,
            converted: None,
        })
    }
}

// ── Loaded → Converted ─────────────────────────────────────────

impl Pipeline<Loaded> {
    pub fn source(&self) -> Result<&SourceModel<Validated>, ConversionError> {
        Ok(&self.artifacts()?.source)
    }

    /// Lowers, optimizes and encodes the loaded model.
    pub fn convert(mut self) -> Result<Pipeline<Converted>, ConversionError> {
        let mut artifacts = self
            .artifacts
            .take()
            .ok_or_else(|| missing(PipelineStage::Converting))?;
        debug!("stage {}: '{}'", PipelineStage::Converting, artifacts.source.name());
        let start = Instant::now();
        let converted =
            converter::convert(&artifacts.source, &self.config).map_err(|e| failed(e.into()))?;
        self.timings.converting = start.elapsed();

        artifacts.converted = Some(converted);
        Ok(self.advance(artifacts))
    }
}

// ── Converted → Done ───────────────────────────────────────────

impl Pipeline<Converted> {
    pub fn source(&self) -> Result<&SourceModel<Validated>, ConversionError> {
        Ok(&self.artifacts()?.source)
    }

    /// The converted model, before it is written.
    pub fn converted(&self) -> Result<&ConvertedModel, ConversionError> {
        self.artifacts()?
            .converted
            .as_ref()
            .ok_or_else(|| missing(PipelineStage::Serializing))
    }

    /// Decodes the encoded bytes and checks them against the source model on
    /// sample inputs.
    pub fn verify(&self, tolerance: f32) -> Result<ParityReport, ConversionError> {
        let source = self.source()?;
        let flat = flat_model::decode(self.converted()?.bytes())?;
        let report = verifier::check_parity(source, &flat, tolerance)?;
        Ok(report)
    }

    /// Atomically writes the converted model to `destination` and returns
    /// the conversion report.
    pub fn save(mut self, destination: &Path) -> Result<ConversionReport, ConversionError> {
        let artifacts = self
            .artifacts
            .take()
            .ok_or_else(|| missing(PipelineStage::Serializing))?;
        let converted = artifacts
            .converted
            .ok_or_else(|| missing(PipelineStage::Serializing))?;
        debug!("stage {}: {}", PipelineStage::Serializing, destination.display());

        let model_name = artifacts.source.name().to_string();
        let num_operators = converted.model().operators.len();
        let num_tensors = converted.model().tensors.len();
        let passes = converted.report().clone();
        let digest = converted.digest().to_string();

        let start = Instant::now();
        let output_bytes = save(converted, destination).map_err(failed)?;
        self.timings.serializing = start.elapsed();

        let report = ConversionReport::from_parts(
            model_name,
            destination.to_path_buf(),
            self.timings,
            artifacts.source_bytes,
            output_bytes,
            num_operators,
            num_tensors,
            &passes,
            digest,
        );
        info!("{}", report.summary());
        Ok(report)
    }
}

// ── Free functions ─────────────────────────────────────────────

/// Converts the model at `source` and writes it to `destination`.
///
/// Runs `Idle → Loading → Converting → Serializing → Done`. On failure the
/// destination is untouched: errors before `Serializing` never open it, and
/// a write failure leaves no partial file.
pub fn convert_file(
    source: &Path,
    destination: &Path,
    config: &ConversionConfig,
) -> Result<ConversionReport, ConversionError> {
    Pipeline::new(config.clone())
        .load(source)?
        .convert()?
        .save(destination)
}

/// Writes a converted model to `path`, all-or-nothing. Returns the number of
/// bytes written.
pub fn save(model: ConvertedModel, path: &Path) -> Result<u64, ConversionError> {
    let written = flat_model::ModelWriter::save(model.bytes(), path)?;
    Ok(written)
}

/// Reads back a written EdgeFlat file and checks it against its source
/// model. Parity outside `tolerance` is reported, not raised; inspect
/// [`ParityReport::passed`].
pub fn verify_conversion(
    source: &Path,
    destination: &Path,
    tolerance: f32,
) -> Result<ParityReport, ConversionError> {
    let model = ModelLoader::load(source)?;
    let flat = flat_model::read_file(destination)?;
    let report = verifier::check_parity(&model, &flat, tolerance)?;
    if report.passed() {
        info!(
            "verified {}: worst relative error {:.2e}",
            destination.display(),
            report.worst_relative_error()
        );
    } else {
        warn!(
            "{} exceeds tolerance {:.2e}: worst relative error {:.2e}",
            destination.display(),
            tolerance,
            report.worst_relative_error()
        );
    }
    Ok(report)
}

fn failed(e: ConversionError) -> ConversionError {
    warn!("conversion failed during {}: {e}", e.stage());
    e
}

fn missing(stage: PipelineStage) -> ConversionError {
    ConversionError::Internal(format!("pipeline has no model to enter the {stage} stage"))
}

/// Bytes on disk of a single-file model, or of the manifest and weights of
/// a directory model. Unreadable entries count as zero.
fn artifact_size(source: &Path) -> u64 {
    let size = |p: PathBuf| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
    if source.is_dir() {
        size(source.join(MANIFEST_FILE)) + size(source.join(WEIGHTS_FILE))
    } else {
        size(source.to_path_buf())
    }
}
