// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the conversion pipeline.

use std::fmt;
use std::path::PathBuf;

use converter::{ConvertError, OptimizationKind};
use flat_model::{FormatError, WriteError};
use model_ir::ModelError;
use verifier::VerifyError;

/// A stage of the conversion pipeline.
///
/// ```text
/// Idle → Loading → Converting → Serializing → Done
/// ```
/// `Verifying` is entered only by the optional read-back check after
/// `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Loading,
    Converting,
    Serializing,
    Done,
    Verifying,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Converting => "converting",
            Self::Serializing => "serializing",
            Self::Done => "done",
            Self::Verifying => "verifying",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can end a conversion.
///
/// Every error is terminal: the pipeline never retries or resumes.
/// [`ConversionError::stage`] names the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The source model could not be loaded.
    #[error("load failed: {0}")]
    Load(#[from] ModelError),

    /// A source layer has no destination lowering.
    #[error("layer '{layer}': operation '{op}' is not supported by the destination format")]
    UnsupportedOperation { layer: String, op: String },

    /// An optimization pass failed on a tensor under the strict policy.
    #[error("{kind} optimization failed on tensor '{tensor}': {reason}")]
    Optimization {
        tensor: String,
        kind: OptimizationKind,
        reason: String,
    },

    /// The converted model could not be written.
    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    /// The conversion engine violated one of its own invariants.
    #[error("internal error: {0}")]
    Internal(String),

    /// A configuration or batch job file is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Two jobs in one batch write to the same destination.
    #[error("destination '{}' is used by more than one job", path.display())]
    DuplicateDestination { path: PathBuf },

    /// A written model could not be read back.
    #[error("cannot read converted model: {0}")]
    ReadBack(#[from] FormatError),

    /// Reference evaluation failed during verification.
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
}

impl ConversionError {
    /// The pipeline stage in which this error was raised.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Config(_) | Self::DuplicateDestination { .. } => PipelineStage::Idle,
            Self::Load(_) => PipelineStage::Loading,
            Self::UnsupportedOperation { .. } | Self::Optimization { .. } | Self::Internal(_) => {
                PipelineStage::Converting
            }
            Self::Write(_) => PipelineStage::Serializing,
            Self::ReadBack(_) | Self::Verify(_) => PipelineStage::Verifying,
        }
    }
}

impl From<ConvertError> for ConversionError {
    fn from(e: ConvertError) -> Self {
        match e {
            ConvertError::UnsupportedOperation { layer, op } => {
                Self::UnsupportedOperation { layer, op }
            }
            ConvertError::Optimization {
                tensor,
                kind,
                reason,
            } => Self::Optimization {
                tensor,
                kind,
                reason,
            },
            ConvertError::Config(detail) => Self::Config(detail),
            internal => Self::Internal(internal.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_errors_keep_their_stage() {
        let unsupported: ConversionError = ConvertError::UnsupportedOperation {
            layer: "rnn".into(),
            op: "lstm".into(),
        }
        .into();
        assert!(matches!(
            unsupported,
            ConversionError::UnsupportedOperation { ref op, .. } if op == "lstm"
        ));
        assert_eq!(unsupported.stage(), PipelineStage::Converting);

        let internal: ConversionError =
            ConvertError::SignatureMismatch("output renamed".into()).into();
        assert!(matches!(internal, ConversionError::Internal(ref m) if m.contains("output renamed")));
        assert_eq!(internal.stage(), PipelineStage::Converting);
    }

    #[test]
    fn test_stage_of_io_errors() {
        let load = ConversionError::from(ModelError::NotFound {
            path: PathBuf::from("/nowhere"),
        });
        assert_eq!(load.stage(), PipelineStage::Loading);

        let write = ConversionError::from(WriteError::MissingParent {
            path: PathBuf::from("/nowhere"),
        });
        assert_eq!(write.stage(), PipelineStage::Serializing);
        assert_eq!(write.stage().to_string(), "serializing");
    }
}
