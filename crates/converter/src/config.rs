// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! optimizations = ["fuse_activations", "default"]
//! failure_policy = "strict"
//! target = "edge-flat"
//!
//! [policy_overrides]
//! float16 = "lenient"
//! ```
//!
//! `failure_policy` has no default and must always be written out.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConvertError;

/// An optimization pass that can be requested.
///
/// The declaration order is the execution order; a `BTreeSet` of kinds
/// therefore always iterates in pass order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    /// Fold standalone activations into the preceding dense/conv operator.
    FuseActivations,
    /// Dynamic-range int8 quantization of dense/conv kernels.
    Default,
    /// Convert remaining f32 constants to f16.
    Float16,
}

impl OptimizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FuseActivations => "fuse_activations",
            Self::Default => "default",
            Self::Float16 => "float16",
        }
    }
}

impl fmt::Display for OptimizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a pass does when it cannot process a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the conversion with [`ConvertError::Optimization`].
    Strict,
    /// Leave the tensor unchanged, warn, and record it in the pass report.
    Lenient,
}

/// Destination format identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetFormat {
    /// EdgeFlat, major version 1.
    #[default]
    #[serde(rename = "edge-flat")]
    EdgeFlat,
}

/// Per-pass overrides of the global failure policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuse_activations: Option<FailurePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FailurePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float16: Option<FailurePolicy>,
}

impl PolicyOverrides {
    fn get(&self, kind: OptimizationKind) -> Option<FailurePolicy> {
        match kind {
            OptimizationKind::FuseActivations => self.fuse_activations,
            OptimizationKind::Default => self.default,
            OptimizationKind::Float16 => self.float16,
        }
    }

    fn slot(&mut self, kind: OptimizationKind) -> &mut Option<FailurePolicy> {
        match kind {
            OptimizationKind::FuseActivations => &mut self.fuse_activations,
            OptimizationKind::Default => &mut self.default,
            OptimizationKind::Float16 => &mut self.float16,
        }
    }
}

/// Configuration for one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionConfig {
    /// Requested passes; empty means plain lowering.
    #[serde(default)]
    pub optimizations: BTreeSet<OptimizationKind>,
    /// Policy applied when a pass fails on a tensor.
    pub failure_policy: FailurePolicy,
    /// Destination format.
    #[serde(default)]
    pub target: TargetFormat,
    /// Per-pass policy overrides.
    #[serde(default)]
    pub policy_overrides: PolicyOverrides,
}

impl ConversionConfig {
    /// A configuration with no optimizations and the given failure policy.
    pub fn new(failure_policy: FailurePolicy) -> Self {
        Self {
            optimizations: BTreeSet::new(),
            failure_policy,
            target: TargetFormat::EdgeFlat,
            policy_overrides: PolicyOverrides::default(),
        }
    }

    /// Adds an optimization pass.
    pub fn with_optimization(mut self, kind: OptimizationKind) -> Self {
        self.optimizations.insert(kind);
        self
    }

    /// Overrides the failure policy of one pass.
    pub fn with_policy_override(mut self, kind: OptimizationKind, policy: FailurePolicy) -> Self {
        *self.policy_overrides.slot(kind) = Some(policy);
        self
    }

    /// Effective failure policy for `kind`.
    pub fn policy_for(&self, kind: OptimizationKind) -> FailurePolicy {
        self.policy_overrides
            .get(kind)
            .unwrap_or(self.failure_policy)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConvertError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConvertError> {
        toml::from_str(toml_str)
            .map_err(|e| ConvertError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConvertError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("TOML serialise error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let toml = r#"
optimizations = ["float16", "default"]
failure_policy = "strict"
target = "edge-flat"

[policy_overrides]
float16 = "lenient"
"#;
        let c = ConversionConfig::from_toml(toml).unwrap();
        let order: Vec<_> = c.optimizations.iter().copied().collect();
        assert_eq!(order, vec![OptimizationKind::Default, OptimizationKind::Float16]);
        assert_eq!(c.target, TargetFormat::EdgeFlat);
        assert_eq!(c.policy_for(OptimizationKind::Default), FailurePolicy::Strict);
        assert_eq!(c.policy_for(OptimizationKind::Float16), FailurePolicy::Lenient);
    }

    #[test]
    fn test_failure_policy_is_required() {
        let err = ConversionConfig::from_toml("optimizations = [\"default\"]\n").unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
    }

    #[test]
    fn test_unknown_optimization_rejected() {
        let toml = "optimizations = [\"prune\"]\nfailure_policy = \"strict\"\n";
        assert!(ConversionConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let toml = "failure_policy = \"strict\"\ntarget = \"onnx\"\n";
        assert!(ConversionConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_minimal_config() {
        let c = ConversionConfig::from_toml("failure_policy = \"lenient\"\n").unwrap();
        assert_eq!(c, ConversionConfig::new(FailurePolicy::Lenient));
        assert!(c.optimizations.is_empty());
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = ConversionConfig::new(FailurePolicy::Strict)
            .with_optimization(OptimizationKind::Float16)
            .with_optimization(OptimizationKind::FuseActivations)
            .with_policy_override(OptimizationKind::Float16, FailurePolicy::Lenient);
        let toml = c.to_toml().unwrap();
        assert!(toml.contains("edge-flat"));
        assert_eq!(ConversionConfig::from_toml(&toml).unwrap(), c);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convert.toml");
        std::fs::write(&path, "failure_policy = \"strict\"\noptimizations = [\"default\"]\n")
            .unwrap();
        let c = ConversionConfig::from_file(&path).unwrap();
        assert!(c.optimizations.contains(&OptimizationKind::Default));
        assert!(ConversionConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
