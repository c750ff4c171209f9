// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Batch job files loaded from TOML or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! [defaults]
//! optimizations = ["default"]
//! failure_policy = "strict"
//!
//! [[jobs]]
//! source = "./models/mri_classifier"
//! destination = "./out/mri_classifier.eflat"
//!
//! [[jobs]]
//! source = "./models/ecg.safetensors"
//! destination = "./out/ecg.eflat"
//! [jobs.config]
//! optimizations = ["float16"]
//! failure_policy = "lenient"
//! ```

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use converter::ConversionConfig;

use crate::ConversionError;

/// One conversion in a batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Source model file or directory.
    pub source: PathBuf,
    /// Where the EdgeFlat file is written.
    pub destination: PathBuf,
    /// Replaces the batch defaults for this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConversionConfig>,
}

impl JobSpec {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            config: None,
        }
    }

    /// Uses `config` instead of the batch defaults.
    pub fn with_config(mut self, config: ConversionConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// A set of independent conversions sharing default settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Settings for jobs without their own `config`.
    pub defaults: ConversionConfig,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

impl BatchConfig {
    pub fn new(defaults: ConversionConfig) -> Self {
        Self {
            defaults,
            jobs: Vec::new(),
        }
    }

    pub fn with_job(mut self, job: JobSpec) -> Self {
        self.jobs.push(job);
        self
    }

    /// Loads a batch from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConversionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConversionError::Config(format!("cannot read batch file '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses a batch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConversionError> {
        toml::from_str(toml_str)
            .map_err(|e| ConversionError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises the batch to TOML.
    pub fn to_toml(&self) -> Result<String, ConversionError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConversionError::Config(format!("TOML serialise error: {e}")))
    }

    /// The configuration `job` runs with.
    pub fn config_for<'a>(&'a self, job: &'a JobSpec) -> &'a ConversionConfig {
        job.config.as_ref().unwrap_or(&self.defaults)
    }

    /// Rejects batches in which two jobs write to the same destination.
    ///
    /// Paths are compared lexically after dropping `.` components; links and
    /// relative-versus-absolute spellings of one file are not detected.
    pub fn check_destinations(&self) -> Result<(), ConversionError> {
        let mut seen = BTreeSet::new();
        for job in &self.jobs {
            let key = normalize(&job.destination);
            if !seen.insert(key) {
                return Err(ConversionError::DuplicateDestination {
                    path: job.destination.clone(),
                });
            }
        }
        Ok(())
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
