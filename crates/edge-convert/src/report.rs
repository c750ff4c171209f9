// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion reports.
//!
//! [`ConversionReport`] collects per-stage timing, artifact sizes and what
//! the optimization passes did to each tensor. It is the value returned by
//! a successful conversion.

use std::path::PathBuf;
use std::time::Duration;

use converter::{OptimizationKind, PassReport, SkippedTensor};

/// Wall-clock time spent in each pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageTimings {
    pub loading: Duration,
    pub converting: Duration,
    pub serializing: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.loading + self.converting + self.serializing
    }
}

/// Summary of one completed conversion.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConversionReport {
    /// Source model name.
    pub model_name: String,
    /// Where the EdgeFlat file was written.
    pub destination: PathBuf,
    pub timings: StageTimings,
    /// Size of the source artifact on disk (weights only for in-memory
    /// sources).
    pub source_bytes: u64,
    /// Size of the written EdgeFlat file.
    pub output_bytes: u64,
    pub num_operators: usize,
    pub num_tensors: usize,
    /// Passes that ran, in execution order.
    pub optimizations: Vec<OptimizationKind>,
    pub fused: Vec<String>,
    pub quantized: Vec<String>,
    pub float16: Vec<String>,
    /// Tensors a lenient pass left unchanged.
    pub skipped: Vec<SkippedTensor>,
    /// Hex SHA-256 content digest stored in the file header.
    pub digest: String,
}

impl ConversionReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        model_name: String,
        destination: PathBuf,
        timings: StageTimings,
        source_bytes: u64,
        output_bytes: u64,
        num_operators: usize,
        num_tensors: usize,
        passes: &PassReport,
        digest: String,
    ) -> Self {
        Self {
            model_name,
            destination,
            timings,
            source_bytes,
            output_bytes,
            num_operators,
            num_tensors,
            optimizations: passes.applied.clone(),
            fused: passes.fused.clone(),
            quantized: passes.quantized.clone(),
            float16: passes.float16.clone(),
            skipped: passes.skipped.clone(),
            digest,
        }
    }

    /// Source size over output size; above 1.0 means the output is smaller.
    pub fn compression_ratio(&self) -> f64 {
        if self.output_bytes == 0 {
            return 0.0;
        }
        self.source_bytes as f64 / self.output_bytes as f64
    }

    /// Returns a one-line human-readable summary.
    pub fn summary(&self) -> String {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        format!(
            "Converted '{}' → {}: {} ops, {} tensors ({} int8, {} f16, {} fused, {} skipped), \
             {:.1} KB → {:.1} KB ({:.2}x), load {:.2}ms, convert {:.2}ms, write {:.2}ms, \
             digest {}",
            self.model_name,
            self.destination.display(),
            self.num_operators,
            self.num_tensors,
            self.quantized.len(),
            self.float16.len(),
            self.fused.len(),
            self.skipped.len(),
            self.source_bytes as f64 / 1024.0,
            self.output_bytes as f64 / 1024.0,
            self.compression_ratio(),
            ms(self.timings.loading),
            ms(self.timings.converting),
            ms(self.timings.serializing),
            short_digest(&self.digest),
        )
    }
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ConversionReport {
        let passes = PassReport {
            applied: vec![OptimizationKind::Default],
            quantized: vec!["dense/kernel".into()],
            ..Default::default()
        };
        ConversionReport::from_parts(
            "mlp".into(),
            PathBuf::from("/tmp/mlp.eflat"),
            StageTimings {
                loading: Duration::from_millis(2),
                converting: Duration::from_millis(5),
                serializing: Duration::from_millis(1),
            },
            4096,
            1024,
            3,
            7,
            &passes,
            "0123456789abcdef0123".into(),
        )
    }

    #[test]
    fn test_compression_ratio() {
        let mut r = report();
        assert!((r.compression_ratio() - 4.0).abs() < 1e-9);
        r.output_bytes = 0;
        assert_eq!(r.compression_ratio(), 0.0);
    }

    #[test]
    fn test_timings_total() {
        assert_eq!(report().timings.total(), Duration::from_millis(8));
    }

    #[test]
    fn test_summary_format() {
        let s = report().summary();
        assert!(s.contains("Converted 'mlp'"));
        assert!(s.contains("3 ops"));
        assert!(s.contains("1 int8"));
        assert!(s.contains("4.00x"));
        assert!(s.contains("digest 0123456789ab"));
        assert!(!s.contains("0123456789abc"));
    }
}
