// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Running conversions from async code.
//!
//! A conversion is CPU- and file-bound, so each one runs on tokio's blocking
//! pool. Jobs share nothing; a failed job does not affect the others.
//! Dropping the returned future is the only cancellation.

use std::path::PathBuf;

use converter::ConversionConfig;
use tokio::task::JoinError;
use tracing::info;

use crate::{convert_file, BatchConfig, ConversionError, ConversionReport};

/// Runs [`convert_file`] on the blocking pool.
pub async fn convert_file_async(
    source: PathBuf,
    destination: PathBuf,
    config: ConversionConfig,
) -> Result<ConversionReport, ConversionError> {
    tokio::task::spawn_blocking(move || convert_file(&source, &destination, &config))
        .await
        .map_err(join_failed)?
}

/// Converts every job of `batch` concurrently.
///
/// Returns one result per job, in job order. The batch itself fails only
/// when two jobs share a destination, before any job starts.
pub async fn convert_batch(
    batch: &BatchConfig,
) -> Result<Vec<Result<ConversionReport, ConversionError>>, ConversionError> {
    batch.check_destinations()?;
    info!("converting batch of {} jobs", batch.jobs.len());

    let handles: Vec<_> = batch
        .jobs
        .iter()
        .map(|job| {
            tokio::spawn(convert_file_async(
                job.source.clone(),
                job.destination.clone(),
                batch.config_for(job).clone(),
            ))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or_else(|e| Err(join_failed(e))));
    }

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    info!("batch finished: {succeeded}/{} succeeded", results.len());
    Ok(results)
}

fn join_failed(e: JoinError) -> ConversionError {
    ConversionError::Internal(format!("conversion task did not complete: {e}"))
}
