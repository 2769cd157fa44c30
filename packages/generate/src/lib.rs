#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for generating the postcode lookup chunks and substation
//! details served to the web client.
//!
//! A run loads every DNO boundary file and the national postcode table,
//! matches each postcode centroid to the substation boundary containing
//! it, and writes:
//!
//! - `chunks/<OUTWARD>.json`: postcode to `{substation_id, lat, lng}`
//! - `chunks_index.json`: every outward code plus a generation timestamp
//! - `substations_original.json`: substation details with full-detail
//!   boundaries
//! - `substations.json`: the same details with boundaries simplified
//!   just enough to fit under the hosting size ceiling
//!
//! Every run is a full recompute; nothing is patched incrementally.

pub mod config;
pub mod details;
pub mod diagnostics;
pub mod lookup;
pub mod output;
pub mod postpass;

use std::sync::Arc;

use substation_map_boundary::{BoundaryError, load_all_boundaries};
use substation_map_postcode::{PostcodeError, load_postcodes};
use substation_map_progress::{ProgressCallback, null_progress};
use substation_map_simplify::{SimplifyError, escalate};
use substation_map_spatial::match_postcodes;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::details::{build_details, render_details, simplify_details};
use crate::lookup::build_lookup;
use crate::output::WriteReport;

/// Errors that can abort a generation run.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// No boundaries could be loaded.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    /// No postcodes could be loaded.
    #[error(transparent)]
    Postcode(#[from] PostcodeError),

    /// Simplification could not produce any output.
    #[error(transparent)]
    Simplify(#[from] SimplifyError),

    /// JSON serialization or parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// There is no details file to work from.
    #[error("{path} not found; run the pipeline first")]
    MissingDetails {
        /// Expected location of the details file.
        path: String,
    },
}

/// Progress reporters for each long-running stage.
pub struct PipelineProgress {
    pub sources: Arc<dyn ProgressCallback>,
    pub matching: Arc<dyn ProgressCallback>,
    pub chunks: Arc<dyn ProgressCallback>,
}

impl Default for PipelineProgress {
    fn default() -> Self {
        Self {
            sources: null_progress(),
            matching: null_progress(),
            chunks: null_progress(),
        }
    }
}

/// Headline numbers from a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub substations: usize,
    pub postcodes: u64,
    pub matched: u64,
    pub unmatched: u64,
    /// Matched postcodes left out of the chunks for lack of an outward
    /// code.
    pub anomalies: u64,
    pub report: WriteReport,
}

/// Runs the whole pipeline: load, match, group, simplify, write.
///
/// # Errors
///
/// Returns [`GenerateError`] if no boundaries or no postcodes can be
/// loaded, or an artifact cannot be written. Per-DNO and per-geometry
/// failures are logged and absorbed.
pub fn run_pipeline(
    config: &PipelineConfig,
    progress: &PipelineProgress,
) -> Result<PipelineSummary, GenerateError> {
    log::info!("=== Loading substation boundaries ===");
    let boundaries =
        load_all_boundaries(&config.sources, &config.substations_dir, &progress.sources)?;

    log::info!("=== Loading postcode locations ===");
    let postcodes = load_postcodes(&config.postcodes_dir)?;
    let total_postcodes = postcodes.records.len() as u64;

    log::info!("=== Matching postcodes to substations ===");
    let outcome = match_postcodes(&boundaries, postcodes.records, &progress.matching);

    log::info!("=== Creating postcode lookup ===");
    let lookup = build_lookup(&boundaries, &outcome);

    log::info!("=== Creating substation details ===");
    let details = build_details(&boundaries, &lookup);

    log::info!("=== Saving output files ===");
    std::fs::create_dir_all(&config.output_dir).map_err(|source| GenerateError::Io {
        path: config.output_dir.display().to_string(),
        source,
    })?;

    let mut report = WriteReport::default();
    output::write_chunks(
        config,
        lookup.chunks.iter(),
        chrono::Local::now().to_rfc3339(),
        &mut report,
        &progress.chunks,
    )?;

    output::write_backup(config, &render_details(&details)?, &mut report)?;

    let escalation = escalate(&config.ladder, config.size_ceiling, |level| {
        render_details(&simplify_details(&details, level))
    })?;
    output::write_details(config, &escalation, &mut report)?;

    report.log(config.size_ceiling);

    Ok(PipelineSummary {
        substations: boundaries.len(),
        postcodes: total_postcodes,
        matched: outcome.matched,
        unmatched: outcome.unmatched,
        anomalies: lookup.anomalies,
        report,
    })
}
