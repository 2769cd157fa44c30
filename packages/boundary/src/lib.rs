#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! DNO substation boundary loading and normalization.
//!
//! Reads each registered DNO's primary substation boundary file
//! (`GeoJSON` or `GeoPackage`), reprojects it to WGS84, maps its columns
//! onto a fixed schema and concatenates everything into one unified
//! collection. A missing or unreadable file costs that DNO its records,
//! never the whole run; only a run where no file loads at all fails.

pub mod crs;
pub mod geojson_file;
pub mod gpkg;
pub mod normalize;
pub mod registry;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use substation_map_boundary_models::{DnoSource, SubstationBoundary};
use substation_map_progress::ProgressCallback;
use thiserror::Error;

/// Errors that can occur while loading boundaries.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// `GeoPackage` (`SQLite`) access failed.
    #[error("GeoPackage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The file's coordinate reference system cannot be normalized.
    #[error("Unsupported CRS: {name}")]
    UnsupportedCrs {
        /// CRS name as declared by the file.
        name: String,
    },

    /// The file is not a format we can read.
    #[error("Unsupported format: {message}")]
    UnsupportedFormat {
        /// Description of what went wrong.
        message: String,
    },

    /// A geometry could not be decoded.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of what went wrong.
        message: String,
    },

    /// Not a single DNO file could be loaded.
    #[error("No substation data could be loaded from {dir}")]
    NoBoundaries {
        /// Directory that was searched.
        dir: String,
    },
}

/// Loads one DNO's boundaries from `path`.
///
/// Identifiers are unique within the returned vector but not yet across
/// DNOs; [`load_all_boundaries`] takes care of that.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the file cannot be read, is in an
/// unsupported format, or declares an unsupported CRS.
pub fn load_source(
    source: &DnoSource,
    path: &Path,
) -> Result<Vec<SubstationBoundary>, BoundaryError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let layer = match ext.as_str() {
        "geojson" | "json" => geojson_file::read_layer(path)?,
        "gpkg" => gpkg::read_layer(path)?,
        other => {
            return Err(BoundaryError::UnsupportedFormat {
                message: format!("unknown extension '.{other}'"),
            });
        }
    };

    Ok(normalize::normalize_layer(source, layer))
}

/// Loads and concatenates every source in registry order.
///
/// Missing files are skipped with a warning and per-file failures are
/// logged; both leave that DNO with zero records.
///
/// # Errors
///
/// Returns [`BoundaryError::NoBoundaries`] if no source file loaded.
pub fn load_all_boundaries(
    sources: &[DnoSource],
    dir: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<SubstationBoundary>, BoundaryError> {
    log::info!("Loading {} DNO boundary sources from {}", sources.len(), dir.display());

    let mut all = Vec::new();
    let mut ids = UniqueIds::default();
    let mut loaded_files = 0usize;

    progress.set_total(sources.len() as u64);

    for source in sources {
        progress.set_message(source.id.clone());
        let path = dir.join(&source.file);

        if !path.exists() {
            log::warn!("{}: {} not found, skipping", source.id, path.display());
            progress.inc(1);
            continue;
        }

        match load_source(source, &path) {
            Ok(records) => {
                log::info!("{}: loaded {} substations", source.id, records.len());
                loaded_files += 1;
                for (index, mut record) in records.into_iter().enumerate() {
                    record.substation_id = ids.claim(&source.id, record.substation_id, index);
                    all.push(record);
                }
            }
            Err(e) => log::error!("{}: failed to load {}: {e}", source.id, path.display()),
        }

        progress.inc(1);
    }

    progress.finish(format!("Loaded {} substations", all.len()));

    if loaded_files == 0 {
        return Err(BoundaryError::NoBoundaries {
            dir: dir.display().to_string(),
        });
    }

    log::info!(
        "Total substations loaded: {} from {loaded_files}/{} DNO files",
        all.len(),
        sources.len()
    );
    Ok(all)
}

/// Hands out identifiers that are unique across the unified collection.
#[derive(Debug, Default)]
pub struct UniqueIds {
    used: BTreeSet<String>,
}

impl UniqueIds {
    /// Claims `candidate`, re-keying it as `<dno_id>_<candidate>` and then
    /// `<dno_id>_<index:04>` if it is already taken.
    pub fn claim(&mut self, dno_id: &str, candidate: String, index: usize) -> String {
        if self.used.insert(candidate.clone()) {
            return candidate;
        }

        let prefixed = format!("{dno_id}_{candidate}");
        if self.used.insert(prefixed.clone()) {
            log::warn!("{dno_id}: duplicate substation ID '{candidate}' re-keyed as '{prefixed}'");
            return prefixed;
        }

        let mut n = index;
        loop {
            let synthesized = normalize::synthesized_id(dno_id, n);
            if self.used.insert(synthesized.clone()) {
                log::warn!(
                    "{dno_id}: duplicate substation ID '{candidate}' re-keyed as '{synthesized}'"
                );
                return synthesized;
            }
            n += 1;
        }
    }
}
