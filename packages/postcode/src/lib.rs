#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! National postcode centroid loading.
//!
//! Reads the first `*.csv` (lexicographic order) in the postcode
//! directory, typically the ONS Postcode Directory, keeping only the
//! postcode, latitude and longitude columns. Rows without usable
//! coordinates are dropped before anything reaches the matcher.

pub mod format;

use std::path::{Path, PathBuf};

use geo::Point;
use thiserror::Error;

pub use format::{canonical_postcode, outward_code};

/// Header names accepted for the postcode column, in probe order.
pub const POSTCODE_COLUMNS: &[&str] = &["PCDS", "pcds", "postcode", "Postcode"];

/// Header names accepted for the latitude column, in probe order.
pub const LATITUDE_COLUMNS: &[&str] = &["LAT", "lat", "latitude", "Latitude"];

/// Header names accepted for the longitude column, in probe order.
pub const LONGITUDE_COLUMNS: &[&str] = &["LONG", "long", "lng", "longitude", "Longitude"];

/// Errors that can occur while loading postcodes.
#[derive(Debug, Error)]
pub enum PostcodeError {
    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// I/O error reading the postcode directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No candidate CSV in the postcode directory.
    #[error("No postcode CSV file found in {dir}")]
    NoPostcodeFile {
        /// Directory that was searched.
        dir: String,
    },

    /// A required column is absent from the header row.
    #[error("{path} has no {field} column (tried {tried})")]
    MissingColumn {
        /// Path to the CSV file.
        path: String,
        /// Logical field that could not be found.
        field: &'static str,
        /// Comma-separated header names that were probed.
        tried: String,
    },
}

/// A postcode centroid in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct PostcodeRecord {
    /// Canonical postcode (`"N15 5QA"`).
    pub postcode: String,
    pub lat: f64,
    pub lng: f64,
}

impl PostcodeRecord {
    /// Point geometry in longitude/latitude order.
    #[must_use]
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

/// Result of reading a postcode file.
#[derive(Debug, Clone)]
pub struct PostcodeLoad {
    pub path: PathBuf,
    pub records: Vec<PostcodeRecord>,
    /// Rows dropped for missing or out-of-range coordinates.
    pub dropped: u64,
}

/// Returns the first `*.csv` file in `dir` in lexicographic order.
///
/// # Errors
///
/// Returns [`PostcodeError::NoPostcodeFile`] if there is none, or
/// [`PostcodeError::Io`] if the directory cannot be read.
pub fn find_postcode_file(dir: &Path) -> Result<PathBuf, PostcodeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PostcodeError::NoPostcodeFile {
                dir: dir.display().to_string(),
            }
        } else {
            PostcodeError::Io {
                path: dir.display().to_string(),
                source: e,
            }
        }
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| PostcodeError::Io {
                path: dir.display().to_string(),
                source: e,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();

    files
        .into_iter()
        .next()
        .ok_or_else(|| PostcodeError::NoPostcodeFile {
            dir: dir.display().to_string(),
        })
}

/// Locates and reads the postcode file in `dir`.
///
/// # Errors
///
/// Returns [`PostcodeError`] if no file is found, the file cannot be
/// parsed, or a required column is missing.
pub fn load_postcodes(dir: &Path) -> Result<PostcodeLoad, PostcodeError> {
    let path = find_postcode_file(dir)?;
    log::info!("Loading postcodes from {}", path.display());

    let (records, dropped) = read_postcode_csv(&path)?;
    log::info!(
        "Loaded {} postcodes ({dropped} rows without coordinates dropped)",
        records.len()
    );

    Ok(PostcodeLoad {
        path,
        records,
        dropped,
    })
}

/// Reads postcode, latitude and longitude columns from a CSV file.
///
/// Returns the records plus the number of rows dropped for missing,
/// unparseable or out-of-range coordinates (ONSPD marks postcodes without
/// a grid reference with latitude `99.999999`).
///
/// # Errors
///
/// Returns [`PostcodeError`] if the file cannot be opened, the header row
/// cannot be read, or a required column is absent.
pub fn read_postcode_csv(path: &Path) -> Result<(Vec<PostcodeRecord>, u64), PostcodeError> {
    let csv_err = |source| PostcodeError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |field: &'static str, candidates: &[&str]| {
        candidates
            .iter()
            .find_map(|c| headers.iter().position(|h| h.trim() == *c))
            .ok_or_else(|| PostcodeError::MissingColumn {
                path: path.display().to_string(),
                field,
                tried: candidates.join(", "),
            })
    };

    let postcode_idx = column("postcode", POSTCODE_COLUMNS)?;
    let lat_idx = column("latitude", LATITUDE_COLUMNS)?;
    let lng_idx = column("longitude", LONGITUDE_COLUMNS)?;

    let mut records = Vec::new();
    let mut dropped = 0u64;

    for result in reader.records() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("skipping malformed postcode row: {e}");
                dropped += 1;
                continue;
            }
        };

        let postcode = row.get(postcode_idx).map(canonical_postcode);
        let lat = parse_coordinate(row.get(lat_idx), 90.0);
        let lng = parse_coordinate(row.get(lng_idx), 180.0);

        match (postcode, lat, lng) {
            (Some(postcode), Some(lat), Some(lng)) if !postcode.is_empty() => {
                records.push(PostcodeRecord { postcode, lat, lng });
            }
            _ => dropped += 1,
        }
    }

    Ok((records, dropped))
}

fn parse_coordinate(raw: Option<&str>, limit: f64) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_csv_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "PCDS,LAT,LONG\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "PCDS,LAT,LONG\n").unwrap();
        std::fs::write(dir.path().join("0.txt"), "").unwrap();

        let found = find_postcode_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "a.csv");
    }

    #[test]
    fn no_csv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_postcode_file(dir.path()),
            Err(PostcodeError::NoPostcodeFile { .. })
        ));
        assert!(matches!(
            find_postcode_file(&dir.path().join("absent")),
            Err(PostcodeError::NoPostcodeFile { .. })
        ));
    }

    #[test]
    fn reads_onspd_columns_and_drops_missing_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("onspd.csv"),
            "PCD,PCDS,DOINTR,LAT,LONG\n\
             N15 5QA,N15 5QA,199906,51.58152,-0.083085\n\
             N15 5QB,N15 5QB,199906,,-0.08\n\
             ZZ9 9ZZ,ZZ9 9ZZ,199906,99.999999,0.000000\n\
             SW1A1AA,sw1a1aa,199906,51.501009,-0.141588\n",
        )
        .unwrap();

        let load = load_postcodes(dir.path()).unwrap();
        assert_eq!(load.dropped, 2);
        assert_eq!(
            load.records,
            vec![
                PostcodeRecord {
                    postcode: "N15 5QA".to_string(),
                    lat: 51.58152,
                    lng: -0.083_085,
                },
                PostcodeRecord {
                    postcode: "SW1A 1AA".to_string(),
                    lat: 51.501_009,
                    lng: -0.141_588,
                },
            ]
        );
    }

    #[test]
    fn accepts_lowercase_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codepoint.csv");
        std::fs::write(&path, "postcode,latitude,longitude\nEH1 1YZ,55.95,-3.19\n").unwrap();

        let (records, dropped) = read_postcode_csv(&path).unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(records[0].postcode, "EH1 1YZ");
        assert!((records[0].point().x() - -3.19).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "PCDS,LAT\nN15 5QA,51.5\n").unwrap();

        let err = read_postcode_csv(&path).unwrap_err();
        assert!(matches!(
            err,
            PostcodeError::MissingColumn {
                field: "longitude",
                ..
            }
        ));
    }
}
