//! Per-substation detail records.

use std::collections::BTreeMap;
use std::path::Path;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use substation_map_boundary_models::SubstationBoundary;
use substation_map_simplify::{SimplifyLevel, simplify_geojson};

use crate::GenerateError;
use crate::lookup::Lookup;

/// What the web client shows for one substation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstationDetail {
    pub name: String,
    pub dno: String,
    pub license_area: String,
    #[serde(default)]
    pub postcode_count: usize,
    /// Sorted ascending, no duplicates.
    #[serde(default)]
    pub postcodes: Vec<String>,
    #[serde(alias = "geometry")]
    pub boundary: Option<geojson::Geometry>,
}

/// Substation id to detail.
pub type Details = BTreeMap<String, SubstationDetail>;

/// Builds unsimplified details for every boundary, including those that
/// matched no postcodes.
#[must_use]
pub fn build_details(boundaries: &[SubstationBoundary], lookup: &Lookup) -> Details {
    let details: Details = boundaries
        .iter()
        .enumerate()
        .map(|(position, boundary)| {
            let postcodes = lookup
                .postcodes_by_boundary
                .get(position)
                .cloned()
                .unwrap_or_default();

            (
                boundary.substation_id.clone(),
                SubstationDetail {
                    name: boundary.substation_name.clone(),
                    dno: boundary.dno_name.clone(),
                    license_area: boundary.license_area.clone(),
                    postcode_count: postcodes.len(),
                    postcodes,
                    boundary: Some(to_geojson(&boundary.geometry)),
                },
            )
        })
        .collect();

    let empty = details.values().filter(|d| d.postcode_count == 0).count();
    log::info!(
        "Created details for {} substations ({empty} without postcodes)",
        details.len()
    );

    details
}

/// Re-derives every boundary at `level` from `original`.
///
/// Geometries that cannot be simplified are carried over unchanged.
#[must_use]
pub fn simplify_details(original: &Details, level: &SimplifyLevel) -> Details {
    original
        .iter()
        .map(|(id, detail)| {
            let boundary = detail
                .boundary
                .as_ref()
                .map(|geometry| simplify_geojson(geometry, level));
            (
                id.clone(),
                SubstationDetail {
                    boundary,
                    ..detail.clone()
                },
            )
        })
        .collect()
}

/// Serializes details as compact JSON.
///
/// # Errors
///
/// Returns [`GenerateError::Json`] if serialization fails.
pub fn render_details(details: &Details) -> Result<Vec<u8>, GenerateError> {
    Ok(serde_json::to_vec(details)?)
}

/// Reads a details file, dropping any fields outside the detail schema.
///
/// # Errors
///
/// Returns [`GenerateError`] if the file cannot be read or parsed.
pub fn read_details(path: &Path) -> Result<Details, GenerateError> {
    let bytes = std::fs::read(path).map_err(|source| GenerateError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// A one-part multipolygon is written as a plain Polygon.
fn to_geojson(geometry: &MultiPolygon<f64>) -> geojson::Geometry {
    let value = match geometry.0.as_slice() {
        [polygon] => geojson::Value::from(polygon),
        _ => geojson::Value::from(geometry),
    };
    geojson::Geometry::new(value)
}
