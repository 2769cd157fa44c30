//! Normalizes raw boundary features into [`SubstationBoundary`] values.
//!
//! Every DNO names its columns differently. The name and identifier
//! columns are found by probing the source's ordered alias lists; the
//! first alias present in the file wins. Rows without a usable identifier
//! get `<dno_id>_<row:04>`, rows without a name reuse their identifier.

use std::collections::BTreeSet;

use geo::MultiPolygon;
use serde_json::{Map, Value};
use substation_map_boundary_models::{DnoSource, SubstationBoundary};

use crate::crs::{self, Crs};

/// A feature as read from a source file, before normalization.
#[derive(Debug, Clone)]
pub struct RawFeature {
    /// Zero-based row position in the source file.
    pub row: usize,
    /// Source-specific attribute columns.
    pub properties: Map<String, Value>,
    /// Polygonal geometry in the layer's native CRS.
    pub geometry: MultiPolygon<f64>,
}

/// All polygonal features of one source file plus its declared CRS.
#[derive(Debug, Clone)]
pub struct RawLayer {
    pub crs: Crs,
    pub features: Vec<RawFeature>,
}

/// Returns the first candidate that appears as a property key on any
/// feature.
#[must_use]
pub fn probe_field<'a>(features: &[RawFeature], candidates: &[&'a str]) -> Option<&'a str> {
    let present: BTreeSet<&str> = features
        .iter()
        .flat_map(|f| f.properties.keys().map(String::as_str))
        .collect();

    candidates.iter().copied().find(|c| present.contains(c))
}

/// Stringifies a property value. Null, empty and whitespace-only values
/// are treated as absent.
#[must_use]
pub fn property_string(properties: &Map<String, Value>, key: &str) -> Option<String> {
    let rendered = match properties.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };

    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// Formats the fallback identifier for a row.
#[must_use]
pub fn synthesized_id(dno_id: &str, row: usize) -> String {
    format!("{dno_id}_{row:04}")
}

/// Converts a raw layer into normalized boundaries for one DNO.
///
/// Geometry is reprojected to WGS84; features whose source or
/// reprojected coordinates are not finite are dropped with a warning. Identifiers
/// returned here are unique within the layer but not yet across DNOs.
#[must_use]
pub fn normalize_layer(source: &DnoSource, layer: RawLayer) -> Vec<SubstationBoundary> {
    let name_field = probe_field(&layer.features, &source.fields.name_candidates());
    let id_field = probe_field(&layer.features, &source.fields.id_candidates());

    match name_field {
        Some(field) => log::info!("{}: using '{field}' for substation name", source.id),
        None => log::info!("{}: no name field found, using ID as name", source.id),
    }
    match id_field {
        Some(field) => log::info!("{}: using '{field}' for substation ID", source.id),
        None => log::info!("{}: no ID field found, creating IDs from index", source.id),
    }

    if !layer.crs.is_wgs84() {
        log::info!("{}: converting from {} to EPSG:4326", source.id, layer.crs);
    }

    let mut boundaries = Vec::with_capacity(layer.features.len());

    for feature in layer.features {
        if !all_finite(&feature.geometry) {
            log::warn!(
                "{}: row {} has non-finite source coordinates, skipping",
                source.id,
                feature.row
            );
            continue;
        }

        let geometry = crs::reproject(&feature.geometry, layer.crs);
        if !all_finite(&geometry) {
            log::warn!(
                "{}: row {} has non-finite coordinates after reprojection, skipping",
                source.id,
                feature.row
            );
            continue;
        }

        let substation_id = id_field
            .and_then(|field| property_string(&feature.properties, field))
            .unwrap_or_else(|| synthesized_id(&source.id, feature.row));
        let substation_name = name_field
            .and_then(|field| property_string(&feature.properties, field))
            .unwrap_or_else(|| substation_id.clone());

        boundaries.push(SubstationBoundary {
            substation_id,
            substation_name,
            dno_id: source.id.clone(),
            dno_name: source.name.clone(),
            license_area: source.license_area.clone(),
            geometry,
        });
    }

    boundaries
}

fn all_finite(geometry: &MultiPolygon<f64>) -> bool {
    use geo::CoordsIter as _;

    geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use serde_json::json;
    use substation_map_boundary_models::FieldAliases;

    fn source() -> DnoSource {
        DnoSource {
            id: "ENWL".to_string(),
            name: "Electricity North West".to_string(),
            license_area: "Northwest England".to_string(),
            file: "enwl.geojson".to_string(),
            fields: FieldAliases::default(),
        }
    }

    fn square() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: -2.3, y: 53.4),
            (x: -2.2, y: 53.4),
            (x: -2.2, y: 53.5),
            (x: -2.3, y: 53.5),
            (x: -2.3, y: 53.4),
        ]])
    }

    fn feature(row: usize, properties: Value) -> RawFeature {
        RawFeature {
            row,
            properties: properties.as_object().cloned().unwrap_or_default(),
            geometry: square(),
        }
    }

    #[test]
    fn first_present_candidate_wins() {
        let features = vec![feature(0, json!({"site_name": "A", "name": "B"}))];
        assert_eq!(
            probe_field(&features, &["primary", "name", "site_name"]),
            Some("name")
        );
        assert_eq!(probe_field(&features, &["primary"]), None);
    }

    #[test]
    fn stringifies_numbers_and_drops_nulls() {
        let props = json!({"id": 42, "blank": "  ", "missing": null, "name": " Bury "});
        let props = props.as_object().unwrap();
        assert_eq!(property_string(props, "id").as_deref(), Some("42"));
        assert_eq!(property_string(props, "blank"), None);
        assert_eq!(property_string(props, "missing"), None);
        assert_eq!(property_string(props, "name").as_deref(), Some("Bury"));
        assert_eq!(property_string(props, "absent"), None);
    }

    #[test]
    fn synthesizes_ids_when_no_id_column() {
        let layer = RawLayer {
            crs: Crs::Wgs84,
            features: vec![
                feature(0, json!({"primary": "Bury"})),
                feature(1, json!({"primary": "Rochdale"})),
            ],
        };
        let out = normalize_layer(&source(), layer);
        assert_eq!(out[0].substation_id, "ENWL_0000");
        assert_eq!(out[1].substation_id, "ENWL_0001");
        assert_eq!(out[1].substation_name, "Rochdale");
        assert_eq!(out[0].dno_name, "Electricity North West");
        assert_eq!(out[0].license_area, "Northwest England");
    }

    #[test]
    fn name_falls_back_to_id() {
        let layer = RawLayer {
            crs: Crs::Wgs84,
            features: vec![feature(0, json!({"primary_floc": "PF-1"}))],
        };
        let out = normalize_layer(&source(), layer);
        assert_eq!(out[0].substation_id, "PF-1");
        assert_eq!(out[0].substation_name, "PF-1");
    }

    #[test]
    fn row_with_missing_id_gets_synthesized_id() {
        let layer = RawLayer {
            crs: Crs::Wgs84,
            features: vec![
                feature(0, json!({"id": "X1"})),
                feature(7, json!({"id": null})),
            ],
        };
        let out = normalize_layer(&source(), layer);
        assert_eq!(out[0].substation_id, "X1");
        assert_eq!(out[1].substation_id, "ENWL_0007");
    }

    #[test]
    fn source_overrides_replace_default_aliases() {
        let mut src = source();
        src.fields.name = vec!["PRIMARY_NAME".to_string()];
        let layer = RawLayer {
            crs: Crs::Wgs84,
            features: vec![feature(0, json!({"PRIMARY_NAME": "Kearsley", "name": "ignored"}))],
        };
        let out = normalize_layer(&src, layer);
        assert_eq!(out[0].substation_name, "Kearsley");
    }

    #[test]
    fn grid_feature_with_nan_ordinate_is_skipped() {
        let grid_square = MultiPolygon(vec![polygon![
            (x: 532_000.0, y: 187_000.0),
            (x: 534_500.0, y: 187_000.0),
            (x: 534_500.0, y: 190_000.0),
            (x: 532_000.0, y: 187_000.0),
        ]]);
        let broken = MultiPolygon(vec![polygon![
            (x: 532_000.0, y: 187_000.0),
            (x: f64::NAN, y: f64::NAN),
            (x: 534_500.0, y: 190_000.0),
            (x: 532_000.0, y: 187_000.0),
        ]]);
        let layer = RawLayer {
            crs: Crs::BritishNationalGrid,
            features: vec![
                RawFeature {
                    row: 0,
                    properties: Map::new(),
                    geometry: broken,
                },
                RawFeature {
                    row: 1,
                    properties: Map::new(),
                    geometry: grid_square,
                },
            ],
        };

        let out = normalize_layer(&source(), layer);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].substation_id, "ENWL_0001");
        assert!(out[0].geometry.0[0].exterior().0[0].y > 51.0);
    }
}
