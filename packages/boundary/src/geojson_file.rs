//! Reads DNO boundary `GeoJSON` files.
//!
//! Several DNOs still publish pre-RFC 7946 `GeoJSON` with a named `crs`
//! member (usually British National Grid). A file without one is WGS84.

use std::path::Path;

use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use serde_json::Value;

use crate::BoundaryError;
use crate::crs::Crs;
use crate::normalize::{RawFeature, RawLayer};

/// Reads a `GeoJSON` `FeatureCollection` (or single `Feature`).
///
/// # Errors
///
/// Returns [`BoundaryError`] if the file cannot be read or parsed, is
/// not a feature/feature collection, or declares an unsupported CRS.
pub fn read_layer(path: &Path) -> Result<RawLayer, BoundaryError> {
    let text = std::fs::read_to_string(path)?;
    parse_layer(&text)
}

/// Parses `GeoJSON` text into a [`RawLayer`].
///
/// # Errors
///
/// See [`read_layer`].
pub fn parse_layer(text: &str) -> Result<RawLayer, BoundaryError> {
    let geojson: GeoJson = text.parse()?;

    let (features, foreign_members) = match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(feature) => {
            let foreign = feature.foreign_members.clone();
            (vec![feature], foreign)
        }
        GeoJson::Geometry(_) => {
            return Err(BoundaryError::UnsupportedFormat {
                message: "bare GeoJSON geometry has no properties".to_string(),
            });
        }
    };

    let crs = match foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(crs_name)
    {
        None => Crs::Wgs84,
        Some(name) => Crs::parse(name).ok_or_else(|| BoundaryError::UnsupportedCrs {
            name: name.to_string(),
        })?,
    };

    let features = features
        .into_iter()
        .enumerate()
        .filter_map(|(row, feature)| raw_feature(row, feature))
        .collect();

    Ok(RawLayer { crs, features })
}

/// Extracts `properties.name` from a named `crs` member.
fn crs_name(crs: &Value) -> Option<&str> {
    crs.get("properties")?.get("name")?.as_str()
}

fn raw_feature(row: usize, feature: Feature) -> Option<RawFeature> {
    let Some(geometry) = feature.geometry else {
        log::warn!("Feature {row} has no geometry, skipping");
        return None;
    };

    let geometry: geo::Geometry<f64> = match geometry.try_into() {
        Ok(g) => g,
        Err(e) => {
            log::warn!("Feature {row} has malformed geometry ({e}), skipping");
            return None;
        }
    };

    let geometry = match geometry {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        _ => {
            log::warn!("Feature {row} is not polygonal, skipping");
            return None;
        }
    };

    Some(RawFeature {
        row,
        properties: feature.properties.unwrap_or_default(),
        geometry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_wgs84_collection_without_crs() {
        let layer = parse_layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"primary":"Seven Sisters"},
                 "geometry":{"type":"Polygon","coordinates":[[[-0.1,51.5],[0.0,51.5],[0.0,51.6],[-0.1,51.5]]]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(layer.crs, Crs::Wgs84);
        assert_eq!(layer.features.len(), 1);
        assert_eq!(layer.features[0].properties["primary"], "Seven Sisters");
    }

    #[test]
    fn reads_named_crs_member() {
        let layer = parse_layer(
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::27700"}},
                "features":[
                {"type":"Feature","properties":{},
                 "geometry":{"type":"MultiPolygon","coordinates":[[[[532000,187000],[534500,187000],[534500,190000],[532000,187000]]]]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(layer.crs, Crs::BritishNationalGrid);
        assert_eq!(layer.features[0].geometry.0.len(), 1);
    }

    #[test]
    fn rejects_unknown_crs() {
        let err = parse_layer(
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"EPSG:2154"}},
                "features":[]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BoundaryError::UnsupportedCrs { .. }));
    }

    #[test]
    fn skips_null_and_point_geometries_but_keeps_row_numbers() {
        let layer = parse_layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"id":"a"},"geometry":null},
                {"type":"Feature","properties":{"id":"b"},"geometry":{"type":"Point","coordinates":[0,51]}},
                {"type":"Feature","properties":{"id":"c"},
                 "geometry":{"type":"Polygon","coordinates":[[[-0.1,51.5],[0.0,51.5],[0.0,51.6],[-0.1,51.5]]]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(layer.features.len(), 1);
        assert_eq!(layer.features[0].row, 2);
    }
}
