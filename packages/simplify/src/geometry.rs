//! Per-geometry vertex reduction and coordinate rounding.

use geo::{
    Coord, CoordsIter as _, LineString, MultiPolygon, Polygon, Simplify as _,
    SimplifyVwPreserve as _, Validation as _,
};

use crate::{SimplifyError, SimplifyLevel};

/// Simplifies a `GeoJSON` geometry, passing it through unmodified if it
/// cannot be simplified (non-polygonal, malformed, or no valid result).
#[must_use]
pub fn simplify_geojson(geometry: &geojson::Geometry, level: &SimplifyLevel) -> geojson::Geometry {
    match try_simplify_geojson(geometry, level) {
        Ok(simplified) => simplified,
        Err(e) => {
            log::warn!("Could not simplify geometry at level '{}': {e}", level.name);
            geometry.clone()
        }
    }
}

/// Simplifies a `GeoJSON` Polygon/MultiPolygon.
///
/// # Errors
///
/// Returns [`SimplifyError`] if the geometry cannot be converted, is not
/// polygonal, or no valid simplified form exists.
pub fn try_simplify_geojson(
    geometry: &geojson::Geometry,
    level: &SimplifyLevel,
) -> Result<geojson::Geometry, SimplifyError> {
    let geo_geometry: geo::Geometry<f64> = geometry.clone().try_into()?;

    let simplified = match geo_geometry {
        geo::Geometry::Polygon(p) => {
            let mut mp = simplify_multipolygon(&MultiPolygon(vec![p]), level)?;
            // A single polygon stays a Polygon on the wire.
            if mp.0.len() == 1 {
                geo::Geometry::Polygon(mp.0.remove(0))
            } else {
                geo::Geometry::MultiPolygon(mp)
            }
        }
        geo::Geometry::MultiPolygon(mp) => {
            geo::Geometry::MultiPolygon(simplify_multipolygon(&mp, level)?)
        }
        other => {
            return Err(SimplifyError::UnsupportedGeometry {
                kind: kind(&other),
            });
        }
    };

    Ok(geojson::Geometry::new(geojson::Value::from(&simplified)))
}

/// Reduces vertices, then rounds coordinates to the level's precision.
///
/// Ramer–Douglas–Peucker is tried first; if that produces an invalid
/// shape, topology-preserving Visvalingam–Whyatt (area threshold
/// `tolerance²`) is used instead. If rounding invalidates the chosen
/// shape the unrounded one is returned.
///
/// # Errors
///
/// Returns [`SimplifyError::NoValidResult`] if neither algorithm yields
/// a valid geometry (typically because the input was already invalid).
pub fn simplify_multipolygon(
    geometry: &MultiPolygon<f64>,
    level: &SimplifyLevel,
) -> Result<MultiPolygon<f64>, SimplifyError> {
    let rdp = geometry.simplify(level.tolerance);
    let reduced = if is_usable(&rdp) {
        rdp
    } else {
        let vw = geometry.simplify_vw_preserve(level.tolerance * level.tolerance);
        if !is_usable(&vw) {
            return Err(SimplifyError::NoValidResult);
        }
        vw
    };

    let rounded = round_multipolygon(&reduced, level.precision);
    if is_usable(&rounded) {
        Ok(rounded)
    } else {
        log::debug!(
            "Rounding to {} decimals invalidated a geometry, keeping unrounded",
            level.precision
        );
        Ok(reduced)
    }
}

fn is_usable(geometry: &MultiPolygon<f64>) -> bool {
    !geometry.0.is_empty() && geometry.is_valid()
}

/// Rounds every coordinate to `precision` decimal places, dropping
/// consecutive duplicate vertices and any ring that collapses below four
/// coordinates (a polygon whose exterior collapses is dropped entirely).
#[must_use]
pub fn round_multipolygon(geometry: &MultiPolygon<f64>, precision: i32) -> MultiPolygon<f64> {
    let factor = 10f64.powi(precision);

    MultiPolygon(
        geometry
            .0
            .iter()
            .filter_map(|polygon| {
                let exterior = round_ring(polygon.exterior(), factor)?;
                let interiors = polygon
                    .interiors()
                    .iter()
                    .filter_map(|ring| round_ring(ring, factor))
                    .collect();
                Some(Polygon::new(exterior, interiors))
            })
            .collect(),
    )
}

fn round_ring(ring: &LineString<f64>, factor: f64) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        let rounded = Coord {
            x: (c.x * factor).round() / factor,
            y: (c.y * factor).round() / factor,
        };
        if coords.last() != Some(&rounded) {
            coords.push(rounded);
        }
    }

    (coords.len() >= 4).then(|| LineString::new(coords))
}

/// Total number of coordinates in a `GeoJSON` geometry (zero if it cannot
/// be converted).
#[must_use]
pub fn geojson_vertex_count(geometry: &geojson::Geometry) -> usize {
    geo::Geometry::<f64>::try_from(geometry.clone()).map_or(0, |g| g.coords_count())
}

const fn kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "non-polygonal geometry",
    }
}
