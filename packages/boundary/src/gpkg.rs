//! Reads DNO boundary `GeoPackage` files.
//!
//! A `GeoPackage` is an `SQLite` database. The first feature table listed
//! in `gpkg_contents` is read; its geometry column holds `GeoPackage`
//! binary blobs (a small header followed by standard WKB).

use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension as _};
use serde_json::{Map, Number, Value};

use crate::BoundaryError;
use crate::crs::Crs;
use crate::normalize::{RawFeature, RawLayer};

const WKB_POLYGON: u32 = 3;
const WKB_MULTI_POLYGON: u32 = 6;

/// Reads the first feature table of a `GeoPackage`.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the file is not a readable `GeoPackage`,
/// has no feature table, or uses an unsupported spatial reference.
pub fn read_layer(path: &Path) -> Result<RawLayer, BoundaryError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    read_connection(&conn)
}

/// Reads the first feature table from an open `GeoPackage` connection.
///
/// # Errors
///
/// See [`read_layer`].
pub fn read_connection(conn: &Connection) -> Result<RawLayer, BoundaryError> {
    let table: String = conn
        .query_row(
            "SELECT table_name FROM gpkg_contents \
             WHERE data_type = 'features' ORDER BY table_name LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| BoundaryError::UnsupportedFormat {
            message: "GeoPackage has no feature table".to_string(),
        })?;

    let (geometry_column, srs_id): (String, i64) = conn.query_row(
        "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        [&table],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let crs = resolve_srs(conn, srs_id)?;
    log::debug!("GeoPackage table '{table}' geometry '{geometry_column}' in {crs}");

    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_identifier(&table)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let mut rows = stmt.query([])?;

    let mut features = Vec::new();
    let mut row_index = 0usize;

    while let Some(row) = rows.next()? {
        let row_number = row_index;
        row_index += 1;

        let mut properties = Map::new();
        let mut geometry = None;

        for (i, column) in columns.iter().enumerate() {
            let value = row.get_ref(i)?;
            if *column == geometry_column {
                if let ValueRef::Blob(blob) = value {
                    match parse_geometry_blob(blob) {
                        Ok(parsed) => geometry = parsed,
                        Err(e) => log::warn!("Row {row_number}: {e}, skipping"),
                    }
                }
            } else if let Some(json) = to_json(value) {
                properties.insert(column.clone(), json);
            }
        }

        let Some(geometry) = geometry else {
            continue;
        };

        features.push(RawFeature {
            row: row_number,
            properties,
            geometry,
        });
    }

    Ok(RawLayer { crs, features })
}

fn resolve_srs(conn: &Connection, srs_id: i64) -> Result<Crs, BoundaryError> {
    let definition: Option<(String, i64)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (organization, code) = definition.unwrap_or_else(|| ("EPSG".to_string(), srs_id));

    let crs = if organization.eq_ignore_ascii_case("EPSG") {
        u32::try_from(code).ok().and_then(Crs::from_epsg)
    } else {
        None
    };

    crs.ok_or_else(|| BoundaryError::UnsupportedCrs {
        name: format!("{organization}:{code}"),
    })
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => Some(Value::Null),
        ValueRef::Integer(i) => Some(Value::Number(i.into())),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number),
        ValueRef::Text(t) => Some(Value::String(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Blob(_) => None,
    }
}

/// Decodes a `GeoPackage` geometry blob.
///
/// Returns `Ok(None)` for empty or non-polygonal geometries.
///
/// # Errors
///
/// Returns [`BoundaryError::InvalidGeometry`] for truncated or malformed
/// blobs.
pub fn parse_geometry_blob(blob: &[u8]) -> Result<Option<MultiPolygon<f64>>, BoundaryError> {
    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return Err(invalid("missing GeoPackage magic"));
    }

    let flags = blob[3];
    let empty = flags & 0b0001_0000 != 0;
    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(invalid(&format!("bad envelope indicator {other}"))),
    };

    if empty {
        return Ok(None);
    }

    let wkb = blob
        .get(8 + envelope_len..)
        .ok_or_else(|| invalid("truncated envelope"))?;

    let mut reader = WkbReader::new(wkb);
    match reader.geometry()? {
        WkbGeometry::Polygon(p) => Ok(Some(MultiPolygon(vec![p]))),
        WkbGeometry::MultiPolygon(mp) => Ok(Some(mp)),
        WkbGeometry::Other(kind) => {
            log::debug!("Ignoring non-polygonal WKB geometry type {kind}");
            Ok(None)
        }
    }
}

fn invalid(message: &str) -> BoundaryError {
    BoundaryError::InvalidGeometry {
        message: message.to_string(),
    }
}

enum WkbGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
    Other(u32),
}

struct WkbReader<'a> {
    buf: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> WkbReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            little_endian: true,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], BoundaryError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or_else(|| invalid("truncated WKB"))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, BoundaryError> {
        let bytes = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    fn f64(&mut self) -> Result<f64, BoundaryError> {
        let bytes = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        })
    }

    /// Reads the byte-order marker and type word; returns the base type
    /// and the number of ordinates per point.
    fn header(&mut self) -> Result<(u32, usize), BoundaryError> {
        let [order] = self.take::<1>()?;
        self.little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(invalid(&format!("bad WKB byte order {other}"))),
        };

        let raw = self.u32()?;
        // EWKB flag bits, then ISO 1000/2000/3000 dimension offsets.
        let ewkb_z = raw & 0x8000_0000 != 0;
        let ewkb_m = raw & 0x4000_0000 != 0;
        if raw & 0x2000_0000 != 0 {
            self.u32()?; // embedded SRID
        }
        let iso = raw & 0x0FFF_FFFF;
        let (iso_z, iso_m) = match iso / 1000 {
            1 => (true, false),
            2 => (false, true),
            3 => (true, true),
            _ => (false, false),
        };

        let dims = 2 + usize::from(ewkb_z || iso_z) + usize::from(ewkb_m || iso_m);
        Ok((iso % 1000, dims))
    }

    fn geometry(&mut self) -> Result<WkbGeometry, BoundaryError> {
        let (kind, dims) = self.header()?;
        match kind {
            WKB_POLYGON => Ok(WkbGeometry::Polygon(self.polygon_body(dims)?)),
            WKB_MULTI_POLYGON => {
                let count = self.u32()?;
                let mut polygons = Vec::new();
                for _ in 0..count {
                    let (inner, inner_dims) = self.header()?;
                    if inner != WKB_POLYGON {
                        return Err(invalid(&format!(
                            "MultiPolygon member has WKB type {inner}"
                        )));
                    }
                    polygons.push(self.polygon_body(inner_dims)?);
                }
                Ok(WkbGeometry::MultiPolygon(MultiPolygon(polygons)))
            }
            other => Ok(WkbGeometry::Other(other)),
        }
    }

    fn polygon_body(&mut self, dims: usize) -> Result<Polygon<f64>, BoundaryError> {
        let ring_count = self.u32()?;
        let mut rings = Vec::new();
        for _ in 0..ring_count {
            rings.push(self.ring(dims)?);
        }

        let mut rings = rings.into_iter();
        let exterior = rings
            .next()
            .ok_or_else(|| invalid("polygon without exterior ring"))?;
        Ok(Polygon::new(exterior, rings.collect()))
    }

    fn ring(&mut self, dims: usize) -> Result<LineString<f64>, BoundaryError> {
        let point_count = self.u32()? as usize;
        let remaining = self.buf.len().saturating_sub(self.pos);
        if point_count.saturating_mul(dims * 8) > remaining {
            return Err(invalid("ring longer than blob"));
        }

        let mut coords = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            let x = self.f64()?;
            let y = self.f64()?;
            for _ in 2..dims {
                self.f64()?;
            }
            coords.push(Coord { x, y });
        }
        Ok(LineString::new(coords))
    }
}
