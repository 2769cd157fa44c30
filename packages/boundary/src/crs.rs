//! Coordinate reference system detection and normalization to WGS84.
//!
//! DNOs publish boundaries in whatever CRS their GIS team uses. Most are
//! already WGS84, several are British National Grid (OSGB36 transverse
//! Mercator) and the odd export is Web Mercator. Everything is converted
//! to WGS84 longitude/latitude before it gets near the spatial join.

use geo::{Coord, MapCoords, MultiPolygon};

/// A source coordinate reference system we know how to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Crs {
    /// Geographic WGS84 (`EPSG:4326`, `OGC:CRS84`).
    #[strum(serialize = "EPSG:4326")]
    Wgs84,
    /// Ordnance Survey National Grid (`EPSG:27700`).
    #[strum(serialize = "EPSG:27700")]
    BritishNationalGrid,
    /// Spherical Web Mercator (`EPSG:3857`).
    #[strum(serialize = "EPSG:3857")]
    WebMercator,
}

impl Crs {
    /// Maps an EPSG code to a supported CRS.
    #[must_use]
    pub const fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 | 4258 => Some(Self::Wgs84),
            27700 => Some(Self::BritishNationalGrid),
            3857 | 900_913 => Some(Self::WebMercator),
            _ => None,
        }
    }

    /// Parses a CRS name as it appears in a `GeoJSON` `crs` member.
    ///
    /// Accepts `EPSG:27700`, `urn:ogc:def:crs:EPSG::27700`,
    /// `urn:ogc:def:crs:EPSG:6.6:27700` and `urn:ogc:def:crs:OGC:1.3:CRS84`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();

        if upper.ends_with("CRS84") {
            return Some(Self::Wgs84);
        }
        if !upper.contains("EPSG") {
            return None;
        }

        upper
            .rsplit(':')
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .and_then(Self::from_epsg)
    }

    /// Whether coordinates in this CRS can be used without conversion.
    #[must_use]
    pub const fn is_wgs84(self) -> bool {
        matches!(self, Self::Wgs84)
    }

    /// Converts a single coordinate to WGS84 `(lng, lat)`.
    #[must_use]
    pub fn to_wgs84(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Self::Wgs84 => coord,
            Self::BritishNationalGrid => bng_to_wgs84(coord.x, coord.y),
            Self::WebMercator => web_mercator_to_wgs84(coord.x, coord.y),
        }
    }
}

/// Reprojects a multipolygon to WGS84.
#[must_use]
pub fn reproject(geometry: &MultiPolygon<f64>, crs: Crs) -> MultiPolygon<f64> {
    if crs.is_wgs84() {
        return geometry.clone();
    }
    geometry.map_coords(|coord| crs.to_wgs84(coord))
}

// ============================================================
// British National Grid
// ============================================================

/// Airy 1830 ellipsoid (OSGB36).
const AIRY_A: f64 = 6_377_563.396;
const AIRY_B: f64 = 6_356_256.909;

/// WGS84 ellipsoid.
const WGS84_A: f64 = 6_378_137.0;
const WGS84_B: f64 = 6_356_752.314_245;

/// National Grid projection constants.
const NG_F0: f64 = 0.999_601_271_7;
const NG_LAT0_DEG: f64 = 49.0;
const NG_LON0_DEG: f64 = -2.0;
const NG_E0: f64 = 400_000.0;
const NG_N0: f64 = -100_000.0;

/// OSGB36 -> WGS84 Helmert parameters (metres, ppm, arc-seconds).
const HELMERT_TX: f64 = 446.448;
const HELMERT_TY: f64 = -125.157;
const HELMERT_TZ: f64 = 542.060;
const HELMERT_S_PPM: f64 = -20.4894;
const HELMERT_RX_SEC: f64 = 0.1502;
const HELMERT_RY_SEC: f64 = 0.2470;
const HELMERT_RZ_SEC: f64 = 0.8421;

/// Upper bound on meridional arc refinements; converges in a handful.
const MAX_ARC_ITERATIONS: usize = 64;

/// Converts National Grid easting/northing to WGS84 `(lng, lat)` degrees.
#[must_use]
pub fn bng_to_wgs84(easting: f64, northing: f64) -> Coord<f64> {
    let (lat, lon) = osgb36_from_grid(easting, northing);
    let (x, y, z) = to_cartesian(lat, lon, AIRY_A, AIRY_B);
    let (x, y, z) = helmert_osgb36_to_wgs84(x, y, z);
    let (lat, lon) = from_cartesian(x, y, z, WGS84_A, WGS84_B);

    Coord {
        x: lon.to_degrees(),
        y: lat.to_degrees(),
    }
}

/// Inverse transverse Mercator: grid to OSGB36 latitude/longitude in
/// radians.
#[allow(clippy::many_single_char_names, clippy::similar_names)]
fn osgb36_from_grid(easting: f64, northing: f64) -> (f64, f64) {
    let a = AIRY_A;
    let b = AIRY_B;
    let lat0 = NG_LAT0_DEG.to_radians();
    let lon0 = NG_LON0_DEG.to_radians();
    let e2 = 1.0 - (b * b) / (a * a);
    let n = (a - b) / (a + b);
    let n2 = n * n;
    let n3 = n2 * n;

    let mut lat = lat0;
    let mut m = 0.0;
    for _ in 0..MAX_ARC_ITERATIONS {
        lat += (northing - NG_N0 - m) / (a * NG_F0);

        let d = lat - lat0;
        let s = lat + lat0;
        m = b
            * NG_F0
            * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * d
                - (3.0 * n + 3.0 * n2 + 21.0 / 8.0 * n3) * d.sin() * s.cos()
                + (15.0 / 8.0 * n2 + 15.0 / 8.0 * n3) * (2.0 * d).sin() * (2.0 * s).cos()
                - 35.0 / 24.0 * n3 * (3.0 * d).sin() * (3.0 * s).cos());

        if (northing - NG_N0 - m).abs() < 0.000_01 {
            break;
        }
    }

    let sin_lat = lat.sin();
    let nu = a * NG_F0 / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let rho = a * NG_F0 * (1.0 - e2) / (1.0 - e2 * sin_lat * sin_lat).powf(1.5);
    let eta2 = nu / rho - 1.0;

    let t = lat.tan();
    let t2 = t * t;
    let t4 = t2 * t2;
    let t6 = t4 * t2;
    let sec = 1.0 / lat.cos();
    let nu3 = nu.powi(3);
    let nu5 = nu.powi(5);
    let nu7 = nu.powi(7);

    let vii = t / (2.0 * rho * nu);
    let viii = t / (24.0 * rho * nu3) * (5.0 + 3.0 * t2 + eta2 - 9.0 * t2 * eta2);
    let ix = t / (720.0 * rho * nu5) * (61.0 + 90.0 * t2 + 45.0 * t4);
    let x = sec / nu;
    let xi = sec / (6.0 * nu3) * (nu / rho + 2.0 * t2);
    let xii = sec / (120.0 * nu5) * (5.0 + 28.0 * t2 + 24.0 * t4);
    let xiia = sec / (5040.0 * nu7) * (61.0 + 662.0 * t2 + 1320.0 * t4 + 720.0 * t6);

    let de = easting - NG_E0;
    let de2 = de * de;
    let de3 = de2 * de;
    let de4 = de2 * de2;
    let de5 = de4 * de;
    let de6 = de3 * de3;
    let de7 = de6 * de;

    let lat = lat - vii * de2 + viii * de4 - ix * de6;
    let lon = lon0 + x * de - xi * de3 + xii * de5 - xiia * de7;

    (lat, lon)
}

fn to_cartesian(lat: f64, lon: f64, a: f64, b: f64) -> (f64, f64, f64) {
    let e2 = 1.0 - (b * b) / (a * a);
    let sin_lat = lat.sin();
    let nu = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    (
        nu * lat.cos() * lon.cos(),
        nu * lat.cos() * lon.sin(),
        (1.0 - e2) * nu * sin_lat,
    )
}

#[allow(clippy::many_single_char_names)]
fn helmert_osgb36_to_wgs84(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let s = 1.0 + HELMERT_S_PPM * 1e-6;
    let rx = (HELMERT_RX_SEC / 3600.0).to_radians();
    let ry = (HELMERT_RY_SEC / 3600.0).to_radians();
    let rz = (HELMERT_RZ_SEC / 3600.0).to_radians();

    (
        HELMERT_TX + s * x - rz * y + ry * z,
        HELMERT_TY + rz * x + s * y - rx * z,
        HELMERT_TZ - ry * x + rx * y + s * z,
    )
}

fn from_cartesian(x: f64, y: f64, z: f64, a: f64, b: f64) -> (f64, f64) {
    let e2 = 1.0 - (b * b) / (a * a);
    let p = x.hypot(y);

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let sin_lat = lat.sin();
        let nu = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let next = (z + e2 * nu * sin_lat).atan2(p);
        let done = (next - lat).abs() < 1e-12;
        lat = next;
        if done {
            break;
        }
    }

    (lat, y.atan2(x))
}

// ============================================================
// Web Mercator
// ============================================================

/// Converts spherical Web Mercator metres to WGS84 `(lng, lat)` degrees.
#[must_use]
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> Coord<f64> {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    Coord { x: lon, y: lat }
}
