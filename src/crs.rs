//! Coordinate reference systems of scene rasters.
//!
//! Areas of interest are always given in WGS84 degrees. Sentinel-2 tiles are
//! delivered in UTM (EPSG 326xx / 327xx), so the AOI is projected into the
//! raster CRS before windows are computed. The projection follows Snyder
//! (1987), USGS Professional Paper 1395, pp. 61-64.

use gdal::Dataset;
use std::fmt;

use crate::bbox::Bbox;
use crate::error::{Error, Result};

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Metres per degree of latitude, used to turn an export scale into degrees.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    Utm { zone: u32, north: bool },
    Other(u32),
    /// No spatial reference attached: coordinates are used as-is and cells are
    /// treated as planar metres.
    Undefined,
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Self {
        match epsg {
            4326 => Crs::Wgs84,
            32601..=32660 => Crs::Utm {
                zone: epsg - 32600,
                north: true,
            },
            32701..=32760 => Crs::Utm {
                zone: epsg - 32700,
                north: false,
            },
            other => Crs::Other(other),
        }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        match dataset.spatial_ref() {
            Ok(srs) => match srs.auth_code() {
                Ok(code) if code > 0 => Crs::from_epsg(code as u32),
                _ => Crs::Undefined,
            },
            Err(_) => Crs::Undefined,
        }
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Wgs84 => Some(4326),
            Crs::Utm { zone, north: true } => Some(32600 + zone),
            Crs::Utm { zone, north: false } => Some(32700 + zone),
            Crs::Other(code) => Some(*code),
            Crs::Undefined => None,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// WGS84 (lon, lat) to coordinates of this CRS.
    pub fn from_wgs84(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        match *self {
            Crs::Wgs84 | Crs::Undefined => Ok((lon, lat)),
            Crs::Utm { zone, north } => Ok(wgs84_to_utm(lon, lat, zone, north)),
            Crs::Other(code) => Err(Error::UnsupportedCrs(format!("EPSG:{}", code))),
        }
    }

    /// Coordinates of this CRS to WGS84 (lon, lat).
    pub fn to_wgs84(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match *self {
            Crs::Wgs84 | Crs::Undefined => Ok((x, y)),
            Crs::Utm { zone, north } => Ok(utm_to_wgs84(x, y, zone, north)),
            Crs::Other(code) => Err(Error::UnsupportedCrs(format!("EPSG:{}", code))),
        }
    }

    /// Coordinates of this CRS to coordinates of `target`, through WGS84.
    pub fn transform(&self, target: &Crs, x: f64, y: f64) -> Result<(f64, f64)> {
        if self == target {
            return Ok((x, y));
        }
        let (lon, lat) = self.to_wgs84(x, y)?;
        target.from_wgs84(lon, lat)
    }

    /// Envelope of a WGS84 box in this CRS.
    pub fn project_bbox(&self, bbox: &Bbox) -> Result<Bbox> {
        if matches!(self, Crs::Wgs84 | Crs::Undefined) {
            return Ok(*bbox);
        }

        // All four corners, since UTM is not axis-aligned with lon/lat
        let corners = [
            (bbox.xmin, bbox.ymin),
            (bbox.xmin, bbox.ymax),
            (bbox.xmax, bbox.ymin),
            (bbox.xmax, bbox.ymax),
        ];

        let mut min_e = f64::MAX;
        let mut min_n = f64::MAX;
        let mut max_e = f64::MIN;
        let mut max_n = f64::MIN;

        for (lon, lat) in corners {
            let (e, n) = self.from_wgs84(lon, lat)?;
            min_e = min_e.min(e);
            min_n = min_n.min(n);
            max_e = max_e.max(e);
            max_n = max_n.max(n);
        }

        Ok(Bbox::projected(min_e, max_e, min_n, max_n))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epsg() {
            Some(code) => write!(f, "EPSG:{}", code),
            None => write!(f, "undefined"),
        }
    }
}

/// WGS84 (lon, lat) in degrees to UTM (easting, northing) in metres.
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// UTM (easting, northing) in metres to WGS84 (lon, lat) in degrees, by the
/// footpoint latitude series.
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / (denom * denom.sqrt());
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d4 = d2 * d2;
    let d6 = d4 * d2;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d2 * d / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d4
                * d
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
