use serde::{Deserialize, Serialize};

/// Rectangular area of interest in WGS84 longitude/latitude degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Bbox {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self, String> {
        if !(-180.0..=180.0).contains(&xmin) || !(-180.0..=180.0).contains(&xmax) {
            return Err("Longitude values must be between -180 and 180".to_string());
        }

        if !(-90.0..=90.0).contains(&ymin) || !(-90.0..=90.0).contains(&ymax) {
            return Err("Latitude values must be between -90 and 90".to_string());
        }

        if xmin > xmax || ymin > ymax {
            return Err("Min values must be <= max values".to_string());
        }

        Ok(Bbox {
            xmin,
            xmax,
            ymin,
            ymax,
        })
    }

    /// Builds a box from two opposite corners given as `[lon, lat]`, in any order.
    pub fn from_corners(a: [f64; 2], b: [f64; 2]) -> Result<Self, String> {
        Bbox::new(a[0].min(b[0]), a[0].max(b[0]), a[1].min(b[1]), a[1].max(b[1]))
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.xmin..=self.xmax).contains(&x) && (self.ymin..=self.ymax).contains(&y)
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.xmin <= other.xmax
            && other.xmin <= self.xmax
            && self.ymin <= other.ymax
            && other.ymin <= self.ymax
    }

    /// Same rectangle expressed in another planar coordinate space. No range checks apply.
    pub(crate) fn projected(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Bbox {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }
}
