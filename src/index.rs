//! Normalized-difference indices.

use crate::error::Result;
use crate::image::Image;
use crate::raster::Raster;

/// `(a - b) / (a + b)`. No-data where either input is no-data or the sum is zero.
pub fn normalized_difference(a: &Raster, b: &Raster) -> Result<Raster> {
    a.zip_with(b, |a, b| {
        let sum = a + b;
        if a.is_nan() || b.is_nan() || sum == 0.0 {
            f32::NAN
        } else {
            (a - b) / sum
        }
    })
}

/// Modified Normalized Difference Water Index (Xu, 2006): `(Green - SWIR) / (Green + SWIR)`.
/// Open water is positive, sand and bare soil negative.
pub fn mndwi(green: &Raster, swir: &Raster) -> Result<Raster> {
    normalized_difference(green, swir)
}

impl Image {
    /// Normalized difference of two named bands, e.g. `["B3", "B11"]` for MNDWI.
    pub fn normalized_difference(&self, bands: [&str; 2]) -> Result<Raster> {
        normalized_difference(self.band(bands[0])?, self.band(bands[1])?)
    }
}
