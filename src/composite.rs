//! Temporal median compositing.

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::Raster;

/// Where the index is computed relative to the median reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOrder {
    /// Index per image, then the median of the index values.
    #[default]
    IndexThenMedian,
    /// Median of every reflectance band, then the index of the composite.
    MedianThenIndex,
}

/// Median of the valid values, averaging the two middle values for an even count.
fn median_of(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Per-pixel median across `rasters`, ignoring no-data. Pixels without any
/// valid observation stay no-data.
pub fn median(rasters: &[Raster]) -> Result<Raster> {
    let first = rasters
        .first()
        .ok_or_else(|| Error::EmptyCollection("median of zero rasters".to_string()))?;
    for raster in &rasters[1..] {
        first.check_grid(raster)?;
    }

    let mut stack = Vec::with_capacity(rasters.len());
    let data = (0..first.data.len())
        .map(|i| {
            stack.clear();
            stack.extend(rasters.iter().map(|r| r.data[i]).filter(|v| !v.is_nan()));
            median_of(&mut stack)
        })
        .collect();

    Raster::new(first.grid, data)
}

/// Band-wise median of a collection of images.
pub fn median_image(images: &[Image], bands: &[&str]) -> Result<Image> {
    let first = images
        .first()
        .ok_or_else(|| Error::EmptyCollection("median of zero images".to_string()))?;

    debug!(images = images.len(), ?bands, "computing median composite");

    let mut composite = Image::new(format!("median_{}", first.id), first.date);
    for &band in bands {
        let stack = images
            .iter()
            .map(|image| image.band(band).cloned())
            .collect::<Result<Vec<_>>>()?;
        composite.add_band(band, median(&stack)?)?;
    }

    Ok(composite)
}
