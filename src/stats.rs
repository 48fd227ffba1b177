use std::fmt;

use crate::bbox::Bbox;
use crate::error::Result;
use crate::raster::Raster;

const M2_PER_HECTARE: f64 = 10_000.0;

/// Sum of `value * pixel area` over the AOI, in hectares. For a 0/1 mask this
/// is the flagged area. No-data pixels and pixels centred outside the AOI
/// (WGS84) do not contribute.
pub fn area_hectares(mask: &Raster, aoi: &Bbox) -> Result<f64> {
    let inside = mask.grid.aoi_mask(aoi)?;
    let width = mask.width() as usize;
    let mut total_m2 = 0.0;

    for y in 0..mask.height() {
        let cell_area = mask.grid.pixel_area_m2(y);
        let row = y as usize * width;
        for x in 0..width {
            let value = mask.data[row + x];
            if !inside[row + x] || value.is_nan() || value == 0.0 {
                continue;
            }
            total_m2 += value as f64 * cell_area;
        }
    }

    Ok(total_m2 / M2_PER_HECTARE)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub valid: usize,
    pub total: usize,
}

pub fn summary(raster: &Raster) -> Summary {
    let valid: Vec<f32> = raster.data.iter().copied().filter(|v| !v.is_nan()).collect();

    Summary {
        // f32::min/max skip NaN, so an empty fold stays NaN
        min: valid.iter().fold(f32::NAN, |a, &b| a.min(b)),
        max: valid.iter().fold(f32::NAN, |a, &b| a.max(b)),
        mean: if valid.is_empty() {
            f32::NAN
        } else {
            valid.iter().sum::<f32>() / valid.len() as f32
        },
        valid: valid.len(),
        total: raster.data.len(),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = if self.total == 0 {
            0.0
        } else {
            100.0 * self.valid as f32 / self.total as f32
        };
        write!(
            f,
            "  Min: {:.3}\n  Max: {:.3}\n  Mean: {:.3}\n  Valid pixels: {} / {} ({:.1}%)",
            self.min, self.max, self.mean, self.valid, self.total, percent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{Crs, wgs84_to_utm};
    use crate::raster::Grid;

    fn aoi() -> Bbox {
        Bbox::new(79.8, 79.9, 18.7, 18.9).unwrap()
    }

    /// 3x3 10 m grid centred on the middle of the AOI, in UTM 44N.
    fn grid_in_aoi() -> Grid {
        let (e, n) = wgs84_to_utm(79.85, 18.8, 44, true);
        Grid::new(3, 3, [e - 15.0, 10.0, 0.0, n + 15.0, 0.0, -10.0], Crs::from_epsg(32644))
    }

    #[test]
    fn test_single_pixel_is_one_hundredth_hectare() {
        let mut data = vec![0.0; 9];
        data[4] = 1.0;
        let mask = Raster::new(grid_in_aoi(), data).unwrap();

        let area = area_hectares(&mask, &aoi()).unwrap();
        assert!((area - 0.01).abs() < 1e-9, "area {area}");
    }

    #[test]
    fn test_nodata_and_outside_pixels_ignored() {
        let mut data = vec![1.0; 9];
        data[0] = f32::NAN;
        let mask = Raster::new(grid_in_aoi(), data).unwrap();
        assert!((area_hectares(&mask, &aoi()).unwrap() - 0.08).abs() < 1e-9);

        let far = Bbox::new(10.0, 10.1, 10.0, 10.1).unwrap();
        assert_eq!(area_hectares(&mask, &far).unwrap(), 0.0);
    }

    #[test]
    fn test_pixel_in_projected_envelope_but_outside_aoi() {
        let utm = Crs::from_epsg(32644);
        let envelope = utm.project_bbox(&aoi()).unwrap();

        // North-west corner of the envelope lies west of 79.8 E at 18.9 N
        let grid = Grid::new(
            1,
            1,
            [envelope.xmin, 10.0, 0.0, envelope.ymax, 0.0, -10.0],
            utm,
        );
        let mask = Raster::new(grid, vec![1.0]).unwrap();

        assert!(envelope.contains(envelope.xmin + 5.0, envelope.ymax - 5.0));
        assert_eq!(area_hectares(&mask, &aoi()).unwrap(), 0.0);
        assert!(mask.clip(&aoi()).unwrap().data[0].is_nan());
    }

    #[test]
    fn test_summary_all_nodata() {
        let raster = Raster::new(grid_in_aoi(), vec![f32::NAN; 9]).unwrap();
        let s = summary(&raster);
        assert!(s.min.is_nan());
        assert!(s.max.is_nan());
        assert!(s.mean.is_nan());
        assert_eq!(s.valid, 0);
    }

    #[test]
    fn test_summary() {
        let raster = Raster::new(grid_in_aoi(), vec![
            -0.5,
            0.5,
            f32::NAN,
            0.0,
            1.0,
            f32::NAN,
            f32::NAN,
            f32::NAN,
            f32::NAN,
        ])
        .unwrap();

        let s = summary(&raster);
        assert_eq!(s.min, -0.5);
        assert_eq!(s.max, 1.0);
        assert_eq!(s.mean, 0.25);
        assert_eq!(s.valid, 4);
        assert_eq!(s.total, 9);
    }
}
