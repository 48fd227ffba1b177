use std::fmt;

use crate::bbox::Bbox;
use crate::crs::Crs;
use crate::error::{Error, Result};

/// Mean Earth radius used for geographic cell areas.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Size, georeferencing and CRS of a raster.
///
/// `geo_transform` uses the GDAL layout:
/// `[origin_x, pixel_width, 0, origin_y, 0, -pixel_height]` (north-up only).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    pub geo_transform: [f64; 6],
    pub crs: Crs,
}

/// Pixel window inside a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Grid {
    pub fn new(width: u32, height: u32, geo_transform: [f64; 6], crs: Crs) -> Self {
        Self {
            width,
            height,
            geo_transform,
            crs,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixel_width(&self) -> f64 {
        self.geo_transform[1]
    }

    pub fn pixel_height(&self) -> f64 {
        self.geo_transform[5].abs()
    }

    /// Map coordinates of the centre of pixel (x, y).
    pub fn pixel_center(&self, x: u32, y: u32) -> (f64, f64) {
        let gt = &self.geo_transform;
        (
            gt[0] + (x as f64 + 0.5) * gt[1],
            gt[3] + (y as f64 + 0.5) * gt[5],
        )
    }

    /// Fractional pixel coordinates of a map position.
    pub fn to_pixel(&self, mx: f64, my: f64) -> (f64, f64) {
        let gt = &self.geo_transform;
        ((mx - gt[0]) / gt[1], (my - gt[3]) / gt[5])
    }

    /// Pixel window covering `region`, given in this grid's coordinates.
    /// Returns `None` when the region misses the grid entirely.
    pub fn window(&self, region: &Bbox) -> Option<Window> {
        let gt = &self.geo_transform;

        let min_x = ((region.xmin - gt[0]) / gt[1]).floor() as i64;
        let max_x = ((region.xmax - gt[0]) / gt[1]).ceil() as i64;
        let min_y = ((region.ymax - gt[3]) / gt[5]).floor() as i64;
        let max_y = ((region.ymin - gt[3]) / gt[5]).ceil() as i64;

        let start_x = min_x.max(0);
        let end_x = max_x.min(self.width as i64);
        let start_y = min_y.max(0);
        let end_y = max_y.min(self.height as i64);

        if end_x <= start_x || end_y <= start_y {
            return None;
        }

        Some(Window {
            x: start_x as u32,
            y: start_y as u32,
            width: (end_x - start_x) as u32,
            height: (end_y - start_y) as u32,
        })
    }

    /// Grid of a window cut out of this one.
    pub fn subgrid(&self, window: &Window) -> Grid {
        let gt = &self.geo_transform;
        Grid {
            width: window.width,
            height: window.height,
            geo_transform: [
                gt[0] + window.x as f64 * gt[1],
                gt[1],
                0.0,
                gt[3] + window.y as f64 * gt[5],
                0.0,
                gt[5],
            ],
            crs: self.crs,
        }
    }

    /// Grid on the same pixel lattice and CRS whose cells cover `region`
    /// (grid coordinates). Unlike [`Grid::window`] it may extend past this grid.
    pub fn covering(&self, region: &Bbox) -> Option<Grid> {
        let gt = &self.geo_transform;

        let min_x = ((region.xmin - gt[0]) / gt[1]).floor();
        let max_x = ((region.xmax - gt[0]) / gt[1]).ceil();
        let min_y = ((region.ymax - gt[3]) / gt[5]).floor();
        let max_y = ((region.ymin - gt[3]) / gt[5]).ceil();

        if max_x <= min_x || max_y <= min_y {
            return None;
        }

        Some(Grid {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
            geo_transform: [
                gt[0] + min_x * gt[1],
                gt[1],
                0.0,
                gt[3] + min_y * gt[5],
                0.0,
                gt[5],
            ],
            crs: self.crs,
        })
    }

    /// Row-major flags of the pixels whose centre lies inside `aoi` (WGS84).
    pub fn aoi_mask(&self, aoi: &Bbox) -> Result<Vec<bool>> {
        let mut inside = Vec::with_capacity(self.len());
        for y in 0..self.height {
            for x in 0..self.width {
                let (mx, my) = self.pixel_center(x, y);
                let (lon, lat) = self.crs.to_wgs84(mx, my)?;
                inside.push(aoi.contains(lon, lat));
            }
        }
        Ok(inside)
    }

    /// Area of one pixel of row `y` in square metres.
    pub fn pixel_area_m2(&self, y: u32) -> f64 {
        if self.crs.is_geographic() {
            let (_, lat) = self.pixel_center(0, y);
            let half = self.pixel_height() / 2.0;
            let lat_top = (lat + half).to_radians();
            let lat_bottom = (lat - half).to_radians();
            EARTH_RADIUS_M
                * EARTH_RADIUS_M
                * self.pixel_width().to_radians().abs()
                * (lat_top.sin() - lat_bottom.sin()).abs()
        } else {
            (self.pixel_width() * self.pixel_height()).abs()
        }
    }

    fn same_as(&self, other: &Grid) -> bool {
        const EPS: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self
                .geo_transform
                .iter()
                .zip(other.geo_transform.iter())
                .all(|(a, b)| (a - b).abs() <= EPS * a.abs().max(1.0))
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ ({}, {}) res {}x{} {}",
            self.width,
            self.height,
            self.geo_transform[0],
            self.geo_transform[3],
            self.pixel_width(),
            self.pixel_height(),
            self.crs
        )
    }
}

/// Single band of f32 values, row-major. No-data is `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub grid: Grid,
    pub data: Vec<f32>,
}

impl Raster {
    pub fn new(grid: Grid, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(Error::GridMismatch {
                expected: format!("{} values", grid.len()),
                actual: format!("{} values", data.len()),
            });
        }
        Ok(Self { grid, data })
    }

    pub fn width(&self) -> u32 {
        self.grid.width
    }

    pub fn height(&self) -> u32 {
        self.grid.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.grid.width || y >= self.grid.height {
            return None;
        }
        Some(self.data[y as usize * self.grid.width as usize + x as usize])
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if x < self.grid.width && y < self.grid.height {
            let idx = y as usize * self.grid.width as usize + x as usize;
            self.data[idx] = value;
        }
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn map<F>(&self, f: F) -> Raster
    where
        F: Fn(f32) -> f32,
    {
        Raster {
            grid: self.grid,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Pixel-wise combination of two rasters on the same grid.
    pub fn zip_with<F>(&self, other: &Raster, f: F) -> Result<Raster>
    where
        F: Fn(f32, f32) -> f32,
    {
        self.check_grid(other)?;
        Ok(Raster {
            grid: self.grid,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    pub fn check_grid(&self, other: &Raster) -> Result<()> {
        if self.grid.same_as(&other.grid) {
            Ok(())
        } else {
            Err(Error::GridMismatch {
                expected: self.grid.to_string(),
                actual: other.grid.to_string(),
            })
        }
    }

    /// Nearest-neighbour resampling onto `target`. Cells falling outside the
    /// source become no-data.
    pub fn resample(&self, target: &Grid) -> Raster {
        if self.grid.same_as(target) {
            return self.clone();
        }

        let mut data = Vec::with_capacity(target.len());
        for y in 0..target.height {
            for x in 0..target.width {
                let (mx, my) = target.pixel_center(x, y);
                let (px, py) = self.grid.to_pixel(mx, my);
                let value = if px >= 0.0 && py >= 0.0 {
                    self.get(px.floor() as u32, py.floor() as u32)
                } else {
                    None
                };
                data.push(value.unwrap_or(f32::NAN));
            }
        }

        Raster {
            grid: *target,
            data,
        }
    }

    /// Nearest-neighbour resampling onto a grid in any supported CRS.
    pub fn reproject(&self, target: &Grid) -> Result<Raster> {
        if self.grid.crs == target.crs {
            return Ok(self.resample(target));
        }

        let mut data = Vec::with_capacity(target.len());
        for y in 0..target.height {
            for x in 0..target.width {
                let (tx, ty) = target.pixel_center(x, y);
                let (mx, my) = target.crs.transform(&self.grid.crs, tx, ty)?;
                let (px, py) = self.grid.to_pixel(mx, my);
                let value = if px >= 0.0 && py >= 0.0 {
                    self.get(px.floor() as u32, py.floor() as u32)
                } else {
                    None
                };
                data.push(value.unwrap_or(f32::NAN));
            }
        }

        Ok(Raster {
            grid: *target,
            data,
        })
    }

    /// Sets every pixel whose centre falls outside `aoi` (WGS84) to no-data.
    pub fn clip(&self, aoi: &Bbox) -> Result<Raster> {
        let inside = self.grid.aoi_mask(aoi)?;
        let mut out = self.clone();
        for (value, keep) in out.data.iter_mut().zip(inside) {
            if !keep {
                *value = f32::NAN;
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.data.iter().filter(|v| !v.is_nan());
        let (min_value, max_value) = valid.fold((f32::NAN, f32::NAN), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

        write!(
            f,
            "Width: {}\nHeight: {}\nValid pixels: {} / {}\nMin value: {}\nMax value: {}",
            self.grid.width,
            self.grid.height,
            self.valid_count(),
            self.data.len(),
            min_value,
            max_value,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 10 m UTM grid anchored at an arbitrary easting/northing.
    pub(crate) fn utm_grid(width: u32, height: u32) -> Grid {
        Grid::new(
            width,
            height,
            [600_000.0, 10.0, 0.0, 2_080_000.0, 0.0, -10.0],
            Crs::from_epsg(32644),
        )
    }

    pub(crate) fn raster(width: u32, height: u32, data: Vec<f32>) -> Raster {
        Raster::new(utm_grid(width, height), data).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(Raster::new(utm_grid(2, 2), vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_window_clamps_to_grid() {
        let grid = utm_grid(100, 100);
        let region = Bbox::projected(599_950.0, 600_105.0, 2_079_500.0, 2_080_050.0);
        let window = grid.window(&region).unwrap();

        assert_eq!(window.x, 0);
        assert_eq!(window.y, 0);
        assert_eq!(window.width, 11);
        assert_eq!(window.height, 50);

        let sub = grid.subgrid(&window);
        assert_eq!(sub.geo_transform[0], 600_000.0);
        assert_eq!(sub.geo_transform[3], 2_080_000.0);
    }

    #[test]
    fn test_window_outside_grid() {
        let grid = utm_grid(10, 10);
        let region = Bbox::projected(0.0, 10.0, 0.0, 10.0);
        assert!(grid.window(&region).is_none());
    }

    #[test]
    fn test_pixel_area_projected() {
        assert_eq!(utm_grid(1, 1).pixel_area_m2(0), 100.0);
    }

    #[test]
    fn test_pixel_area_geographic() {
        // 0.0001 deg cell at the equator is ~11.1 m on a side
        let grid = Grid::new(1, 1, [0.0, 0.0001, 0.0, 0.00005, 0.0, -0.0001], Crs::Wgs84);
        let area = grid.pixel_area_m2(0);
        assert!((area - 123.6).abs() < 0.5, "area {area}");
    }

    #[test]
    fn test_resample_to_finer_grid() {
        // 20 m source, 10 m target: every source cell covers 2x2 target cells
        let coarse = Grid::new(
            2,
            1,
            [600_000.0, 20.0, 0.0, 2_080_000.0, 0.0, -20.0],
            Crs::from_epsg(32644),
        );
        let src = Raster::new(coarse, vec![1.0, 2.0]).unwrap();
        let out = src.resample(&utm_grid(4, 2));

        assert_eq!(out.data, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_resample_outside_is_nodata() {
        let src = raster(1, 1, vec![5.0]);
        let out = src.resample(&utm_grid(2, 1));
        assert_eq!(out.data[0], 5.0);
        assert!(out.data[1].is_nan());
    }

    #[test]
    fn test_zip_with_grid_mismatch() {
        let a = raster(2, 1, vec![1.0, 2.0]);
        let b = raster(1, 2, vec![1.0, 2.0]);
        assert!(a.zip_with(&b, |x, y| x + y).is_err());
    }

    #[test]
    fn test_clip_masks_outside_pixels() {
        // Left pixel centre sits just inside the western edge, right one just outside
        let grid = utm_grid(2, 1);
        let (lon, lat) = grid.crs.to_wgs84(600_005.0, 2_079_995.0).unwrap();
        let (lon_right, _) = grid.crs.to_wgs84(600_015.0, 2_079_995.0).unwrap();
        let edge = (lon + lon_right) / 2.0;
        let aoi = Bbox::new(lon - 0.01, edge, lat - 0.01, lat + 0.01).unwrap();

        let clipped = raster(2, 1, vec![1.0, 2.0]).clip(&aoi).unwrap();
        assert_eq!(clipped.data[0], 1.0);
        assert!(clipped.data[1].is_nan());
    }

    #[test]
    fn test_covering_extends_past_grid() {
        let grid = utm_grid(10, 10);
        let region = Bbox::projected(599_995.0, 600_205.0, 2_079_900.0, 2_080_010.0);
        let cover = grid.covering(&region).unwrap();

        assert_eq!(cover.geo_transform[0], 599_990.0);
        assert_eq!(cover.geo_transform[3], 2_080_010.0);
        assert_eq!(cover.width, 22);
        assert_eq!(cover.height, 11);
        assert_eq!(cover.crs, grid.crs);
    }

    #[test]
    fn test_reproject_to_geographic() {
        let src = raster(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let (lon, lat) = src.grid.crs.to_wgs84(600_005.0, 2_079_995.0).unwrap();
        // One cell centred on the top-left source pixel
        let target = Grid::new(
            1,
            1,
            [lon - 0.00001, 0.00002, 0.0, lat + 0.00001, 0.0, -0.00002],
            Crs::Wgs84,
        );

        let out = src.reproject(&target).unwrap();
        assert_eq!(out.grid.crs, Crs::Wgs84);
        assert_eq!(out.data, vec![1.0]);
        let unsupported = Grid::new(1, 1, [0.0, 1.0, 0.0, 0.0, 0.0, -1.0], Crs::Other(3857));
        assert!(src.reproject(&unsupported).is_err());
    }
}
