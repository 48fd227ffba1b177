use gdal::Dataset;
use std::path::PathBuf;

use super::{DataReader, ReadError};
use crate::crs::Crs;
use crate::raster::{Grid, Raster, Window};

/// First band of a GDAL-readable raster file.
pub struct GeoTiffReader {
    pub path: PathBuf,
}

impl GeoTiffReader {
    fn open(&self) -> Result<Dataset, ReadError> {
        Dataset::open(&self.path).map_err(|e| ReadError::Open {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn read_error(&self, e: impl ToString) -> ReadError {
        ReadError::Read {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    fn grid_of(&self, dataset: &Dataset) -> Result<Grid, ReadError> {
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset.geo_transform().map_err(|e| self.read_error(e))?;
        if geo_transform[2] != 0.0 || geo_transform[4] != 0.0 {
            return Err(self.read_error("rotated geotransforms are not supported"));
        }

        Ok(Grid::new(
            width as u32,
            height as u32,
            geo_transform,
            Crs::from_dataset(dataset),
        ))
    }
}

impl DataReader for GeoTiffReader {
    fn grid(&self) -> Result<Grid, ReadError> {
        let dataset = self.open()?;
        self.grid_of(&dataset)
    }

    fn read(&self, window: Option<Window>) -> Result<Raster, ReadError> {
        let dataset = self.open()?;
        let full = self.grid_of(&dataset)?;

        let window = window.unwrap_or(Window {
            x: 0,
            y: 0,
            width: full.width,
            height: full.height,
        });
        if window.x + window.width > full.width || window.y + window.height > full.height {
            return Err(ReadError::Window {
                path: self.path.display().to_string(),
                window,
            });
        }

        let band = dataset.rasterband(1).map_err(|e| self.read_error(e))?;
        let size = (window.width as usize, window.height as usize);
        let buffer = band
            .read_as::<f32>((window.x as isize, window.y as isize), size, size, None)
            .map_err(|e| self.read_error(e))?;

        let scale = band.scale().unwrap_or(1.0) as f32;
        let offset = band.offset().unwrap_or(0.0) as f32;
        let missing_value = band.no_data_value();

        let data: Vec<f32> = buffer
            .data()
            .iter()
            .map(|&raw| {
                if raw.is_nan() || missing_value.is_some_and(|mv| raw == mv as f32) {
                    f32::NAN
                } else {
                    raw * scale + offset
                }
            })
            .collect();

        Raster::new(full.subgrid(&window), data).map_err(|e| self.read_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::to_mem_dataset;
    use crate::raster::tests::raster;
    use gdal::DriverManager;
    use gdal::cpl::CslStringList;
    use tempfile::tempdir;

    #[test]
    fn test_read_applies_scale_and_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("B03.tif");

        // L2A digital numbers with the 1e-4 scale and -0.1 offset of recent baselines
        let dn = raster(3, 1, vec![1000.0, 3000.0, f32::NAN]);
        let dataset = to_mem_dataset(&dn).unwrap();
        {
            let mut band = dataset.rasterband(1).unwrap();
            band.set_scale(1e-4).unwrap();
            band.set_offset(-0.1).unwrap();
        }
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        dataset
            .create_copy(&driver, &path, &CslStringList::new())
            .unwrap();

        let reflectance = GeoTiffReader { path }.read(None).unwrap();
        assert!((reflectance.data[0] - 0.0).abs() < 1e-6);
        assert!((reflectance.data[1] - 0.2).abs() < 1e-6);
        assert!(reflectance.data[2].is_nan());
    }

    #[test]
    fn test_read_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("B11.tif");
        let dataset = to_mem_dataset(&raster(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        dataset
            .create_copy(&driver, &path, &CslStringList::new())
            .unwrap();

        let reader = GeoTiffReader { path };
        let window = Window {
            x: 1,
            y: 1,
            width: 2,
            height: 1,
        };
        let part = reader.read(Some(window)).unwrap();
        assert_eq!(part.data, vec![5.0, 6.0]);
        assert_eq!(part.grid.geo_transform[0], 600_010.0);

        let outside = Window { x: 2, ..window };
        assert!(matches!(reader.read(Some(outside)), Err(ReadError::Window { .. })));
    }
}
