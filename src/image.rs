use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::raster::{Grid, Raster};

/// A scene loaded into memory: named bands sharing one grid.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: String,
    pub date: NaiveDate,
    bands: BTreeMap<String, Raster>,
}

impl Image {
    pub fn new(id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            date,
            bands: BTreeMap::new(),
        }
    }

    /// Adds or replaces a band. The first band fixes the grid of the image.
    pub fn add_band(&mut self, name: impl Into<String>, raster: Raster) -> Result<()> {
        if let Some(first) = self.bands.values().next() {
            first.check_grid(&raster)?;
        }
        self.bands.insert(name.into(), raster);
        Ok(())
    }

    pub fn with_band(mut self, name: impl Into<String>, raster: Raster) -> Result<Self> {
        self.add_band(name, raster)?;
        Ok(self)
    }

    pub fn band(&self, name: &str) -> Result<&Raster> {
        self.bands.get(name).ok_or_else(|| Error::MissingBand {
            image: self.id.clone(),
            band: name.to_string(),
        })
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.bands.values().next().map(|r| &r.grid)
    }

    /// Sets every band to no-data where `valid` is false. Valid pixels are untouched.
    pub fn update_mask(&mut self, valid: &[bool]) {
        for raster in self.bands.values_mut() {
            for (value, &keep) in raster.data.iter_mut().zip(valid) {
                if !keep {
                    *value = f32::NAN;
                }
            }
        }
    }

    /// Divides every band by `divisor`, e.g. 10000 to get surface reflectance.
    pub fn divide(&mut self, divisor: f32) {
        for raster in self.bands.values_mut() {
            for value in raster.data.iter_mut() {
                *value /= divisor;
            }
        }
    }
}
