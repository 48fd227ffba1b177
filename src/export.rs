//! Raster export to GeoTIFF.
//!
//! An export resamples the result onto a fresh grid covering the requested
//! region at the requested scale, refuses grids above the pixel cap, and
//! writes a single-band float GeoTIFF with NaN as no-data.

use chrono::{DateTime, Utc};
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::bbox::Bbox;
use crate::crs::{Crs, METERS_PER_DEGREE};
use crate::raster::{Grid, Raster};
use crate::visualize::PaletteError;

/// Pixel cap applied when a request does not set one.
pub const DEFAULT_MAX_PIXELS: f64 = 1e8;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export of {pixels} pixels exceeds max_pixels {max_pixels}")]
    TooManyPixels { pixels: u64, max_pixels: f64 },

    #[error("export region is empty at scale {0} m")]
    EmptyRegion(f64),

    #[error("invalid export region: {0}")]
    Region(String),

    #[error(transparent)]
    Palette(#[from] PaletteError),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileFormat {
    #[default]
    GeoTIFF,
}

impl FileFormat {
    fn driver(&self) -> &'static str {
        match self {
            FileFormat::GeoTIFF => "GTiff",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            FileFormat::GeoTIFF => "tif",
        }
    }
}

/// Export parameters as written in the configuration. The region is the AOI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportSettings {
    pub description: String,
    #[serde(default = "default_folder")]
    pub folder: PathBuf,
    #[serde(default)]
    pub file_name_prefix: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: f64,
    #[serde(default, alias = "fileFormat")]
    pub file_format: FileFormat,
    /// EPSG code of the output; defaults to the CRS of the data.
    #[serde(default)]
    pub crs: Option<u32>,
    /// Also export the before and after index composites.
    #[serde(default)]
    pub composites: bool,
}

fn default_folder() -> PathBuf {
    PathBuf::from("./output")
}

fn default_scale() -> f64 {
    10.0
}

fn default_max_pixels() -> f64 {
    DEFAULT_MAX_PIXELS
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub settings: ExportSettings,
    pub region: Bbox,
}

impl ExportRequest {
    pub fn new(settings: ExportSettings, region: Bbox) -> Self {
        Self { settings, region }
    }

    pub fn path(&self) -> PathBuf {
        let stem = self
            .settings
            .file_name_prefix
            .as_deref()
            .unwrap_or(&self.settings.description);
        self.settings
            .folder
            .join(format!("{}.{}", stem, self.settings.file_format.extension()))
    }

    /// Same request writing `<stem>_<suffix>`, e.g. the before composite.
    pub fn with_suffix(&self, suffix: &str) -> ExportRequest {
        let mut settings = self.settings.clone();
        let stem = settings
            .file_name_prefix
            .as_deref()
            .unwrap_or(&settings.description);
        settings.file_name_prefix = Some(format!("{}_{}", stem, suffix));
        settings.description = format!("{}_{}", settings.description, suffix);
        ExportRequest::new(settings, self.region)
    }

    /// Output grid for data stored in `source` CRS. The requested CRS, if
    /// any, replaces the source one.
    pub fn output_grid(&self, source: Crs) -> Result<Grid, ExportError> {
        let crs = self.settings.crs.map(Crs::from_epsg).unwrap_or(source);

        let region = crs
            .project_bbox(&self.region)
            .map_err(|e| ExportError::Region(e.to_string()))?;

        let scale = self.settings.scale;
        if scale <= 0.0 {
            return Err(ExportError::EmptyRegion(scale));
        }
        let pixel_size = if crs.is_geographic() {
            scale / METERS_PER_DEGREE
        } else {
            scale
        };

        let width = (region.width() / pixel_size).ceil() as u64;
        let height = (region.height() / pixel_size).ceil() as u64;
        if width == 0 || height == 0 {
            return Err(ExportError::EmptyRegion(scale));
        }

        let pixels = width * height;
        if pixels as f64 > self.settings.max_pixels {
            return Err(ExportError::TooManyPixels {
                pixels,
                max_pixels: self.settings.max_pixels,
            });
        }

        Ok(Grid::new(
            width as u32,
            height as u32,
            [region.xmin, pixel_size, 0.0, region.ymax, 0.0, -pixel_size],
            crs,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Completed,
}

/// Record of a finished export.
#[derive(Debug, Clone)]
pub struct ExportTask {
    /// `<description>_<start time>`, unique per run.
    pub id: String,
    pub description: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub started_at: DateTime<Utc>,
    pub state: TaskState,
}

impl fmt::Display for ExportTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}) -> {} [{:?}]",
            self.id,
            self.width,
            self.height,
            self.path.display(),
            self.state
        )
    }
}

/// Resamples `raster` onto the request grid, reprojecting when the request
/// names another CRS, and writes it.
pub fn export_image(raster: &Raster, request: &ExportRequest) -> Result<ExportTask, ExportError> {
    let started_at = Utc::now();
    let grid = request.output_grid(raster.grid.crs)?;
    let output = raster
        .reproject(&grid)
        .map_err(|e| ExportError::Region(e.to_string()))?;

    let path = request.path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_geotiff(&output, &path, request.settings.file_format)?;

    info!(
        "✓ Exported {} ({}x{}) to: {}",
        request.settings.description,
        grid.width,
        grid.height,
        path.display()
    );

    Ok(ExportTask {
        id: format!(
            "{}_{}",
            request.settings.description,
            started_at.format("%Y%m%dT%H%M%S")
        ),
        description: request.settings.description.clone(),
        path,
        width: grid.width,
        height: grid.height,
        started_at,
        state: TaskState::Completed,
    })
}

/// In-memory GDAL dataset holding one float band.
pub(crate) fn to_mem_dataset(raster: &Raster) -> Result<Dataset, ExportError> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let width = raster.width() as usize;
    let height = raster.height() as usize;

    let mut dataset = driver.create_with_band_type::<f32, _>("", width, height, 1)?;
    dataset.set_geo_transform(&raster.grid.geo_transform)?;
    if let Some(epsg) = raster.grid.crs.epsg() {
        let srs = SpatialRef::from_epsg(epsg)?;
        dataset.set_spatial_ref(&srs)?;
    }

    {
        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(Some(f64::NAN))?;
        let mut buffer = Buffer::new((width, height), raster.data.clone());
        band.write((0, 0), (width, height), &mut buffer)?;
    }

    Ok(dataset)
}

pub fn write_geotiff(raster: &Raster, path: &Path, format: FileFormat) -> Result<(), ExportError> {
    let dataset = to_mem_dataset(raster)?;
    let driver = DriverManager::get_driver_by_name(format.driver())?;
    let mut options = CslStringList::new();
    options.set_name_value("COMPRESS", "DEFLATE")?;
    let _saved_dataset = dataset.create_copy(&driver, path, &options)?;
    Ok(())
}
