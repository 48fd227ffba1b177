//! Scenes stored on disk and the filters applied before any pixel is read.
//!
//! Each scene lives in its own directory with a `scene.json` manifest:
//!
//! ```json
//! {
//!   "id": "S2A_MSIL1C_20230410_T44QKE",
//!   "date": "2023-04-10",
//!   "cloudy_pixel_percentage": 1.8,
//!   "bands": { "B3": "B03.tif", "B11": "B11.tif", "QA60": "QA60.tif" }
//! }
//! ```
//!
//! Bands missing from `bands` are looked up in the scene directory by file
//! name (`*_B03.tif`, `*_B03_10m.jp2`, ...).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bbox::Bbox;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::{Grid, Raster};
use crate::readers::{self, ReadError};

pub const MANIFEST_FILE: &str = "scene.json";

const BAND_EXTENSIONS: [&str; 3] = ["tif", "tiff", "jp2"];

/// Start-inclusive, end-exclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub id: String,
    pub date: NaiveDate,
    pub cloudy_pixel_percentage: f64,
    /// WGS84 footprint, if known. Otherwise derived from the band grid.
    #[serde(default)]
    pub bounds: Option<Bbox>,
    #[serde(default)]
    pub bands: HashMap<String, PathBuf>,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Scene {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Scene> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut scene: Scene = serde_json::from_reader(reader).map_err(|source| Error::Manifest {
            path: path.display().to_string(),
            source,
        })?;
        scene.dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(scene)
    }

    /// File holding `band`, from the manifest or by name in the scene directory.
    pub fn band_path(&self, band: &str) -> Result<PathBuf> {
        if let Some(file) = self.bands.get(band) {
            return Ok(self.dir.join(file));
        }

        let escaped_dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        for name in band_file_names(band) {
            for ext in BAND_EXTENSIONS {
                for pattern in [
                    format!("{}/*{}.{}", escaped_dir, name, ext),
                    format!("{}/*{}_*.{}", escaped_dir, name, ext),
                    format!("{}/{}.{}", escaped_dir, name, ext),
                ] {
                    let Ok(paths) = glob::glob(&pattern) else {
                        continue;
                    };
                    if let Some(path) = paths.filter_map(|p| p.ok()).next() {
                        return Ok(path);
                    }
                }
            }
        }

        Err(Error::MissingBand {
            image: self.id.clone(),
            band: band.to_string(),
        })
    }

    fn open_band(&self, band: &str) -> Result<Box<dyn readers::DataReader>> {
        let path = self.band_path(band)?;
        readers::create_reader(path.clone()).map_err(|e| {
            Error::Read(ReadError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Whether the scene footprint overlaps `aoi`. Without a footprint in the
    /// manifest, the AOI is tested against the grid of `band`.
    pub fn intersects(&self, aoi: &Bbox, band: &str) -> Result<bool> {
        if let Some(bounds) = &self.bounds {
            return Ok(bounds.intersects(aoi));
        }

        let grid = self.open_band(band)?.grid()?;
        let region = grid.crs.project_bbox(aoi)?;
        Ok(grid.window(&region).is_some())
    }

    /// Grid covering `aoi` on the pixel lattice and CRS of `band`, whether or
    /// not this scene reaches every part of it.
    pub fn aoi_grid(&self, aoi: &Bbox, band: &str) -> Result<Grid> {
        let grid = self.open_band(band)?.grid()?;
        let region = grid.crs.project_bbox(aoi)?;
        grid.covering(&region)
            .ok_or_else(|| Error::OutsideAoi(format!("{} band {}", self.id, band)))
    }

    /// Reads `bands` cropped to `aoi`. Every band is resampled onto `target`
    /// when given, otherwise onto the grid of the first band.
    pub fn load(&self, aoi: &Bbox, bands: &[&str], target: Option<&Grid>) -> Result<Image> {
        let mut image = Image::new(self.id.clone(), self.date);
        let mut reference = target.copied();

        for &band in bands {
            let raster = self.read_band(band, aoi)?;
            let grid = match reference {
                Some(grid) => grid,
                None => {
                    reference = Some(raster.grid);
                    raster.grid
                }
            };

            if grid.crs != raster.grid.crs {
                return Err(Error::GridMismatch {
                    expected: grid.to_string(),
                    actual: raster.grid.to_string(),
                });
            }

            image.add_band(band, raster.resample(&grid))?;
        }

        debug!(scene = %self.id, bands = bands.len(), "loaded scene");
        Ok(image)
    }

    fn read_band(&self, band: &str, aoi: &Bbox) -> Result<Raster> {
        let reader = self.open_band(band)?;
        let grid = reader.grid()?;
        let region = grid.crs.project_bbox(aoi)?;
        let window = grid
            .window(&region)
            .ok_or_else(|| Error::OutsideAoi(format!("{} band {}", self.id, band)))?;
        Ok(reader.read(Some(window))?)
    }
}

/// `B3` is stored as `B03` in Sentinel-2 products.
fn band_file_names(band: &str) -> Vec<String> {
    let mut names = vec![band.to_string()];
    if let Some(number) = band.strip_prefix('B')
        && number.len() == 1
        && number.chars().all(|c| c.is_ascii_digit())
    {
        names.push(format!("B0{}", number));
    }
    names
}

/// All scenes found under a directory.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    scenes: Vec<Scene>,
}

impl ImageCollection {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    /// Recursively collects every `scene.json` under `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("catalog directory {} not found", dir.display()),
            )));
        }

        let mut scenes = Vec::new();
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
                scenes.push(Scene::from_file(entry.path())?);
            }
        }
        scenes.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        info!(
            "Found {} scenes in catalog {}",
            scenes.len(),
            dir.display()
        );
        Ok(Self { scenes })
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn filter_date(&self, range: &DateRange) -> Self {
        self.filter(|s| range.contains(s.date))
    }

    /// Keeps scenes with strictly less than `max_percentage` cloudy pixels.
    pub fn filter_cloud_cover(&self, max_percentage: f64) -> Self {
        self.filter(|s| s.cloudy_pixel_percentage < max_percentage)
    }

    /// Keeps scenes overlapping `aoi`, judged on `band` when a manifest has no
    /// footprint. Scenes whose band cannot be opened are dropped with a warning.
    pub fn filter_bounds(&self, aoi: &Bbox, band: &str) -> Self {
        self.filter(|s| match s.intersects(aoi, band) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(scene = %s.id, "dropping scene: {}", e);
                false
            }
        })
    }

    fn filter<F>(&self, keep: F) -> Self
    where
        F: Fn(&Scene) -> bool,
    {
        Self {
            scenes: self.scenes.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// Loads every scene onto one grid covering the whole AOI, on the pixel
    /// lattice of the first scene's first band. Tiles then mosaic through the
    /// composite. Scenes that miss the AOI are skipped with a warning.
    pub fn load(&self, aoi: &Bbox, bands: &[&str]) -> Result<Vec<Image>> {
        let Some(&reference_band) = bands.first() else {
            return Ok(Vec::new());
        };

        let mut target: Option<Grid> = None;
        let mut images = Vec::with_capacity(self.scenes.len());
        for scene in &self.scenes {
            let grid = match target {
                Some(grid) => grid,
                None => {
                    let grid = scene.aoi_grid(aoi, reference_band)?;
                    debug!("AOI grid {}", grid);
                    *target.insert(grid)
                }
            };

            match scene.load(aoi, bands, Some(&grid)) {
                Ok(image) => images.push(image),
                Err(Error::OutsideAoi(what)) => {
                    warn!(scene = %scene.id, "skipping scene: {} misses the AOI", what);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(images)
    }
}
