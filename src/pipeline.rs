//! End-to-end change analysis driven by a [`Config`].

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::catalog::{DateRange, ImageCollection};
use crate::change::{ChangeClass, ChangeMethod, class_mask};
use crate::composite::{CompositeOrder, median, median_image};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{ExportRequest, ExportTask, export_image};
use crate::image::Image;
use crate::raster::Raster;
use crate::stats::{Summary, area_hectares, summary};
use crate::visualize::{VisParams, render_png};

/// Area of one change class inside the AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaReport {
    pub label: &'static str,
    pub hectares: f64,
}

impl fmt::Display for AreaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2} ha", self.label, self.hectares)
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    /// Index composite of the before period.
    pub before: Raster,
    /// Index composite of the after period.
    pub after: Raster,
    /// Change raster clipped to the AOI.
    pub change: Raster,
    pub areas: Vec<AreaReport>,
    pub summary: Summary,
    pub export: ExportTask,
    /// Before and after composite exports, when requested.
    pub composite_exports: Vec<ExportTask>,
    pub previews: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Pipeline { config }
    }

    /// Bands read from every scene: the two index bands and the quality band.
    pub fn bands(&self) -> Vec<&str> {
        let mut bands = self.config.index_bands().to_vec();
        let quality = self.config.cloud_mask().band();
        if !bands.contains(&quality) {
            bands.push(quality);
        }
        bands
    }

    /// Reads the catalog, then compares the two periods.
    pub fn run(&self) -> Result<Analysis> {
        let config = &self.config;
        let catalog = ImageCollection::open(config.catalog_dir())?;

        let candidates = catalog
            .filter_date(&config.before().union(config.after()))
            .filter_cloud_cover(config.max_cloud_percentage())
            .filter_bounds(config.aoi(), config.index_bands()[0]);

        info!(
            "{} of {} scenes kept after date, cloud cover and bounds filters",
            candidates.len(),
            catalog.len()
        );

        // One load keeps both periods on the same AOI grid
        let images = candidates.load(config.aoi(), &self.bands())?;
        let (before, after): (Vec<Image>, Vec<Image>) = images
            .into_iter()
            .filter(|image| {
                config.before().contains(image.date) || config.after().contains(image.date)
            })
            .partition(|image| config.before().contains(image.date));

        self.compare(before, after)
    }

    /// Masks and composites both periods, then detects, exports and measures change.
    pub fn compare(&self, before: Vec<Image>, after: Vec<Image>) -> Result<Analysis> {
        let config = &self.config;

        let before = self.period_composite(before, config.before(), "before")?;
        let after = self.period_composite(after, config.after(), "after")?;
        let after = after.resample(&before.grid);

        let method = config.change();
        let change = method.detect(&before, &after)?.clip(config.aoi())?;

        let request = ExportRequest::new(config.export().clone(), *config.aoi());
        let export = export_image(&change, &request)?;

        let mut composite_exports = Vec::new();
        if config.export().composites {
            for (raster, suffix) in [(&before, "before"), (&after, "after")] {
                let composite = raster.clip(config.aoi())?;
                composite_exports.push(export_image(&composite, &request.with_suffix(suffix))?);
            }
        }

        let areas = match method {
            ChangeMethod::IndexDifference { .. } => vec![AreaReport {
                label: "Flagged",
                hectares: area_hectares(&change, config.aoi())?,
            }],
            ChangeMethod::WaterTransition { .. } => vec![
                AreaReport {
                    label: "Water lost",
                    hectares: area_hectares(&class_mask(&change, ChangeClass::Lost), config.aoi())?,
                },
                AreaReport {
                    label: "Water gained",
                    hectares: area_hectares(
                        &class_mask(&change, ChangeClass::Gained),
                        config.aoi(),
                    )?,
                },
            ],
        };
        for area in &areas {
            info!("{}", area);
        }

        let previews = if config.preview() {
            self.write_previews(&request, &before, &after, &change)?
        } else {
            Vec::new()
        };

        Ok(Analysis {
            summary: summary(&change),
            before,
            after,
            change,
            areas,
            export,
            composite_exports,
            previews,
        })
    }

    /// Masked index composite of one period.
    fn period_composite(
        &self,
        images: Vec<Image>,
        range: &DateRange,
        period: &str,
    ) -> Result<Raster> {
        if images.is_empty() {
            return Err(Error::EmptyCollection(format!(
                "no scenes in {} period {} to {}",
                period, range.start, range.end
            )));
        }
        info!("Compositing {} scenes for the {} period", images.len(), period);

        let config = &self.config;
        let mask = config.cloud_mask();
        let masked = images
            .into_iter()
            .map(|image| mask.apply(image, config.reflectance_scale()))
            .collect::<Result<Vec<_>>>()?;

        for image in &masked {
            let valid = image.band(mask.band())?.valid_count();
            if valid == 0 {
                warn!(scene = %image.id, "scene fully masked");
            } else {
                debug!(scene = %image.id, valid, "masked scene");
            }
        }

        let bands = config.index_bands();
        match config.composite() {
            CompositeOrder::IndexThenMedian => {
                let indices = masked
                    .iter()
                    .map(|image| image.normalized_difference(bands))
                    .collect::<Result<Vec<_>>>()?;
                median(&indices)
            }
            CompositeOrder::MedianThenIndex => {
                median_image(&masked, &bands)?.normalized_difference(bands)
            }
        }
    }

    fn write_previews(
        &self,
        request: &ExportRequest,
        before: &Raster,
        after: &Raster,
        change: &Raster,
    ) -> Result<Vec<PathBuf>> {
        let stem = request.path().with_extension("");
        let stem = stem.to_string_lossy();

        let change_params = match self.config.change() {
            ChangeMethod::IndexDifference { .. } => VisParams::sand_exposure(),
            ChangeMethod::WaterTransition { .. } => VisParams::water_transition(),
        };

        let mut previews = Vec::with_capacity(3);
        for (raster, params, suffix) in [
            (before, VisParams::mndwi(), "before"),
            (after, VisParams::mndwi(), "after"),
            (change, change_params, "change"),
        ] {
            let path = PathBuf::from(format!("{}_{}.png", stem, suffix));
            render_png(raster, &params, &path)?;
            debug!("wrote preview {}", path.display());
            previews.push(path);
        }

        Ok(previews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Bbox;
    use crate::export::{ExportSettings, FileFormat};
    use crate::mask::CloudMask;
    use crate::raster::tests::raster;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("Invalid date")
    }

    fn config(folder: PathBuf) -> Config {
        let export = ExportSettings {
            description: "SandExposure_2023".to_string(),
            folder,
            file_name_prefix: None,
            scale: 1_000.0,
            max_pixels: 1e8,
            file_format: FileFormat::GeoTIFF,
            crs: None,
            composites: false,
        };
        // Covers the test grid at 600 000 E / 2 080 000 N in UTM 44N
        let aoi = Bbox::new(81.5, 82.5, 18.0, 19.5).unwrap();
        Config::new(
            PathBuf::from("unused"),
            aoi,
            DateRange::new(date(2023, 4, 4), date(2023, 5, 5)),
            DateRange::new(date(2023, 5, 5), date(2023, 6, 6)),
            export,
        )
    }

    fn image(day: NaiveDate, green: Vec<f32>, swir: Vec<f32>, qa: Vec<f32>) -> Image {
        let n = green.len() as u32;
        Image::new(format!("S2_{}", day), day)
            .with_band("B3", raster(n, 1, green))
            .unwrap()
            .with_band("B11", raster(n, 1, swir))
            .unwrap()
            .with_band("QA60", raster(n, 1, qa))
            .unwrap()
    }

    #[test]
    fn test_bands_include_quality_band() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path().to_path_buf()));
        assert_eq!(pipeline.bands(), vec!["B3", "B11", "QA60"]);
    }

    #[test]
    fn test_sand_exposure() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path().to_path_buf()));

        let cloud = (1u32 << 10) as f32;
        let before = vec![
            image(date(2023, 4, 10), vec![3.0, 3.0], vec![1.0, 1.0], vec![0.0, 0.0]),
            // Cloudy observation of pixel 0 must not drag the median
            image(date(2023, 4, 20), vec![1.0, 3.0], vec![9.0, 1.0], vec![cloud, 0.0]),
        ];
        let after = vec![image(
            date(2023, 5, 10),
            vec![1.0, 3.0],
            vec![3.0, 1.0],
            vec![0.0, 0.0],
        )];

        let analysis = pipeline.compare(before, after).unwrap();

        assert!((analysis.before.data[0] - 0.5).abs() < 1e-6);
        assert!((analysis.after.data[0] + 0.5).abs() < 1e-6);
        assert_eq!(analysis.change.data, vec![1.0, 0.0]);
        assert_eq!(analysis.areas.len(), 1);
        assert!((analysis.areas[0].hectares - 0.01).abs() < 1e-9);
        assert!(analysis.export.path.exists());
        assert!(analysis.composite_exports.is_empty());
        assert!(analysis.previews.is_empty());
    }

    #[test]
    fn test_water_transition_with_scl() {
        let dir = tempdir().unwrap();
        let config = config(dir.path().to_path_buf())
            .with_cloud_mask(CloudMask::scl(), Some(10_000.0))
            .with_change(
                ChangeMethod::WaterTransition {
                    water_threshold: 0.3,
                },
                CompositeOrder::MedianThenIndex,
            );
        let pipeline = Pipeline::new(config);

        let scl_image = |day, green: Vec<f32>, swir: Vec<f32>, scl: Vec<f32>| {
            let n = green.len() as u32;
            Image::new("S2_SR", day)
                .with_band("B3", raster(n, 1, green))
                .unwrap()
                .with_band("B11", raster(n, 1, swir))
                .unwrap()
                .with_band("SCL", raster(n, 1, scl))
                .unwrap()
        };

        // water, sand, water, cloud shadow
        let before = vec![scl_image(
            date(2023, 4, 10),
            vec![3000.0, 1000.0, 3000.0, 3000.0],
            vec![1000.0, 3000.0, 1000.0, 1000.0],
            vec![6.0, 5.0, 6.0, 3.0],
        )];
        // sand, water, water, water
        let after = vec![scl_image(
            date(2023, 5, 10),
            vec![1000.0, 3000.0, 3000.0, 3000.0],
            vec![3000.0, 1000.0, 1000.0, 1000.0],
            vec![5.0, 6.0, 6.0, 6.0],
        )];

        let analysis = pipeline.compare(before, after).unwrap();
        assert_eq!(analysis.change.data[0], 1.0);
        assert_eq!(analysis.change.data[1], 2.0);
        assert_eq!(analysis.change.data[2], 0.0);
        assert!(analysis.change.data[3].is_nan());

        let labels: Vec<_> = analysis.areas.iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["Water lost", "Water gained"]);
        assert!((analysis.areas[0].hectares - 0.01).abs() < 1e-9);
        assert!((analysis.areas[1].hectares - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_composite_exports_in_wgs84() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path().to_path_buf());
        let mut export = config.export().clone();
        export.composites = true;
        export.crs = Some(4326);
        config = Config::new(
            dir.path().to_path_buf(),
            *config.aoi(),
            *config.before(),
            *config.after(),
            export,
        );
        let pipeline = Pipeline::new(config);

        let before = vec![image(date(2023, 4, 10), vec![3.0], vec![1.0], vec![0.0])];
        let after = vec![image(date(2023, 5, 10), vec![1.0], vec![3.0], vec![0.0])];
        let analysis = pipeline.compare(before, after).unwrap();

        let names: Vec<_> = analysis
            .composite_exports
            .iter()
            .map(|task| task.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["SandExposure_2023_before.tif", "SandExposure_2023_after.tif"]);
        for task in &analysis.composite_exports {
            assert!(task.path.exists());
        }
        assert!((analysis.areas[0].hectares - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_empty_period() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path().to_path_buf()));
        let before = vec![image(date(2023, 4, 10), vec![1.0], vec![1.0], vec![0.0])];

        let result = pipeline.compare(before, Vec::new());
        assert!(matches!(result, Err(Error::EmptyCollection(msg)) if msg.contains("after")));
    }

    #[test]
    fn test_missing_quality_band() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path().to_path_buf()));
        let day = date(2023, 4, 10);
        let no_qa = Image::new("S2_no_qa", day)
            .with_band("B3", raster(1, 1, vec![1.0]))
            .unwrap()
            .with_band("B11", raster(1, 1, vec![1.0]))
            .unwrap();

        let result = pipeline.compare(vec![no_qa.clone()], vec![no_qa]);
        assert!(matches!(result, Err(Error::MissingBand { band, .. }) if band == "QA60"));
    }
}
