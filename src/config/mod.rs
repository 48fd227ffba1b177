use chrono::NaiveDate;

use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::bbox::Bbox;
use crate::catalog::DateRange;
use crate::change::ChangeMethod;
use crate::composite::CompositeOrder;
use crate::export::ExportSettings;
use crate::mask::CloudMask;

pub mod error;
pub use error::ConfigError;

/// Cloud cover cut-off used when the configuration does not set one.
pub const DEFAULT_MAX_CLOUD_PERCENTAGE: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct Config {
    catalog_dir: PathBuf,
    aoi: Bbox,
    before: DateRange,
    after: DateRange,
    max_cloud_percentage: f64,
    cloud_mask: CloudMask,
    reflectance_scale: Option<f32>,
    index_bands: [String; 2],
    composite: CompositeOrder,
    change: ChangeMethod,
    export: ExportSettings,
    preview: bool,
}

fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    Ok(NaiveDate::parse_from_str(value, "%Y-%m-%d")?)
}

fn parse_period(
    start: &str,
    end: &str,
    period: &'static str,
) -> Result<DateRange, ConfigError> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;

    // Ranges are end-exclusive, so an equal end date selects nothing
    if start >= end {
        return Err(ConfigError::DateOrder { period });
    }

    Ok(DateRange::new(start, end))
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Threshold { name, value })
    }
}

// This function deserializes a Config object from a deserializer, ensuring the periods are valid
// and in order and every threshold and scale is within an acceptable range.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ConfigHelper {
            catalog_dir: PathBuf,
            aoi: AoiHelper,
            before: PeriodHelper,
            after: PeriodHelper,
            #[serde(default = "default_max_cloud")]
            max_cloud_percentage: f64,
            #[serde(default = "CloudMask::qa60")]
            cloud_mask: CloudMask,
            #[serde(default)]
            reflectance_scale: Option<f32>,
            #[serde(default = "default_index_bands")]
            index_bands: [String; 2],
            #[serde(default)]
            composite: CompositeOrder,
            #[serde(default)]
            change: ChangeMethod,
            export: ExportSettings,
            #[serde(default)]
            preview: bool,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum AoiHelper {
            Bounds {
                xmin: f64,
                xmax: f64,
                ymin: f64,
                ymax: f64,
            },
            Corners {
                corners: [[f64; 2]; 2],
            },
        }

        #[derive(Deserialize)]
        struct PeriodHelper {
            start: String,
            end: String,
        }

        fn default_max_cloud() -> f64 {
            DEFAULT_MAX_CLOUD_PERCENTAGE
        }

        fn default_index_bands() -> [String; 2] {
            ["B3".to_string(), "B11".to_string()]
        }

        // Deserialize into the helper struct
        let helper = ConfigHelper::deserialize(deserializer)?;

        let aoi = match helper.aoi {
            AoiHelper::Bounds {
                xmin,
                xmax,
                ymin,
                ymax,
            } => Bbox::new(xmin, xmax, ymin, ymax),
            AoiHelper::Corners { corners } => Bbox::from_corners(corners[0], corners[1]),
        }
        .map_err(|e| D::Error::custom(ConfigError::Aoi(e)))?;

        let before = parse_period(&helper.before.start, &helper.before.end, "before")
            .map_err(D::Error::custom)?;
        let after = parse_period(&helper.after.start, &helper.after.end, "after")
            .map_err(D::Error::custom)?;

        if !(0.0..=100.0).contains(&helper.max_cloud_percentage) {
            return Err(D::Error::custom(ConfigError::CloudPercentage(
                helper.max_cloud_percentage,
            )));
        }

        if let Some(&(name, value)) = helper.cloud_mask.invalid_bits().first() {
            return Err(D::Error::custom(ConfigError::QaBit { name, value }));
        }

        let threshold_name = match helper.change {
            ChangeMethod::IndexDifference { .. } => "index_difference",
            ChangeMethod::WaterTransition { .. } => "water_transition",
        };
        check_threshold(threshold_name, helper.change.threshold()).map_err(D::Error::custom)?;

        if let Some(scale) = helper.reflectance_scale
            && scale <= 0.0
        {
            return Err(D::Error::custom(ConfigError::NotPositive {
                name: "reflectance_scale",
                value: scale as f64,
            }));
        }

        if helper.export.scale <= 0.0 {
            return Err(D::Error::custom(ConfigError::NotPositive {
                name: "export.scale",
                value: helper.export.scale,
            }));
        }

        if helper.export.max_pixels <= 0.0 {
            return Err(D::Error::custom(ConfigError::NotPositive {
                name: "export.max_pixels",
                value: helper.export.max_pixels,
            }));
        }

        Ok(Config {
            catalog_dir: helper.catalog_dir,
            aoi,
            before,
            after,
            max_cloud_percentage: helper.max_cloud_percentage,
            cloud_mask: helper.cloud_mask,
            reflectance_scale: helper.reflectance_scale,
            index_bands: helper.index_bands,
            composite: helper.composite,
            change: helper.change,
            export: helper.export,
            preview: helper.preview,
        })
    }
}

impl Config {
    pub fn new(
        catalog_dir: PathBuf,
        aoi: Bbox,
        before: DateRange,
        after: DateRange,
        export: ExportSettings,
    ) -> Self {
        Self {
            catalog_dir,
            aoi,
            before,
            after,
            max_cloud_percentage: DEFAULT_MAX_CLOUD_PERCENTAGE,
            cloud_mask: CloudMask::qa60(),
            reflectance_scale: None,
            index_bands: ["B3".to_string(), "B11".to_string()],
            composite: CompositeOrder::default(),
            change: ChangeMethod::default(),
            export,
            preview: false,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn with_cloud_mask(mut self, cloud_mask: CloudMask, reflectance_scale: Option<f32>) -> Self {
        self.cloud_mask = cloud_mask;
        self.reflectance_scale = reflectance_scale;
        self
    }

    pub fn with_change(mut self, change: ChangeMethod, composite: CompositeOrder) -> Self {
        self.change = change;
        self.composite = composite;
        self
    }

    pub fn catalog_dir(&self) -> &Path {
        &self.catalog_dir
    }

    pub fn aoi(&self) -> &Bbox {
        &self.aoi
    }

    pub fn before(&self) -> &DateRange {
        &self.before
    }

    pub fn after(&self) -> &DateRange {
        &self.after
    }

    pub fn max_cloud_percentage(&self) -> f64 {
        self.max_cloud_percentage
    }

    pub fn cloud_mask(&self) -> &CloudMask {
        &self.cloud_mask
    }

    pub fn reflectance_scale(&self) -> Option<f32> {
        self.reflectance_scale
    }

    pub fn index_bands(&self) -> [&str; 2] {
        [&self.index_bands[0], &self.index_bands[1]]
    }

    pub fn composite(&self) -> CompositeOrder {
        self.composite
    }

    pub fn change(&self) -> ChangeMethod {
        self.change
    }

    pub fn export(&self) -> &ExportSettings {
        &self.export
    }

    pub fn preview(&self) -> bool {
        self.preview
    }
}
