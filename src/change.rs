//! Before/after change detection on index composites.

use serde::Deserialize;

use crate::error::Result;
use crate::raster::Raster;

pub const DEFAULT_DIFFERENCE_THRESHOLD: f32 = -0.2;
pub const DEFAULT_WATER_THRESHOLD: f32 = 0.3;

/// Encoded values of a water transition raster.
pub const UNCHANGED: f32 = 0.0;
pub const WATER_LOST: f32 = 1.0;
pub const WATER_GAINED: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ChangeMethod {
    /// `after - before < threshold` flags a pixel (sand exposure when negative).
    IndexDifference {
        #[serde(default = "default_difference_threshold")]
        threshold: f32,
    },
    /// Water where the index exceeds `water_threshold`, classified into lost,
    /// gained or unchanged.
    WaterTransition {
        #[serde(default = "default_water_threshold")]
        water_threshold: f32,
    },
}

fn default_difference_threshold() -> f32 {
    DEFAULT_DIFFERENCE_THRESHOLD
}

fn default_water_threshold() -> f32 {
    DEFAULT_WATER_THRESHOLD
}

impl Default for ChangeMethod {
    fn default() -> Self {
        ChangeMethod::IndexDifference {
            threshold: DEFAULT_DIFFERENCE_THRESHOLD,
        }
    }
}

impl ChangeMethod {
    pub fn threshold(&self) -> f32 {
        match *self {
            ChangeMethod::IndexDifference { threshold } => threshold,
            ChangeMethod::WaterTransition { water_threshold } => water_threshold,
        }
    }

    pub fn detect(&self, before: &Raster, after: &Raster) -> Result<Raster> {
        match *self {
            ChangeMethod::IndexDifference { threshold } => {
                difference_below(before, after, threshold)
            }
            ChangeMethod::WaterTransition { water_threshold } => {
                water_transition(before, after, water_threshold)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Lost,
    Gained,
    Unchanged,
}

impl ChangeClass {
    pub fn classify(water_before: bool, water_after: bool) -> Self {
        match (water_before, water_after) {
            (true, false) => ChangeClass::Lost,
            (false, true) => ChangeClass::Gained,
            _ => ChangeClass::Unchanged,
        }
    }

    pub fn value(self) -> f32 {
        match self {
            ChangeClass::Lost => WATER_LOST,
            ChangeClass::Gained => WATER_GAINED,
            ChangeClass::Unchanged => UNCHANGED,
        }
    }
}

/// `after - before`, no-data where either side is no-data.
pub fn difference(before: &Raster, after: &Raster) -> Result<Raster> {
    before.zip_with(after, |b, a| a - b)
}

/// 1 where `after - before < threshold`, 0 elsewhere.
pub fn difference_below(before: &Raster, after: &Raster, threshold: f32) -> Result<Raster> {
    Ok(difference(before, after)?.map(|d| binarize(d, |d| d < threshold)))
}

/// 1 where `index > threshold`.
pub fn water_mask(index: &Raster, threshold: f32) -> Raster {
    index.map(|v| binarize(v, |v| v > threshold))
}

/// Encoded transition raster: 0 unchanged, 1 water lost, 2 water gained.
pub fn water_transition(before: &Raster, after: &Raster, threshold: f32) -> Result<Raster> {
    let water_before = water_mask(before, threshold);
    let water_after = water_mask(after, threshold);

    water_before.zip_with(&water_after, |b, a| {
        if b.is_nan() || a.is_nan() {
            f32::NAN
        } else {
            ChangeClass::classify(b == 1.0, a == 1.0).value()
        }
    })
}

/// 1 where `raster` holds `class`, 0 elsewhere, no-data kept.
pub fn class_mask(raster: &Raster, class: ChangeClass) -> Raster {
    let value = class.value();
    raster.map(|v| binarize(v, |v| v == value))
}

fn binarize(value: f32, predicate: impl Fn(f32) -> bool) -> f32 {
    if value.is_nan() {
        f32::NAN
    } else if predicate(value) {
        1.0
    } else {
        0.0
    }
}
