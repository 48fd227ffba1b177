//! Cloud and shadow masking for Sentinel-2 scenes.
//!
//! Two sources of per-pixel quality exist: the `QA60` bitmask of the L1C
//! product (bit 10 opaque cloud, bit 11 cirrus) and the `SCL` scene
//! classification of the L2A product.

use serde::Deserialize;

use crate::error::Result;
use crate::image::Image;

pub const QA60_CLOUD_BIT: u8 = 10;
pub const QA60_CIRRUS_BIT: u8 = 11;
/// Width of the QA60 band.
pub const QA60_BITS: u8 = 16;

/// SCL classes rejected by default: cloud shadow, medium and high probability
/// cloud, thin cirrus.
pub const SCL_EXCLUDED: [u8; 4] = [3, 8, 9, 10];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CloudMask {
    Qa60 {
        #[serde(default = "default_qa_band")]
        band: String,
        #[serde(default = "default_cloud_bit")]
        cloud_bit: u8,
        #[serde(default = "default_cirrus_bit")]
        cirrus_bit: u8,
    },
    Scl {
        #[serde(default = "default_scl_band")]
        band: String,
        #[serde(default = "default_scl_excluded")]
        excluded: Vec<u8>,
    },
}

fn default_qa_band() -> String {
    "QA60".to_string()
}

fn default_scl_band() -> String {
    "SCL".to_string()
}

fn default_cloud_bit() -> u8 {
    QA60_CLOUD_BIT
}

fn default_cirrus_bit() -> u8 {
    QA60_CIRRUS_BIT
}

fn default_scl_excluded() -> Vec<u8> {
    SCL_EXCLUDED.to_vec()
}

impl CloudMask {
    pub fn qa60() -> Self {
        CloudMask::Qa60 {
            band: default_qa_band(),
            cloud_bit: QA60_CLOUD_BIT,
            cirrus_bit: QA60_CIRRUS_BIT,
        }
    }

    pub fn scl() -> Self {
        CloudMask::Scl {
            band: default_scl_band(),
            excluded: default_scl_excluded(),
        }
    }

    /// Name of the quality band this mask reads.
    pub fn band(&self) -> &str {
        match self {
            CloudMask::Qa60 { band, .. } | CloudMask::Scl { band, .. } => band,
        }
    }

    /// Bit positions that do not fit the 16-bit QA60 band.
    pub fn invalid_bits(&self) -> Vec<(&'static str, u8)> {
        match self {
            CloudMask::Qa60 {
                cloud_bit,
                cirrus_bit,
                ..
            } => [("cloud_bit", *cloud_bit), ("cirrus_bit", *cirrus_bit)]
                .into_iter()
                .filter(|&(_, bit)| bit >= QA60_BITS)
                .collect(),
            CloudMask::Scl { .. } => Vec::new(),
        }
    }

    /// Whether a pixel with quality value `value` is clear. No-data is never clear.
    pub fn is_clear(&self, value: f32) -> bool {
        if value.is_nan() || value < 0.0 {
            return false;
        }
        match self {
            CloudMask::Qa60 {
                cloud_bit,
                cirrus_bit,
                ..
            } => {
                let flags = value as u32;
                let bit = |b: u8| 1u32.checked_shl(b as u32).unwrap_or(0);
                flags & bit(*cloud_bit) == 0 && flags & bit(*cirrus_bit) == 0
            }
            CloudMask::Scl { excluded, .. } => {
                let class = value as u32;
                !excluded.iter().any(|&code| code as u32 == class)
            }
        }
    }

    /// Masks `image` in place and returns it. When `reflectance_scale` is set,
    /// every band is divided by it afterwards.
    pub fn apply(&self, mut image: Image, reflectance_scale: Option<f32>) -> Result<Image> {
        let valid: Vec<bool> = image
            .band(self.band())?
            .data
            .iter()
            .map(|&v| self.is_clear(v))
            .collect();

        image.update_mask(&valid);
        if let Some(scale) = reflectance_scale {
            image.divide(scale);
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::raster;
    use chrono::NaiveDate;

    fn image(quality_band: &str, quality: Vec<f32>) -> Image {
        let n = quality.len() as u32;
        Image::new("S2B_20230410", NaiveDate::from_ymd_opt(2023, 4, 10).unwrap())
            .with_band("B3", raster(n, 1, vec![1000.0; n as usize]))
            .unwrap()
            .with_band(quality_band, raster(n, 1, quality))
            .unwrap()
    }

    #[test]
    fn test_qa60_bits_out_of_range() {
        let mask = CloudMask::Qa60 {
            band: "QA60".to_string(),
            cloud_bit: 40,
            cirrus_bit: 11,
        };
        assert_eq!(mask.invalid_bits(), vec![("cloud_bit", 40)]);
        assert!(CloudMask::qa60().invalid_bits().is_empty());
        assert!(CloudMask::scl().invalid_bits().is_empty());

        // An out-of-range bit never matches instead of overflowing
        assert!(mask.is_clear(0.0));
        assert!(!mask.is_clear((1u32 << 11) as f32));
    }

    #[test]
    fn test_qa60_cloud_and_cirrus_bits() {
        let mask = CloudMask::qa60();
        assert!(mask.is_clear(0.0));
        assert!(!mask.is_clear(1024.0));
        assert!(!mask.is_clear(2048.0));
        assert!(!mask.is_clear(3072.0));
        // Other bits do not matter
        assert!(mask.is_clear(512.0));
        assert!(mask.is_clear(4096.0));
        assert!(!mask.is_clear(f32::NAN));
    }

    #[test]
    fn test_qa60_apply_masks_all_bands() {
        let masked = CloudMask::qa60()
            .apply(image("QA60", vec![0.0, 1024.0, 2048.0, 512.0]), None)
            .unwrap();

        let b3 = masked.band("B3").unwrap();
        assert_eq!(b3.data[0], 1000.0);
        assert!(b3.data[1].is_nan());
        assert!(b3.data[2].is_nan());
        assert_eq!(b3.data[3], 1000.0);
    }

    #[test]
    fn test_scl_excluded_classes() {
        let mask = CloudMask::scl();
        for code in 0..=11 {
            let expected = !matches!(code, 3 | 8 | 9 | 10);
            assert_eq!(mask.is_clear(code as f32), expected, "SCL class {code}");
        }
    }

    #[test]
    fn test_scl_apply_with_reflectance_scale() {
        let masked = CloudMask::scl()
            .apply(image("SCL", vec![4.0, 3.0, 6.0, 9.0]), Some(10000.0))
            .unwrap();

        let b3 = masked.band("B3").unwrap();
        assert!((b3.data[0] - 0.1).abs() < 1e-6);
        assert!(b3.data[1].is_nan());
        assert!((b3.data[2] - 0.1).abs() < 1e-6);
        assert!(b3.data[3].is_nan());
    }

    #[test]
    fn test_missing_quality_band() {
        let result = CloudMask::qa60().apply(image("SCL", vec![4.0]), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let mask: CloudMask = serde_json::from_str(r#"{"method": "scl"}"#).unwrap();
        assert_eq!(mask, CloudMask::scl());

        let mask: CloudMask =
            serde_json::from_str(r#"{"method": "qa60", "band": "QA"}"#).unwrap();
        assert_eq!(mask.band(), "QA");
    }
}
