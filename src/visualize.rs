//! Palette rendering of single-band rasters to PNG previews.

use gdal::DriverManager;
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::export::ExportError;
use crate::raster::Raster;

#[derive(Error, Debug, PartialEq)]
pub enum PaletteError {
    #[error("unknown colour '{0}'")]
    UnknownColor(String),
    #[error("palette is empty")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Named colour or `#rrggbb` / `rrggbb` hex.
    pub fn parse(name: &str) -> Result<Self, PaletteError> {
        let named = match name.to_ascii_lowercase().as_str() {
            "black" => Some(Rgb::new(0, 0, 0)),
            "white" => Some(Rgb::new(255, 255, 255)),
            "red" => Some(Rgb::new(255, 0, 0)),
            "green" => Some(Rgb::new(0, 128, 0)),
            "blue" => Some(Rgb::new(0, 0, 255)),
            "yellow" => Some(Rgb::new(255, 255, 0)),
            "brown" => Some(Rgb::new(165, 42, 42)),
            "cyan" => Some(Rgb::new(0, 255, 255)),
            _ => None,
        };
        if let Some(color) = named {
            return Ok(color);
        }

        let hex = name.trim_start_matches('#');
        if hex.len() != 6 {
            return Err(PaletteError::UnknownColor(name.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| PaletteError::UnknownColor(name.to_string()))
        };
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Display range and colour ramp of a layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisParams {
    #[serde(default)]
    pub min: f32,
    #[serde(default = "default_max")]
    pub max: f32,
    pub palette: Vec<String>,
}

fn default_max() -> f32 {
    1.0
}

impl VisParams {
    pub fn new(min: f32, max: f32, palette: &[&str]) -> Self {
        Self {
            min,
            max,
            palette: palette.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Black for unchanged, yellow for exposed sand.
    pub fn sand_exposure() -> Self {
        VisParams::new(0.0, 1.0, &["black", "yellow"])
    }

    /// Black unchanged, red water lost, green water gained.
    pub fn water_transition() -> Self {
        VisParams::new(0.0, 2.0, &["black", "red", "green"])
    }

    pub fn mndwi() -> Self {
        VisParams::new(-1.0, 1.0, &["brown", "white", "blue"])
    }

    fn colors(&self) -> Result<Vec<Rgb>, PaletteError> {
        if self.palette.is_empty() {
            return Err(PaletteError::Empty);
        }
        self.palette.iter().map(|c| Rgb::parse(c)).collect()
    }
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

/// Colour of `value` on an evenly spaced ramp, clamped to [min, max].
fn ramp(colors: &[Rgb], min: f32, max: f32, value: f32) -> Rgb {
    if colors.len() == 1 || max <= min {
        return colors[0];
    }
    let t = ((value - min) / (max - min)).clamp(0.0, 1.0);
    let segments = (colors.len() - 1) as f32;
    let pos = t * segments;
    let i = (pos.floor() as usize).min(colors.len() - 2);
    let local = pos - i as f32;
    let (a, b) = (colors[i], colors[i + 1]);
    Rgb::new(lerp(a.r, b.r, local), lerp(a.g, b.g, local), lerp(a.b, b.b, local))
}

/// Row-major RGBA bytes; no-data is fully transparent.
pub fn render_rgba(raster: &Raster, params: &VisParams) -> Result<Vec<u8>, PaletteError> {
    let colors = params.colors()?;
    let mut rgba = Vec::with_capacity(raster.data.len() * 4);
    for &value in &raster.data {
        if value.is_nan() {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            let c = ramp(&colors, params.min, params.max, value);
            rgba.extend_from_slice(&[c.r, c.g, c.b, 255]);
        }
    }
    Ok(rgba)
}

/// Writes a PNG preview of `raster`.
pub fn render_png(raster: &Raster, params: &VisParams, path: &Path) -> Result<(), ExportError> {
    let rgba = render_rgba(raster, params)?;
    let width = raster.width() as usize;
    let height = raster.height() as usize;

    let mem = DriverManager::get_driver_by_name("MEM")?;
    let dataset = mem.create_with_band_type::<u8, _>("", width, height, 4)?;
    for channel in 0..4 {
        let mut band = dataset.rasterband(channel + 1)?;
        let data: Vec<u8> = rgba.iter().skip(channel).step_by(4).copied().collect();
        let mut buffer = Buffer::new((width, height), data);
        band.write((0, 0), (width, height), &mut buffer)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let png = DriverManager::get_driver_by_name("PNG")?;
    let _saved_dataset = dataset.create_copy(&png, path, &CslStringList::new())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::raster;

    #[test]
    fn test_parse_colors() {
        assert_eq!(Rgb::parse("yellow").unwrap(), Rgb::new(255, 255, 0));
        assert_eq!(Rgb::parse("Red").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::parse("#98ff00").unwrap(), Rgb::new(0x98, 0xff, 0x00));
        assert!(Rgb::parse("mauve").is_err());
        assert!(Rgb::parse("#12345g").is_err());
    }

    #[test]
    fn test_ramp_endpoints_and_midpoint() {
        let colors = [Rgb::new(0, 0, 0), Rgb::new(200, 100, 0)];
        assert_eq!(ramp(&colors, 0.0, 1.0, -5.0), colors[0]);
        assert_eq!(ramp(&colors, 0.0, 1.0, 5.0), colors[1]);
        assert_eq!(ramp(&colors, 0.0, 1.0, 0.5), Rgb::new(100, 50, 0));
    }

    #[test]
    fn test_three_stop_ramp() {
        let params = VisParams::mndwi();
        let colors = params.colors().unwrap();
        assert_eq!(ramp(&colors, -1.0, 1.0, -1.0), Rgb::parse("brown").unwrap());
        assert_eq!(ramp(&colors, -1.0, 1.0, 0.0), Rgb::parse("white").unwrap());
        assert_eq!(ramp(&colors, -1.0, 1.0, 1.0), Rgb::parse("blue").unwrap());
    }

    #[test]
    fn test_render_rgba_nodata_transparent() {
        let change = raster(3, 1, vec![0.0, 1.0, f32::NAN]);
        let rgba = render_rgba(&change, &VisParams::sand_exposure()).unwrap();
        assert_eq!(rgba, vec![0, 0, 0, 255, 255, 255, 0, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn test_single_color_palette() {
        let loss = raster(2, 1, vec![0.0, 1.0]);
        let params = VisParams::new(0.0, 1.0, &["red"]);
        let rgba = render_rgba(&loss, &params).unwrap();
        assert_eq!(rgba, vec![255, 0, 0, 255, 255, 0, 0, 255]);
        assert_eq!(
            render_rgba(&loss, &VisParams::new(0.0, 1.0, &[])),
            Err(PaletteError::Empty)
        );
    }
}
