use thiserror::Error;

use crate::raster::{Grid, Raster, Window};

/// Source of single-band raster data.
pub trait DataReader {
    /// Size, georeferencing and CRS without reading pixels.
    fn grid(&self) -> Result<Grid, ReadError>;

    /// Reads the whole band, or only `window` when given. No-data becomes `NaN`.
    fn read(&self, window: Option<Window>) -> Result<Raster, ReadError>;
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },

    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("window {window:?} exceeds raster {path}")]
    Window { path: String, window: Window },
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("unknown raster file type: {0}")]
    UnknownFileType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    GeoTiff,
    Jpeg2000,
}
