use thiserror::Error;

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::readers::ReadError;

/// Errors raised while building or evaluating a change analysis.
#[derive(Error, Debug)]
pub enum Error {
    #[error("band '{band}' not found in image {image}")]
    MissingBand { image: String, band: String },

    #[error("raster grids differ: expected {expected}, got {actual}")]
    GridMismatch { expected: String, actual: String },

    #[error("no images to reduce: {0}")]
    EmptyCollection(String),

    #[error("area of interest does not overlap raster {0}")]
    OutsideAoi(String),

    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scene manifest {path}: {source}")]
    Manifest {
        path: String,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
