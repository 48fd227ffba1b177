//! Sand exposure and water change mapping from Sentinel-2 scenes stored on disk.

pub mod bbox;
pub mod catalog;
pub mod change;
pub mod composite;
pub mod config;
pub mod crs;
pub mod error;
pub mod export;
pub mod image;
pub mod index;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod readers;
pub mod stats;
pub mod visualize;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Analysis, Pipeline};
