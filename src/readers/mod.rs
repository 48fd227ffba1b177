pub mod geotiff;
pub mod types;
pub mod utils;

use std::path::PathBuf;

pub use geotiff::GeoTiffReader;
pub use types::{DataReader, FileError, FileType, ReadError};
pub use utils::reader_from_filetype;

/// Picks a reader from the file extension. GeoTIFF and Sentinel-2 JPEG2000
/// bands both go through GDAL.
pub fn create_reader(path: impl Into<PathBuf>) -> Result<Box<dyn DataReader>, FileError> {
    let path = path.into();
    match reader_from_filetype(&path)? {
        FileType::GeoTiff | FileType::Jpeg2000 => Ok(Box::new(GeoTiffReader { path })),
    }
}
