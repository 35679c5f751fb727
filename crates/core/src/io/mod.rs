//! Reading and writing static maps and result fields

mod geotiff;

pub use geotiff::{read_geotiff, write_geotiff};
