//! Raster export for forecast grids.
//!
//! Encodes one variable of a [`GriddedDataset`](forecast_common::GriddedDataset)
//! as a multi-band Float32 GeoTIFF on EPSG:4326: one band per timestamp,
//! north-up rows, Deflate strips, nodata `-9999` and ISO timestamps as band
//! names.
//!
//! - [`geotiff`]: the TIFF writer and a reader for the same layout
//! - [`export`]: dataset to artifact, with atomic file publication

pub mod export;
pub mod geotiff;

pub use export::{write_atomic, BandInfo, RasterArtifact, RasterExporter, RasterLayout};
pub use geotiff::{
    decode_geotiff, GeoTiffError, GeoTiffImage, GeoTiffWriter, GeoTransform, RasterBand,
    TiffCompression, NODATA_VALUE,
};
