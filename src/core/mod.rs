//! Core tile selection, mosaicking and index computation modules

pub mod coverage;
pub mod gdal_ops;
pub mod geometry;
pub mod index;
pub mod mosaic;
pub mod pipeline;
pub mod resolution;
pub mod timeseries;

// Re-export main types
pub use coverage::{select_covering_products, CoverageSelection};
pub use pipeline::{HistoryOptions, Sentinel2Loader};
pub use resolution::derive_download_resolution;
pub use timeseries::{assemble_history, date_steps, RegionProvider};
