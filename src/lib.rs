//! Sentile: A Fast, Modular Sentinel-2 Tile Retrieval and Mosaicking Library
//!
//! This library downloads Sentinel-2 band tiles from the Copernicus hub,
//! selects the minimal set of products covering a requested polygon, and
//! mosaics them into single GeoTIFF rasters, with derived spectral indices
//! and time series on top. Every stage is backed by an on-disk cache so
//! repeated requests never touch the network.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::LoaderConfig;
pub use crate::core::pipeline::{HistoryOptions, Sentinel2Loader};
pub use io::catalog::{CatalogSearch, ScihubClient, SearchRequest};
pub use types::{
    CandidateProduct, DateReference, LoaderError, LoaderResult, MissingDatePolicy, ProductLevel,
    Resolution, SpectralIndex,
};
