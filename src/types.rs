use chrono::{DateTime, NaiveDate, Utc};
use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Native pixel-size classes a Sentinel-2 band may be distributed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    R10m,
    R20m,
    R60m,
}

impl Resolution {
    /// Pixel size in meters, as passed to the resampling tool
    pub fn meters(&self) -> u32 {
        match self {
            Resolution::R10m => 10,
            Resolution::R20m => 20,
            Resolution::R60m => 60,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::R10m => write!(f, "10m"),
            Resolution::R20m => write!(f, "20m"),
            Resolution::R60m => write!(f, "60m"),
        }
    }
}

impl FromStr for Resolution {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10m" => Ok(Resolution::R10m),
            "20m" => Ok(Resolution::R20m),
            "60m" => Ok(Resolution::R60m),
            other => Err(LoaderError::InvalidFormat(format!(
                "unknown resolution: {}",
                other
            ))),
        }
    }
}

/// Processing level of a Sentinel-2 product. Determines the available
/// resolution tiers and the metadata document schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductLevel {
    /// Level-1C (top of atmosphere), the only level before 2018-12-18
    L1C,
    /// Level-2A (atmospherically corrected)
    L2A,
}

impl ProductLevel {
    /// Catalog product-type identifier ("S2MSI1C" / "S2MSI2A")
    pub fn product_type(&self) -> &'static str {
        match self {
            ProductLevel::L1C => "S2MSI1C",
            ProductLevel::L2A => "S2MSI2A",
        }
    }
}

impl std::fmt::Display for ProductLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductLevel::L1C => write!(f, "1C"),
            ProductLevel::L2A => write!(f, "2A"),
        }
    }
}

/// One catalog search result: a product whose footprint may cover part of
/// the requested region. Read-only after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProduct {
    /// Opaque unique identifier assigned by the catalog
    pub uuid: String,
    /// Display title, also the .SAFE node name on the data host
    pub title: String,
    /// When the product was ingested into the catalog
    pub ingestion_date: DateTime<Utc>,
    /// Reported cloud coverage percentage (0..100)
    pub cloud_cover_pct: f64,
    /// Footprint polygon in WGS84 (lon, lat)
    pub footprint: Polygon<f64>,
    pub level: ProductLevel,
}

/// Derived spectral index computed pixel-wise from two or three bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralIndex {
    Ndvi,
    Ndwi,
    Ndmi,
    Evi,
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpectralIndex::Ndvi => write!(f, "NDVI"),
            SpectralIndex::Ndwi => write!(f, "NDWI"),
            SpectralIndex::Ndmi => write!(f, "NDMI"),
            SpectralIndex::Evi => write!(f, "EVI"),
        }
    }
}

impl FromStr for SpectralIndex {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NDVI" => Ok(SpectralIndex::Ndvi),
            "NDWI" => Ok(SpectralIndex::Ndwi),
            "NDMI" => Ok(SpectralIndex::Ndmi),
            "EVI" => Ok(SpectralIndex::Evi),
            other => Err(LoaderError::UnsupportedIndex(other.to_string())),
        }
    }
}

/// Reference date for a single-date request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateReference {
    /// Resolve against the current day
    Now,
    Date(NaiveDate),
}

impl DateReference {
    pub fn resolve(&self) -> NaiveDate {
        match self {
            DateReference::Now => Utc::now().date_naive(),
            DateReference::Date(d) => *d,
        }
    }
}

impl FromStr for DateReference {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "now" {
            return Ok(DateReference::Now);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DateReference::Date)
            .map_err(|e| LoaderError::InvalidFormat(format!("bad date reference '{}': {}", s, e)))
    }
}

/// Behavior when a single date in a time series cannot produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingDatePolicy {
    /// Log and move on to the next date
    #[default]
    Skip,
    /// Propagate the failure and abort the whole series
    Abort,
    /// Mark the date pending for interpolation against the last successful
    /// result. Interpolation itself is not implemented and raises
    /// [`LoaderError::InterpolationUnsupported`] when reached.
    Interpolate,
}

/// Error types for tile retrieval and mosaicking
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog search failed: {0}")]
    Catalog(String),

    #[error(
        "could not cover the requested polygon: residual area {residual_area} after \
         {candidates} candidate(s)"
    )]
    IncompleteCoverage { residual_area: f64, candidates: usize },

    #[error("metadata parse failed for product {uuid}: {detail}")]
    MetadataParse { uuid: String, detail: String },

    #[error("asset fetch failed with status {status}: {url}")]
    AssetFetch { url: String, status: u16 },

    #[error("unsupported index '{0}', expected NDVI, NDWI, NDMI or EVI")]
    UnsupportedIndex(String),

    #[error("interpolation of missing dates is not implemented")]
    InterpolationUnsupported,

    #[error("visible land ratio {fraction:.4} below threshold {threshold:.4}")]
    LowVisibility { fraction: f64, threshold: f64 },

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("invalid data format: {0}")]
    InvalidFormat(String),

    #[error("external tool '{tool}' failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;
