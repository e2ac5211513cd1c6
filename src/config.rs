use std::path::PathBuf;

/// Immutable configuration for a [`crate::Sentinel2Loader`].
///
/// Constructed once at startup and passed to every pipeline call. All
/// mutation happens through the `with_*` builders before first use.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Catalog search endpoint
    pub api_url: String,
    /// Data host used for metadata and asset (OData) downloads
    pub odata_url: String,
    pub username: String,
    pub password: String,
    /// Root directory for all four cache tiers and temporary files
    pub data_path: PathBuf,
    /// Candidate products are searched in [date - tolerance, date]
    pub date_tolerance_days: i64,
    /// Cloud-coverage percentage bounds passed to the catalog query
    pub cloud_coverage: (u8, u8),
    /// Map requested band/resolution pairs to the native tier to download
    pub derive_resolutions: bool,
    /// Consult the catalog-query cache before hitting the remote API
    pub cache_api_calls: bool,
    /// Reuse cached metadata documents and tile files
    pub cache_tiles_data: bool,
    /// Near-infrared band used by NDVI/NDWI/EVI
    pub nir_band: String,
}

impl LoaderConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            api_url: "https://scihub.copernicus.eu/apihub/".to_string(),
            odata_url: "https://scihub.copernicus.eu/dhus/".to_string(),
            username: username.into(),
            password: password.into(),
            data_path: default_data_path(),
            date_tolerance_days: 5,
            cloud_coverage: (0, 80),
            derive_resolutions: true,
            cache_api_calls: true,
            cache_tiles_data: true,
            nir_band: "B08".to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_odata_url(mut self, url: impl Into<String>) -> Self {
        self.odata_url = url.into();
        self
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_date_tolerance_days(mut self, days: i64) -> Self {
        self.date_tolerance_days = days;
        self
    }

    pub fn with_cloud_coverage(mut self, min: u8, max: u8) -> Self {
        self.cloud_coverage = (min, max);
        self
    }

    pub fn with_derive_resolutions(mut self, enabled: bool) -> Self {
        self.derive_resolutions = enabled;
        self
    }

    pub fn with_cache_api_calls(mut self, enabled: bool) -> Self {
        self.cache_api_calls = enabled;
        self
    }

    pub fn with_cache_tiles_data(mut self, enabled: bool) -> Self {
        self.cache_tiles_data = enabled;
        self
    }

    pub fn with_nir_band(mut self, band: impl Into<String>) -> Self {
        self.nir_band = band.into();
        self
    }

    /// Directory for transient working files, under the cache root
    pub fn tmp_dir(&self) -> PathBuf {
        self.data_path.join("tmp")
    }
}

fn default_data_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sentile")
}
