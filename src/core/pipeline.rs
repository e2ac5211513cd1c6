use crate::config::LoaderConfig;
use crate::core::gdal_ops;
use crate::core::geometry::{bbox_polygon, polygon_wkt};
use crate::core::index::{evi, normalized_difference, visible_land_fraction};
use crate::core::mosaic;
use crate::core::resolution::derive_download_resolution;
use crate::core::coverage::select_covering_products;
use crate::core::timeseries::assemble_history;
use crate::io::cache::{sweep_dir, unique_tmp_path, CacheStore};
use crate::io::catalog::{CachedCatalog, CatalogSearch, ScihubClient, SearchRequest};
use crate::io::download::{download_to, fetch_text};
use crate::types::{
    CandidateProduct, DateReference, LoaderError, LoaderResult, MissingDatePolicy, ProductLevel,
    Resolution, SpectralIndex,
};
use chrono::{Duration as ChronoDuration, NaiveDate};
use geo::Polygon;
use ndarray::Array2;
use regex::Regex;
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// First day Level-2A products are available; earlier dates fall back to
/// Level-1C.
const L2A_AVAILABLE_FROM: (i32, u32, u32) = (2018, 12, 18);

/// Options for [`Sentinel2Loader::get_region_history`]
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// Days between consecutive dates in the series
    pub days_step: i64,
    pub missing_date_policy: MissingDatePolicy,
    /// Reject dates whose visible-land fraction (from the SCL band) falls
    /// below this threshold; zero disables the filter
    pub min_visible_land: f64,
    /// Count thin-cirrus pixels as visible in the land filter
    pub keep_visible_with_cirrus: bool,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            days_step: 5,
            missing_date_policy: MissingDatePolicy::Skip,
            min_visible_land: 0.0,
            keep_visible_with_cirrus: false,
        }
    }
}

/// End-to-end Sentinel-2 retrieval pipeline: catalog search, coverage
/// selection, tile download and conversion, resampling, mosaicking, and
/// derived indices, with every stage backed by the on-disk cache tiers.
pub struct Sentinel2Loader<C: CatalogSearch> {
    config: LoaderConfig,
    catalog: CachedCatalog<C>,
    /// Metadata documents plus raw and resampled tiles, under
    /// `data_path/products`
    products: CacheStore,
    http: Client,
}

impl Sentinel2Loader<ScihubClient> {
    pub fn new(config: LoaderConfig) -> LoaderResult<Self> {
        let http = Client::builder().timeout(None).build()?;
        let client = ScihubClient::new(
            http.clone(),
            config.api_url.clone(),
            config.username.clone(),
            config.password.clone(),
        );
        Self::with_catalog(config, client)
    }
}

impl<C: CatalogSearch> Sentinel2Loader<C> {
    /// Build a loader over an arbitrary catalog backend. Tests inject
    /// fakes here; production goes through [`Sentinel2Loader::new`].
    pub fn with_catalog(config: LoaderConfig, client: C) -> LoaderResult<Self> {
        // downloads are large and slow; rely on the server to hang up
        let http = Client::builder().timeout(None).build()?;
        let catalog = CachedCatalog::new(
            client,
            CacheStore::new(config.data_path.join("apiquery")),
            config.cache_api_calls,
        );
        let products = CacheStore::new(config.data_path.join("products"));
        Ok(Self {
            config,
            catalog,
            products,
            http,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Fetch the tiles covering `polygon` for one band at one date,
    /// returning cached per-product GeoTIFF paths in selection order.
    pub fn get_product_band_tiles(
        &self,
        polygon: &Polygon<f64>,
        band: &str,
        resolution: Resolution,
        date_ref: DateReference,
    ) -> LoaderResult<Vec<PathBuf>> {
        let date = date_ref.resolve();
        let level = level_for_date(date);
        let download_resolution = if self.config.derive_resolutions {
            derive_download_resolution(resolution, band, level)
        } else {
            resolution
        };
        log::info!(
            "Getting {} tiles for band {} at {} (download tier {}) for {}",
            level.product_type(),
            band,
            resolution,
            download_resolution,
            date
        );

        // search and cover against the bounding box, not the exact shape
        let search_area = bbox_polygon(polygon)?;
        let request = SearchRequest {
            area_wkt: polygon_wkt(&search_area),
            date_from: date - ChronoDuration::days(self.config.date_tolerance_days),
            date_to: date,
            level,
            cloud_coverage: self.config.cloud_coverage,
        };
        let candidates = self.catalog.search(&request)?;
        let selection = select_covering_products(&search_area, &candidates)?;

        let mut tiles = Vec::with_capacity(selection.products.len());
        for product in &selection.products {
            tiles.push(self.fetch_band_tile(product, band, resolution, download_resolution)?);
        }
        Ok(tiles)
    }

    /// Materialize one product's band tile in the cache, converting and
    /// resampling as needed, and return its path.
    fn fetch_band_tile(
        &self,
        product: &CandidateProduct,
        band: &str,
        resolution: Resolution,
        download_resolution: Resolution,
    ) -> LoaderResult<PathBuf> {
        let metadata = self.product_metadata(product)?;
        let (granule, image) = parse_image_entry(
            &metadata,
            &product.uuid,
            band,
            product.level,
            download_resolution,
        )?;
        let start_date = parse_product_start_date(&metadata, &product.uuid)?;

        let raw_key = format!("{}/{}/{}.tiff", start_date, product.uuid, image);
        let raw_path = match self.products.get(&raw_key) {
            Some(path) if self.config.cache_tiles_data => {
                log::debug!("Reusing cached tile {}", raw_key);
                path
            }
            _ => {
                let url = granule_url(
                    &self.config.odata_url,
                    product,
                    &granule,
                    &image,
                    download_resolution,
                );
                log::info!(
                    "Downloading tile uuid='{}', resolution='{}', band='{}', date='{}'",
                    product.uuid,
                    download_resolution,
                    band,
                    start_date
                );
                self.download_and_convert(&url, band, &raw_key)?
            }
        };
        self.products.touch(&raw_key)?;

        if resolution == download_resolution {
            return Ok(raw_path);
        }

        let resampled_key = format!(
            "{}/{}/{}-{}.tiff",
            start_date, product.uuid, image, resolution
        );
        let resampled_path = match self.products.get(&resampled_key) {
            Some(path) if self.config.cache_tiles_data => path,
            _ => {
                log::debug!(
                    "Resampling band {} from {} to {}",
                    band,
                    download_resolution,
                    resolution
                );
                let tmp_dir = self.config.tmp_dir();
                fs::create_dir_all(&tmp_dir)?;
                let tmp = unique_tmp_path(&tmp_dir, "resample", "tiff");
                if let Err(e) = gdal_ops::resample(&raw_path, &tmp, resolution.meters()) {
                    let _ = fs::remove_file(&tmp);
                    return Err(e);
                }
                self.products.put_file(&resampled_key, &tmp)?
            }
        };
        self.products.touch(&resampled_key)?;
        Ok(resampled_path)
    }

    /// The product's metadata document, from cache or fetched and cached
    fn product_metadata(&self, product: &CandidateProduct) -> LoaderResult<String> {
        let key = format!("{}-MTD_MSIL{}.xml", product.uuid, product.level);
        if self.config.cache_tiles_data {
            if let Some(path) = self.products.get(&key) {
                log::debug!("Reusing cached metadata for '{}'", product.uuid);
                self.products.touch(&key)?;
                return Ok(fs::read_to_string(path)?);
            }
        }
        let url = format!(
            "{}odata/v1/Products('{}')/Nodes('{}.SAFE')/Nodes('MTD_MSIL{}.xml')/$value",
            self.config.odata_url, product.uuid, product.title, product.level
        );
        let contents = fetch_text(&self.http, &url, &self.config.username, &self.config.password)?;
        self.products.put_bytes(&key, contents.as_bytes())?;
        Ok(contents)
    }

    /// Download one JPEG2000 granule and convert it into the raw-tile
    /// cache. Transient files are removed on every exit path.
    fn download_and_convert(&self, url: &str, band: &str, raw_key: &str) -> LoaderResult<PathBuf> {
        let tmp_dir = self.config.tmp_dir();
        fs::create_dir_all(&tmp_dir)?;
        let jp2 = unique_tmp_path(&tmp_dir, "granule", "jp2");
        let tiff = unique_tmp_path(&tmp_dir, "granule", "tiff");

        let result = (|| {
            download_to(
                &self.http,
                url,
                &self.config.username,
                &self.config.password,
                &jp2,
            )?;
            if band == "TCI" {
                // compression artifacts leave near-black collar pixels that
                // survive into the mosaic unless blanked first
                log::debug!("Removing near-black compression artifacts");
                let darkened = unique_tmp_path(&tmp_dir, "nearblack", "tiff");
                let converted = gdal_ops::nearblack(&jp2, &darkened)
                    .and_then(|_| gdal_ops::translate(&darkened, &tiff));
                let _ = fs::remove_file(&darkened);
                converted?;
            } else {
                gdal_ops::translate(&jp2, &tiff)?;
            }
            self.products.put_file(raw_key, &tiff)
        })();

        let _ = fs::remove_file(&jp2);
        if result.is_err() {
            let _ = fs::remove_file(&tiff);
        }
        result
    }

    /// Mosaic already-fetched tiles into one raster clipped to the
    /// polygon's bounding box. The caller owns (and must delete) the
    /// returned transient file.
    pub fn crop_region(
        &self,
        polygon: &Polygon<f64>,
        tile_paths: &[PathBuf],
    ) -> LoaderResult<PathBuf> {
        mosaic::composite(polygon, tile_paths, &self.config.tmp_dir())
    }

    /// One band of the region as a single mosaicked raster
    pub fn get_region_band(
        &self,
        polygon: &Polygon<f64>,
        band: &str,
        resolution: Resolution,
        date_ref: DateReference,
    ) -> LoaderResult<PathBuf> {
        let tiles = self.get_product_band_tiles(polygon, band, resolution, date_ref)?;
        self.crop_region(polygon, &tiles)
    }

    /// A region band as a float array with its georeferencing; the
    /// intermediate region file is deleted.
    fn region_band_f32(
        &self,
        polygon: &Polygon<f64>,
        band: &str,
        resolution: Resolution,
        date_ref: DateReference,
    ) -> LoaderResult<(Array2<f32>, [f64; 6], String)> {
        let path = self.get_region_band(polygon, band, resolution, date_ref)?;
        let result = gdal_ops::read_band_f32(&path);
        let _ = fs::remove_file(&path);
        result
    }

    /// A derived spectral index of the region as a single-band float
    /// raster. The caller owns the returned transient file.
    pub fn get_region_index(
        &self,
        polygon: &Polygon<f64>,
        index: SpectralIndex,
        resolution: Resolution,
        date_ref: DateReference,
    ) -> LoaderResult<PathBuf> {
        let nir = self.config.nir_band.clone();
        let (data, geo_transform, projection) = match index {
            SpectralIndex::Ndvi => {
                let (red, gt, proj) = self.region_band_f32(polygon, "B04", resolution, date_ref)?;
                let (nir, _, _) = self.region_band_f32(polygon, &nir, resolution, date_ref)?;
                (normalized_difference(&nir, &red), gt, proj)
            }
            SpectralIndex::Ndwi => {
                let (b08, gt, proj) = self.region_band_f32(polygon, &nir, resolution, date_ref)?;
                let (b11, _, _) = self.region_band_f32(polygon, "B11", resolution, date_ref)?;
                (normalized_difference(&b08, &b11), gt, proj)
            }
            SpectralIndex::Ndmi => {
                let (b03, gt, proj) = self.region_band_f32(polygon, "B03", resolution, date_ref)?;
                let (b10, _, _) = self.region_band_f32(polygon, "B10", resolution, date_ref)?;
                (normalized_difference(&b03, &b10), gt, proj)
            }
            SpectralIndex::Evi => {
                let (b04, gt, proj) = self.region_band_f32(polygon, "B04", resolution, date_ref)?;
                let (b08, _, _) = self.region_band_f32(polygon, &nir, resolution, date_ref)?;
                let (b02, _, _) = self.region_band_f32(polygon, "B02", resolution, date_ref)?;
                (evi(&b08, &b04, &b02), gt, proj)
            }
        };

        let tmp_dir = self.config.tmp_dir();
        fs::create_dir_all(&tmp_dir)?;
        let dest = unique_tmp_path(&tmp_dir, &index.to_string().to_lowercase(), "tiff");
        // the driver creates the file before the write can fail
        if let Err(e) = gdal_ops::write_geotiff_f32(&dest, &data, &geo_transform, &projection) {
            let _ = fs::remove_file(&dest);
            return Err(e);
        }
        Ok(dest)
    }

    /// A band or index series over a date range, one raster per date that
    /// passes the filters. The caller owns the returned transient files.
    pub fn get_region_history(
        &self,
        polygon: &Polygon<f64>,
        band_or_index: &str,
        resolution: Resolution,
        date_from: NaiveDate,
        date_to: NaiveDate,
        options: &HistoryOptions,
    ) -> LoaderResult<Vec<(NaiveDate, PathBuf)>> {
        log::info!(
            "Getting region history for {} from {} to {} at {}",
            band_or_index,
            date_from,
            date_to,
            resolution
        );
        let index: Option<SpectralIndex> = band_or_index.parse().ok();
        let tmp_dir = self.config.tmp_dir();
        fs::create_dir_all(&tmp_dir)?;

        let mut provider = |date: NaiveDate| -> LoaderResult<PathBuf> {
            let date_ref = DateReference::Date(date);

            if options.min_visible_land > 0.0 {
                let scl = self.get_region_band(polygon, "SCL", resolution, date_ref)?;
                let read = gdal_ops::read_band_f32(&scl);
                let _ = fs::remove_file(&scl);
                let (labels, _, _) = read?;
                let fraction = visible_land_fraction(&labels, options.keep_visible_with_cirrus);
                if fraction < options.min_visible_land {
                    return Err(LoaderError::LowVisibility {
                        fraction,
                        threshold: options.min_visible_land,
                    });
                }
                log::debug!("Visible land fraction {:.4} accepted", fraction);
            }

            let region = match index {
                Some(idx) => self.get_region_index(polygon, idx, resolution, date_ref)?,
                None => self.get_region_band(polygon, band_or_index, resolution, date_ref)?,
            };
            let dest = unique_tmp_path(
                &tmp_dir,
                &format!("{}-{}-{}", date, band_or_index, resolution),
                "tiff",
            );
            stage_region_file(&region, &dest)?;
            Ok(dest)
        };

        assemble_history(
            &mut provider,
            date_from,
            date_to,
            options.days_step,
            options.missing_date_policy,
        )
    }

    /// Remove every cached file not accessed within `unused_days` days,
    /// across all cache tiers. Returns the number of files removed.
    pub fn cleanup_cache(&self, unused_days: u64) -> LoaderResult<usize> {
        sweep_dir(
            &self.config.data_path,
            Duration::from_secs(unused_days * 24 * 3600),
        )
    }
}

/// Move a finished region raster to its date-tagged location. The source
/// is removed even when the move fails so no transient file is left
/// behind.
fn stage_region_file(region: &Path, dest: &Path) -> LoaderResult<()> {
    if let Err(e) = fs::rename(region, dest) {
        let _ = fs::remove_file(region);
        return Err(e.into());
    }
    Ok(())
}

/// Processing level available at a given date
pub fn level_for_date(date: NaiveDate) -> ProductLevel {
    let (y, m, d) = L2A_AVAILABLE_FROM;
    let cutoff = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
    if date < cutoff {
        log::debug!(
            "Reference date {} before {}; using Level-1C tiles (no atmospheric correction)",
            date,
            cutoff
        );
        ProductLevel::L1C
    } else {
        ProductLevel::L2A
    }
}

/// Locate the granule directory and image name for a band inside a
/// product metadata document.
fn parse_image_entry(
    metadata: &str,
    uuid: &str,
    band: &str,
    level: ProductLevel,
    download_resolution: Resolution,
) -> LoaderResult<(String, String)> {
    let pattern = match level {
        ProductLevel::L1C => format!(
            "<IMAGE_FILE>GRANULE/([0-9A-Z_]+)/IMG_DATA/([0-9A-Z_]+_{})</IMAGE_FILE>",
            band
        ),
        ProductLevel::L2A => format!(
            "<IMAGE_FILE>GRANULE/([0-9A-Z_]+)/IMG_DATA/R{res}/([0-9A-Z_]+_{band}_{res})</IMAGE_FILE>",
            res = download_resolution,
            band = band
        ),
    };
    let re = Regex::new(&pattern).map_err(|e| LoaderError::MetadataParse {
        uuid: uuid.to_string(),
        detail: format!("bad image pattern: {}", e),
    })?;
    let captures = re.captures(metadata).ok_or_else(|| LoaderError::MetadataParse {
        uuid: uuid.to_string(),
        detail: format!(
            "no image entry for band {} at {}",
            band, download_resolution
        ),
    })?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// The product's sensing start date (YYYY-MM-DD) from its metadata
fn parse_product_start_date(metadata: &str, uuid: &str) -> LoaderResult<String> {
    let re = Regex::new(r"<PRODUCT_START_TIME>([\-0-9]+)T[0-9:.]+Z</PRODUCT_START_TIME>").map_err(
        |e| LoaderError::MetadataParse {
            uuid: uuid.to_string(),
            detail: format!("bad start-time pattern: {}", e),
        },
    )?;
    let captures = re.captures(metadata).ok_or_else(|| LoaderError::MetadataParse {
        uuid: uuid.to_string(),
        detail: "no PRODUCT_START_TIME in metadata".to_string(),
    })?;
    Ok(captures[1].to_string())
}

/// OData URL of one band's JPEG2000 granule on the data host
fn granule_url(
    odata_url: &str,
    product: &CandidateProduct,
    granule: &str,
    image: &str,
    download_resolution: Resolution,
) -> String {
    match product.level {
        ProductLevel::L2A => format!(
            "{}odata/v1/Products('{}')/Nodes('{}.SAFE')/Nodes('GRANULE')/Nodes('{}')\
             /Nodes('IMG_DATA')/Nodes('R{}')/Nodes('{}.jp2')/$value",
            odata_url, product.uuid, product.title, granule, download_resolution, image
        ),
        ProductLevel::L1C => format!(
            "{}odata/v1/Products('{}')/Nodes('{}.SAFE')/Nodes('GRANULE')/Nodes('{}')\
             /Nodes('IMG_DATA')/Nodes('{}.jp2')/$value",
            odata_url, product.uuid, product.title, granule, image
        ),
    }
}
