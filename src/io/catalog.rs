use crate::core::geometry::gml_to_polygon;
use crate::io::cache::CacheStore;
use crate::types::{CandidateProduct, LoaderError, LoaderResult, ProductLevel};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// One catalog query, fully describing the candidate set it returns.
/// Equal requests have equal [`SearchRequest::cache_key`] values.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// WKT of the search area (bounding box of the requested polygon)
    pub area_wkt: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub level: ProductLevel,
    /// Cloud-coverage percentage bounds (inclusive)
    pub cloud_coverage: (u8, u8),
}

impl SearchRequest {
    /// OpenSearch query string sent to the catalog
    pub fn query(&self) -> String {
        format!(
            "footprint:\"Intersects({})\" \
             AND beginposition:[{}T00:00:00Z TO {}T23:59:59Z] \
             AND platformname:Sentinel-2 \
             AND producttype:{} \
             AND cloudcoverpercentage:[{} TO {}]",
            self.area_wkt,
            self.date_from.format("%Y-%m-%d"),
            self.date_to.format("%Y-%m-%d"),
            self.level.product_type(),
            self.cloud_coverage.0,
            self.cloud_coverage.1,
        )
    }

    /// Stable digest of the query, used to key the query-result cache
    pub fn cache_key(&self) -> String {
        let digest = Sha256::digest(self.query().as_bytes());
        format!("{:x}", digest)
    }

    /// Relative path of this request's entry in the query cache. Readable
    /// fields are kept alongside the digest so the cache can be inspected
    /// by hand.
    pub fn cache_file(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}-{}.json",
            self.level.product_type(),
            self.cache_key(),
            self.date_from.format("%Y%m%d"),
            self.date_to.format("%Y%m%d"),
            self.cloud_coverage.0,
            self.cloud_coverage.1,
        )
    }
}

/// Catalog search backend. The production implementation is
/// [`ScihubClient`]; tests substitute in-memory fakes.
pub trait CatalogSearch {
    fn search(&self, request: &SearchRequest) -> LoaderResult<Vec<CandidateProduct>>;
}

/// OpenSearch client for the Copernicus hub
pub struct ScihubClient {
    http: reqwest::blocking::Client,
    api_url: String,
    username: String,
    password: String,
}

impl ScihubClient {
    pub fn new(
        http: reqwest::blocking::Client,
        api_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Results per search page; the endpoint caps `rows` at 100
const SEARCH_PAGE_SIZE: usize = 100;

impl CatalogSearch for ScihubClient {
    fn search(&self, request: &SearchRequest) -> LoaderResult<Vec<CandidateProduct>> {
        let url = format!("{}search", self.api_url);
        let query = request.query();
        log::info!("Searching catalog: {}", query);

        collect_pages(SEARCH_PAGE_SIZE, |start| {
            let response = self
                .http
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .query(&[
                    ("start", start.to_string()),
                    ("rows", SEARCH_PAGE_SIZE.to_string()),
                    ("q", query.clone()),
                ])
                .send()
                .map_err(|e| LoaderError::Catalog(format!("search request failed: {}", e)))?;
            if !response.status().is_success() {
                return Err(LoaderError::Catalog(format!(
                    "search returned status {} for {}",
                    response.status().as_u16(),
                    url
                )));
            }

            let body = response
                .text()
                .map_err(|e| LoaderError::Catalog(format!("search response unreadable: {}", e)))?;
            parse_search_feed(&body, request.level)
        })
    }
}

/// Page through a search endpoint until a short page signals the end
fn collect_pages<F>(page_size: usize, mut fetch_page: F) -> LoaderResult<Vec<CandidateProduct>>
where
    F: FnMut(usize) -> LoaderResult<Vec<CandidateProduct>>,
{
    let mut products = Vec::new();
    let mut start = 0;
    loop {
        let page = fetch_page(start)?;
        let full_page = page.len() >= page_size;
        products.extend(page);
        if !full_page {
            break;
        }
        start += page_size;
    }
    Ok(products)
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    title: String,
    id: String,
    #[serde(rename = "str", default)]
    strs: Vec<NamedField>,
    #[serde(rename = "date", default)]
    dates: Vec<NamedField>,
    #[serde(rename = "double", default)]
    doubles: Vec<NamedField>,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text", default)]
    value: String,
}

fn field<'a>(fields: &'a [NamedField], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.value.as_str())
}

/// Parse the Atom feed returned by the OpenSearch endpoint
pub fn parse_search_feed(xml: &str, level: ProductLevel) -> LoaderResult<Vec<CandidateProduct>> {
    let feed: Feed = quick_xml::de::from_str(xml)
        .map_err(|e| LoaderError::XmlParsing(format!("search feed: {}", e)))?;

    let mut products = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let uuid = entry.id.clone();
        let gml = field(&entry.strs, "gmlfootprint").ok_or_else(|| {
            LoaderError::MetadataParse {
                uuid: uuid.clone(),
                detail: "missing gmlfootprint".to_string(),
            }
        })?;
        let footprint = gml_to_polygon(gml)?;

        let ingestion = field(&entry.dates, "ingestiondate").ok_or_else(|| {
            LoaderError::MetadataParse {
                uuid: uuid.clone(),
                detail: "missing ingestiondate".to_string(),
            }
        })?;
        let ingestion_date: DateTime<Utc> = DateTime::parse_from_rfc3339(ingestion)
            .map_err(|e| LoaderError::MetadataParse {
                uuid: uuid.clone(),
                detail: format!("bad ingestiondate '{}': {}", ingestion, e),
            })?
            .with_timezone(&Utc);

        let cloud_cover_pct: f64 = field(&entry.doubles, "cloudcoverpercentage")
            .unwrap_or("0")
            .parse()
            .map_err(|e| LoaderError::MetadataParse {
                uuid: uuid.clone(),
                detail: format!("bad cloudcoverpercentage: {}", e),
            })?;

        products.push(CandidateProduct {
            uuid,
            title: entry.title,
            ingestion_date,
            cloud_cover_pct,
            footprint,
            level,
        });
    }
    log::debug!("Parsed {} catalog entries", products.len());
    Ok(products)
}

/// Catalog backend wrapped with the on-disk query-result cache.
///
/// A repeated identical request is served from disk without touching the
/// backend. The cache is keyed by the full query digest; hits refresh the
/// entry's access time so the reaper keeps frequently-used queries.
pub struct CachedCatalog<C: CatalogSearch> {
    client: C,
    cache: CacheStore,
    enabled: bool,
}

impl<C: CatalogSearch> CachedCatalog<C> {
    pub fn new(client: C, cache: CacheStore, enabled: bool) -> Self {
        Self {
            client,
            cache,
            enabled,
        }
    }

    pub fn search(&self, request: &SearchRequest) -> LoaderResult<Vec<CandidateProduct>> {
        let key = request.cache_file();

        if self.enabled {
            if let Some(path) = self.cache.get(&key) {
                log::debug!("Catalog query cache hit: {}", key);
                let json = std::fs::read_to_string(&path)?;
                let products: Vec<CandidateProduct> = serde_json::from_str(&json)?;
                self.cache.touch(&key)?;
                return Ok(products);
            }
        }

        let products = self.client.search(request)?;
        if products.is_empty() {
            return Err(LoaderError::Catalog(format!(
                "no products found for {}",
                request.query()
            )));
        }

        if self.enabled {
            let json = serde_json::to_string(&products)?;
            self.cache.put_bytes(&key, json.as_bytes())?;
        }
        Ok(products)
    }
}
