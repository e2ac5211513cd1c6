use chrono::NaiveDate;
use sentile::core::{assemble_history, date_steps};
use sentile::io::catalog::parse_search_feed;
use sentile::io::{CacheStore, CachedCatalog, CatalogSearch, SearchRequest};
use sentile::{CandidateProduct, LoaderError, LoaderResult, MissingDatePolicy, ProductLevel};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, d).expect("valid day")
}

#[test]
fn test_history_skips_cloudy_dates_by_default() {
    let _ = env_logger::builder().is_test(true).try_init();
    println!("=== Region History With Missing Dates ===");

    // Every second date fails, as if the scene were fully clouded over.
    let mut provider = |date: NaiveDate| -> LoaderResult<PathBuf> {
        if date.signed_duration_since(day(1)).num_days() % 10 == 0 {
            Ok(PathBuf::from(format!("/tmp/{}-NDVI.tiff", date)))
        } else {
            Err(LoaderError::LowVisibility {
                fraction: 0.1,
                threshold: 0.5,
            })
        }
    };

    let series = assemble_history(&mut provider, day(1), day(26), 5, MissingDatePolicy::Skip)
        .expect("skip policy never fails the series");
    let dates: Vec<NaiveDate> = series.iter().map(|(d, _)| *d).collect();
    println!("Series dates: {:?}", dates);
    assert_eq!(dates, vec![day(1), day(11), day(21)]);
}

#[test]
fn test_history_abort_policy_stops_at_first_failure() {
    let mut provider = |date: NaiveDate| -> LoaderResult<PathBuf> {
        if date == day(11) {
            Err(LoaderError::Catalog("no products".to_string()))
        } else {
            Ok(PathBuf::from(format!("/tmp/{}.tiff", date)))
        }
    };

    let result = assemble_history(&mut provider, day(1), day(26), 5, MissingDatePolicy::Abort);
    assert!(matches!(result, Err(LoaderError::Catalog(_))));
}

#[test]
fn test_history_interpolation_is_rejected() {
    let mut provider = |date: NaiveDate| -> LoaderResult<PathBuf> {
        if date == day(11) {
            Err(LoaderError::Catalog("no products".to_string()))
        } else {
            Ok(PathBuf::from(format!("/tmp/{}.tiff", date)))
        }
    };

    let result = assemble_history(
        &mut provider,
        day(1),
        day(26),
        5,
        MissingDatePolicy::Interpolate,
    );
    assert!(matches!(result, Err(LoaderError::InterpolationUnsupported)));
}

#[test]
fn test_date_grid_includes_both_endpoints_when_aligned() {
    assert_eq!(date_steps(day(1), day(11), 5), vec![day(1), day(6), day(11)]);
    assert_eq!(date_steps(day(1), day(1), 5), vec![day(1)]);
}

const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>S2A_MSIL2A_20190106T101421</title>
    <id>aaaa-bbbb-cccc</id>
    <date name="ingestiondate">2019-01-06T18:30:00.000Z</date>
    <double name="cloudcoverpercentage">12.5</double>
    <str name="gmlfootprint">&lt;gml:Polygon&gt;&lt;gml:outerBoundaryIs&gt;&lt;gml:LinearRing&gt;&lt;gml:coordinates&gt;50.0,10.0 50.0,11.0 51.0,11.0 51.0,10.0 50.0,10.0&lt;/gml:coordinates&gt;&lt;/gml:LinearRing&gt;&lt;/gml:outerBoundaryIs&gt;&lt;/gml:Polygon&gt;</str>
  </entry>
</feed>"#;

struct CountingBackend {
    calls: Rc<Cell<usize>>,
}

impl CatalogSearch for CountingBackend {
    fn search(&self, _request: &SearchRequest) -> LoaderResult<Vec<CandidateProduct>> {
        self.calls.set(self.calls.get() + 1);
        parse_search_feed(SAMPLE_FEED, ProductLevel::L2A)
    }
}

#[test]
fn test_repeated_catalog_query_never_hits_backend_twice() {
    println!("=== Catalog Query Cache Idempotence ===");

    let calls = Rc::new(Cell::new(0));
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let catalog = CachedCatalog::new(
        CountingBackend {
            calls: Rc::clone(&calls),
        },
        CacheStore::new(temp_dir.path().join("apiquery")),
        true,
    );

    let request = SearchRequest {
        area_wkt: "POLYGON((10 50,11 50,11 51,10 51,10 50))".to_string(),
        date_from: day(1),
        date_to: day(6),
        level: ProductLevel::L2A,
        cloud_coverage: (0, 80),
    };

    let first = catalog.search(&request).expect("first search");
    let second = catalog.search(&request).expect("second search");
    let third = catalog.search(&request).expect("third search");

    assert_eq!(first.len(), 1);
    assert_eq!(second[0].uuid, first[0].uuid);
    assert_eq!(third[0].title, first[0].title);
    assert_eq!(calls.get(), 1, "repeat queries must be served from disk");
    println!("Backend searches performed: {}", calls.get());
}
