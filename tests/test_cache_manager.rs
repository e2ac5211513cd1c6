use sentile::io::CacheStore;
use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

#[test]
fn test_tile_cache_lifecycle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = CacheStore::new(temp_dir.path().join("products"));

    println!("=== Tile Cache Lifecycle Test ===");
    println!("Cache root: {}", store.root().display());

    // 1. Miss before anything is written
    assert!(store.get("2019-01-06/uuid-1/T23KKP_B04_20m.tiff").is_none());

    // 2. Write through the atomic byte path and read back
    let payload = b"GeoTIFF bytes";
    store
        .put_bytes("2019-01-06/uuid-1/T23KKP_B04_20m.tiff", payload)
        .expect("Failed to write cache entry");
    let hit = store
        .get("2019-01-06/uuid-1/T23KKP_B04_20m.tiff")
        .expect("Expected cache hit");
    assert_eq!(fs::read(&hit).expect("Failed to read entry"), payload);
    println!("Round-trip entry: {}", hit.display());

    // 3. Move a finished working file into the store
    let scratch = temp_dir.path().join("scratch.tiff");
    fs::write(&scratch, b"resampled").expect("Failed to write scratch file");
    store
        .put_file("2019-01-06/uuid-1/T23KKP_B04_20m-60m.tiff", &scratch)
        .expect("Failed to move file into cache");
    assert!(!scratch.exists(), "source should be consumed by put_file");

    // 4. Age one entry past the sweep threshold; the other must survive
    let stale = store
        .get("2019-01-06/uuid-1/T23KKP_B04_20m.tiff")
        .expect("entry written above");
    let old = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
    fs::OpenOptions::new()
        .append(true)
        .open(&stale)
        .expect("Failed to open entry")
        .set_modified(old)
        .expect("Failed to age entry");

    // a touch on the aged entry must rescue it from the sweep
    store
        .touch("2019-01-06/uuid-1/T23KKP_B04_20m.tiff")
        .expect("Failed to touch entry");

    let removed = store
        .sweep(Duration::from_secs(7 * 24 * 3600))
        .expect("Failed to sweep cache");
    println!("Swept {} file(s)", removed);
    assert_eq!(removed, 0, "touched entry must not be evicted");
    assert!(store.get("2019-01-06/uuid-1/T23KKP_B04_20m.tiff").is_some());
    assert!(store
        .get("2019-01-06/uuid-1/T23KKP_B04_20m-60m.tiff")
        .is_some());
}

#[test]
fn test_sweep_evicts_untouched_entries() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = CacheStore::new(temp_dir.path());

    let stale = store
        .put_bytes("apiquery/old-query.json", b"[]")
        .expect("Failed to write entry");
    store
        .put_bytes("apiquery/fresh-query.json", b"[]")
        .expect("Failed to write entry");

    let old = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
    fs::OpenOptions::new()
        .append(true)
        .open(&stale)
        .expect("Failed to open entry")
        .set_modified(old)
        .expect("Failed to age entry");

    let removed = store
        .sweep(Duration::from_secs(7 * 24 * 3600))
        .expect("Failed to sweep cache");
    assert_eq!(removed, 1);
    assert!(store.get("apiquery/old-query.json").is_none());
    assert!(store.get("apiquery/fresh-query.json").is_some());
}
