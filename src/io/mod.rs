//! Catalog access, downloads and the on-disk cache tiers

pub mod cache;
pub mod catalog;
pub mod download;

// Re-export main types
pub use cache::CacheStore;
pub use catalog::{CachedCatalog, CatalogSearch, ScihubClient, SearchRequest};
