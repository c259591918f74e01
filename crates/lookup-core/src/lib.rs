#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for cached retail item lookups.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`ItemCache`](cache::ItemCache) - Local item cache
//! - [`ItemCatalog`](catalog::ItemCatalog) - Remote catalog and pricing service
//! - [`LookupError`](error::LookupError) - Error taxonomy

/// Cache trait and policy.
pub mod cache;
/// Remote catalog trait.
pub mod catalog;
/// Catalog environment and deployment mode.
pub mod environment;
/// Error types for lookup operations.
pub mod error;
/// Search and lookup result types.
pub mod search;
/// Core data types (identifiers, records, cache entries).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{CacheConfig, IndexFields, ItemCache, is_numeric_term};
pub use catalog::ItemCatalog;
pub use environment::{DeploymentMode, Environment};
pub use error::{LookupError, Result};
pub use search::{
    AdvancedSearchRequest, Facet, Facets, HierarchicalFacet, ItemLookup, PriceRange,
    SearchFilters, SearchPage, SearchResultItem, Source, TextSearchOptions,
};
pub use types::{
    Attributes, Brand, CacheKey, CacheMetadata, CachedEntry, ItemIdentifier, ItemRecord, Money,
    PriceRecord, StoreIdentifier, TextValue,
};
