//! Cache trait for storing looked-up items.
//!
//! This module defines the [`ItemCache`] trait that provides a unified
//! interface for the local item cache, plus [`CacheConfig`] holding the
//! expiration and eviction policy every backend applies.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::{
    error::{LookupError, Result},
    types::{CacheMetadata, CachedEntry, ItemIdentifier, ItemRecord, PriceRecord},
};

/// Default time-to-live of a cache entry (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of cached items.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default share of `max_entries` kept after a cleanup.
pub const DEFAULT_RETAIN_RATIO: f64 = 0.8;

/// Expiration and eviction policy of a cache backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Entries older than this (by `last_updated`) are expired.
    pub ttl: Duration,
    /// Cleanup runs after a write once the entry count exceeds this.
    pub max_entries: usize,
    /// Share of `max_entries` kept by a cleanup, in `0.0..=1.0`.
    pub retain_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            retain_ratio: DEFAULT_RETAIN_RATIO,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum number of entries.
    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the share of entries kept by a cleanup.
    #[must_use]
    pub fn with_retain_ratio(mut self, ratio: f64) -> Self {
        self.retain_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Number of entries left after a cleanup.
    #[must_use]
    pub fn retain_target(&self) -> usize {
        (self.max_entries as f64 * self.retain_ratio).floor() as usize
    }

    /// Number of entries a cleanup must delete when `total` are stored.
    ///
    /// Zero unless `total` exceeds `max_entries`.
    #[must_use]
    pub fn eviction_count(&self, total: usize) -> usize {
        if total <= self.max_entries {
            0
        } else {
            total.saturating_sub(self.retain_target())
        }
    }
}

/// Secondary lookup fields stored next to a cache entry.
///
/// Each field comes from the item's own identifier and falls back to the
/// identifier the entry was keyed by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFields {
    /// GTIN index value.
    pub gtin: Option<String>,
    /// SKU index value.
    pub sku: Option<String>,
    /// External item number index value.
    pub external_item_no: Option<String>,
}

impl IndexFields {
    /// Resolves the index fields of `item` keyed by `key_identifier`.
    #[must_use]
    pub fn resolve(key_identifier: &ItemIdentifier, item: &ItemRecord) -> Self {
        let own = item.identifier.as_ref();
        let pick = |from_item: Option<&str>, from_key: Option<&str>| {
            from_item.or(from_key).map(str::to_string)
        };
        Self {
            gtin: pick(
                own.and_then(ItemIdentifier::gtin_value),
                key_identifier.gtin_value(),
            ),
            sku: pick(
                own.and_then(ItemIdentifier::sku_value),
                key_identifier.sku_value(),
            ),
            external_item_no: pick(
                own.and_then(ItemIdentifier::external_item_no_value),
                key_identifier.external_item_no_value(),
            ),
        }
    }

    /// Returns true if a search term hits one of the indexes.
    ///
    /// Numeric terms are looked up in the GTIN index; every term is looked up
    /// in the SKU and external item number indexes. All matches are
    /// substring matches.
    #[must_use]
    pub fn matches_term(&self, term: &str) -> bool {
        let hit = |field: &Option<String>| field.as_deref().is_some_and(|v| v.contains(term));
        (is_numeric_term(term) && hit(&self.gtin)) || hit(&self.sku) || hit(&self.external_item_no)
    }
}

/// Returns true if `term` is non-empty and made of ASCII digits only.
#[must_use]
pub fn is_numeric_term(term: &str) -> bool {
    !term.is_empty() && term.bytes().all(|b| b.is_ascii_digit())
}

/// Trait for the local item cache.
///
/// The cache is an optimization only: callers treat every error as a miss.
/// Expiration is checked lazily when an entry is read.
#[async_trait]
pub trait ItemCache: Send + Sync + Debug {
    /// Creates the storage schema. Idempotent.
    async fn init(&self) -> Result<()>;

    /// Returns the entry for an identifier and store scope.
    ///
    /// An expired entry is deleted and reported as `Ok(None)`. A hit
    /// refreshes `last_accessed`.
    async fn get(
        &self,
        identifier: &ItemIdentifier,
        store_number: Option<u32>,
    ) -> Result<Option<CachedEntry>>;

    /// Upserts an item keyed by `identifier` and store scope, then runs
    /// [`Self::cleanup`].
    async fn put_keyed(
        &self,
        identifier: &ItemIdentifier,
        item: &ItemRecord,
        prices: Option<&[PriceRecord]>,
        store_number: Option<u32>,
    ) -> Result<()>;

    /// Upserts an item keyed by its own identifier.
    ///
    /// Fails with [`LookupError::InvalidParameter`] if the item carries no
    /// identifier.
    async fn put(
        &self,
        item: &ItemRecord,
        prices: Option<&[PriceRecord]>,
        store_number: Option<u32>,
    ) -> Result<()> {
        match item.identifier.as_ref() {
            Some(identifier) if !identifier.is_empty() => {
                self.put_keyed(identifier, item, prices, store_number).await
            }
            _ => Err(LookupError::InvalidParameter(
                "Cannot cache an item without identifier".to_string(),
            )),
        }
    }

    /// Searches cached entries by identifier indexes and display text.
    ///
    /// Unscoped entries match every store scope. Matches are deduplicated by
    /// key and get `last_accessed` refreshed.
    async fn search_by_text(
        &self,
        term: &str,
        store_number: Option<u32>,
    ) -> Result<Vec<CachedEntry>>;

    /// Removes an entry. Removing a missing entry is not an error.
    async fn remove(&self, identifier: &ItemIdentifier, store_number: Option<u32>) -> Result<()>;

    /// Evicts the least recently accessed entries once the cache holds more
    /// than `max_entries`.
    ///
    /// Returns the number of entries evicted.
    async fn cleanup(&self) -> Result<usize>;

    /// Removes every expired entry.
    ///
    /// Returns the number of entries removed.
    async fn purge_expired(&self) -> Result<usize>;

    /// Returns aggregate statistics.
    async fn stats(&self) -> Result<CacheMetadata>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_count_only_above_max() {
        let config = CacheConfig::new().with_max_entries(10);
        assert_eq!(config.retain_target(), 8);
        assert_eq!(config.eviction_count(0), 0);
        assert_eq!(config.eviction_count(10), 0);
        assert_eq!(config.eviction_count(11), 3);
        assert_eq!(config.eviction_count(25), 17);
    }

    #[test]
    fn test_default_policy() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(86_400));
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.retain_target(), 8_000);
    }

    #[test]
    fn test_index_fields_prefer_item_identifier() {
        let item = ItemRecord::new(
            ItemIdentifier::gtin("5711724072697").with_sku("SKU-1"),
            "Boots",
        );
        let fields = IndexFields::resolve(&ItemIdentifier::external_item_no("EXT-9"), &item);
        assert_eq!(fields.gtin.as_deref(), Some("5711724072697"));
        assert_eq!(fields.sku.as_deref(), Some("SKU-1"));
        assert_eq!(fields.external_item_no.as_deref(), Some("EXT-9"));
    }

    #[test]
    fn test_index_term_matching() {
        let fields = IndexFields {
            gtin: Some("5711724072697".to_string()),
            sku: Some("AB-123".to_string()),
            external_item_no: None,
        };
        assert!(fields.matches_term("57117"));
        assert!(fields.matches_term("123"));
        assert!(fields.matches_term("AB"));
        assert!(!fields.matches_term("ab"));
        assert!(!fields.matches_term("999"));
    }

    #[test]
    fn test_numeric_term() {
        assert!(is_numeric_term("123456789"));
        assert!(!is_numeric_term(""));
        assert!(!is_numeric_term("12a"));
    }
}
