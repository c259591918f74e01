//! In-memory cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lookup_core::{
    CacheConfig, CacheKey, CacheMetadata, CachedEntry, IndexFields, ItemCache, ItemIdentifier,
    ItemRecord, LookupError, PriceRecord, Result,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// A cached entry together with its secondary index values.
#[derive(Debug, Clone)]
struct StoredEntry {
    entry: CachedEntry,
    index: IndexFields,
}

/// Simple in-memory item cache for testing and ephemeral clients.
///
/// Entries are stored in a `RwLock`-protected `HashMap` and are lost when the
/// cache is dropped. It applies the same expiration and eviction policy as
/// the SQLite cache.
#[derive(Debug, Default)]
pub struct InMemoryItemCache {
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
    last_cleanup: RwLock<Option<DateTime<Utc>>>,
    config: CacheConfig,
}

impl InMemoryItemCache {
    /// Create a new empty in-memory cache with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty in-memory cache with the given policy.
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn evict(&self, entries: &mut HashMap<CacheKey, StoredEntry>) -> usize {
        let evict = self.config.eviction_count(entries.len());
        if evict == 0 {
            return 0;
        }

        let mut by_access: Vec<_> = entries
            .values()
            .map(|s| (s.entry.last_accessed, s.entry.last_updated, s.entry.key.clone()))
            .collect();
        by_access.sort_by_key(|(accessed, updated, _)| (*accessed, *updated));
        for (_, _, key) in by_access.into_iter().take(evict) {
            entries.remove(&key);
        }
        debug!(evict, remaining = entries.len(), "Evicted least recently accessed entries");
        evict
    }
}

#[async_trait]
impl ItemCache for InMemoryItemCache {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn get(
        &self,
        identifier: &ItemIdentifier,
        store_number: Option<u32>,
    ) -> Result<Option<CachedEntry>> {
        let key = CacheKey::new(identifier, store_number);
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let Some(stored) = entries.get_mut(&key) else {
            debug!("Cache miss");
            return Ok(None);
        };
        if stored.entry.is_expired(now, self.config.ttl) {
            entries.remove(&key);
            debug!("Cache entry expired");
            return Ok(None);
        }

        stored.entry.touch(now);
        debug!("Cache hit");
        Ok(Some(stored.entry.clone()))
    }

    #[instrument(skip(self, item, prices), fields(identifier = %identifier))]
    async fn put_keyed(
        &self,
        identifier: &ItemIdentifier,
        item: &ItemRecord,
        prices: Option<&[PriceRecord]>,
        store_number: Option<u32>,
    ) -> Result<()> {
        if identifier.is_empty() {
            return Err(LookupError::InvalidParameter(
                "Cannot cache an item under an empty identifier".to_string(),
            ));
        }

        let key = CacheKey::new(identifier, store_number);
        let stored = StoredEntry {
            entry: CachedEntry::new(
                key.clone(),
                item.clone(),
                prices.map(<[PriceRecord]>::to_vec),
                store_number,
                Utc::now(),
            ),
            index: IndexFields::resolve(identifier, item),
        };

        let mut entries = self.entries.write().await;
        entries.insert(key, stored);
        if self.evict(&mut entries) > 0 {
            *self.last_cleanup.write().await = Some(Utc::now());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search_by_text(
        &self,
        term: &str,
        store_number: Option<u32>,
    ) -> Result<Vec<CachedEntry>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let needle = term.to_lowercase();
        let now = Utc::now();
        let ttl = self.config.ttl;

        let mut entries = self.entries.write().await;
        entries.retain(|_, s| !(s.index.matches_term(term) && s.entry.is_expired(now, ttl)));

        let matches: Vec<CachedEntry> = entries
            .values_mut()
            .filter(|s| s.index.matches_term(term))
            .filter(|s| s.entry.visible_in(store_number) && s.entry.text_matches(&needle))
            .map(|s| {
                s.entry.touch(now);
                s.entry.clone()
            })
            .collect();

        debug!(matches = matches.len(), "Searched cached items");
        Ok(matches)
    }

    async fn remove(&self, identifier: &ItemIdentifier, store_number: Option<u32>) -> Result<()> {
        let key = CacheKey::new(identifier, store_number);
        self.entries.write().await.remove(&key);
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let evicted = self.evict(&mut entries);
        if evicted > 0 {
            *self.last_cleanup.write().await = Some(Utc::now());
        }
        Ok(evicted)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, s| !s.entry.is_expired(now, self.config.ttl));
        let purged = before - entries.len();

        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        Ok(purged)
    }

    async fn stats(&self) -> Result<CacheMetadata> {
        let entries = self.entries.read().await;
        let updated = entries.values().map(|s| s.entry.last_updated);
        Ok(CacheMetadata {
            total_items: entries.len(),
            oldest_entry: updated.clone().min(),
            newest_entry: updated.max(),
            last_cleanup: *self.last_cleanup.read().await,
        })
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        debug!("Cleared all cache entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn numbered(i: usize) -> (ItemIdentifier, ItemRecord) {
        let id = ItemIdentifier::sku(format!("SKU-{i}"));
        let item = ItemRecord::new(id.clone(), format!("Item {i}"));
        (id, item)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = InMemoryItemCache::new();
        let id = ItemIdentifier::gtin("5711724072697");
        let item = ItemRecord::new(id.clone(), "Test Product");
        let prices = vec![PriceRecord::sales(29.99, "NOK")];

        assert!(cache.get(&id, Some(1000)).await.unwrap().is_none());
        cache.put_keyed(&id, &item, Some(&prices), Some(1000)).await.unwrap();

        let entry = cache.get(&id, Some(1000)).await.unwrap().unwrap();
        assert_eq!(entry.item, item);
        assert_eq!(entry.prices, Some(prices));
        assert!(cache.get(&id, Some(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache =
            InMemoryItemCache::with_config(CacheConfig::new().with_ttl(Duration::from_millis(10)));
        let (id, item) = numbered(1);
        cache.put_keyed(&id, &item, None, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&id, None).await.unwrap().is_none());
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_eviction_keeps_retain_target() {
        let cache = InMemoryItemCache::with_config(CacheConfig::new().with_max_entries(10));
        for i in 0..11 {
            let (id, item) = numbered(i);
            cache.put_keyed(&id, &item, None, None).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_items, 8);
        assert!(stats.last_cleanup.is_some());
        assert!(cache.get(&numbered(0).0, None).await.unwrap().is_none());
        assert!(cache.get(&numbered(10).0, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_search_matches_index_and_text() {
        let cache = InMemoryItemCache::new();
        let id = ItemIdentifier::sku("BOOT-1");
        let item = ItemRecord::new(id.clone(), "Winter Boots").with_brand("Acme");
        cache.put_keyed(&id, &item, None, Some(5)).await.unwrap();

        assert_eq!(cache.search_by_text("BOOT", Some(5)).await.unwrap().len(), 1);
        assert!(cache.search_by_text("BOOT", Some(6)).await.unwrap().is_empty());
        assert!(cache.search_by_text("SHOE", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let cache = InMemoryItemCache::new();
        cache.remove(&ItemIdentifier::gtin("1"), None).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap(), CacheMetadata::default());
    }
}
