//! No-op cache implementation.

use async_trait::async_trait;
use lookup_core::{
    CacheMetadata, CachedEntry, ItemCache, ItemIdentifier, ItemRecord, PriceRecord, Result,
};
use tracing::trace;

/// A no-op cache that doesn't store anything.
///
/// Every `get` is a miss and every write succeeds without effect. Useful for
/// disabling caching or testing code paths without cache hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopItemCache;

impl NoopItemCache {
    /// Create a new no-op cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ItemCache for NoopItemCache {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(
        &self,
        _identifier: &ItemIdentifier,
        _store_number: Option<u32>,
    ) -> Result<Option<CachedEntry>> {
        trace!("NoopItemCache: get called, returning None");
        Ok(None)
    }

    async fn put_keyed(
        &self,
        _identifier: &ItemIdentifier,
        _item: &ItemRecord,
        _prices: Option<&[PriceRecord]>,
        _store_number: Option<u32>,
    ) -> Result<()> {
        trace!("NoopItemCache: put_keyed called, doing nothing");
        Ok(())
    }

    async fn search_by_text(
        &self,
        _term: &str,
        _store_number: Option<u32>,
    ) -> Result<Vec<CachedEntry>> {
        Ok(Vec::new())
    }

    async fn remove(&self, _identifier: &ItemIdentifier, _store_number: Option<u32>) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize> {
        Ok(0)
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    async fn stats(&self) -> Result<CacheMetadata> {
        Ok(CacheMetadata::default())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_never_hits() {
        let cache = NoopItemCache::new();
        let id = ItemIdentifier::gtin("5711724072697");
        cache
            .put_keyed(&id, &ItemRecord::new(id.clone(), "Boots"), None, None)
            .await
            .unwrap();
        assert!(cache.get(&id, None).await.unwrap().is_none());
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }
}
