//! SQLite-based cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lookup_core::{
    CacheConfig, CacheKey, CacheMetadata, CachedEntry, IndexFields, ItemCache, ItemIdentifier,
    ItemRecord, LookupError, PriceRecord, Result, is_numeric_term,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

const ENTRY_COLUMNS: &str =
    "cache_key, item_json, prices_json, store_number, last_updated, last_accessed";

fn cache_err(e: impl ToString) -> LookupError {
    LookupError::Cache(e.to_string())
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// A row of `item_cache` before its JSON columns are decoded.
struct StoredRow {
    key: String,
    item_json: String,
    prices_json: Option<String>,
    store_number: Option<i64>,
    last_updated: i64,
    last_accessed: i64,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            item_json: row.get(1)?,
            prices_json: row.get(2)?,
            store_number: row.get(3)?,
            last_updated: row.get(4)?,
            last_accessed: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<CachedEntry> {
        let item: ItemRecord =
            serde_json::from_str(&self.item_json).map_err(|e| LookupError::Parse(e.to_string()))?;
        let prices: Option<Vec<PriceRecord>> = self
            .prices_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| LookupError::Parse(e.to_string()))?;
        Ok(CachedEntry {
            key: CacheKey::from_raw(self.key),
            item,
            prices,
            store_number: self.store_number.and_then(|s| u32::try_from(s).ok()),
            last_updated: from_millis(self.last_updated),
            last_accessed: from_millis(self.last_accessed),
        })
    }
}

/// SQLite-based item cache.
///
/// Entries live in a single `item_cache` table keyed by [`CacheKey`], with
/// secondary indexes on the identifier fields, store number and access
/// time. A one-row `cache_metadata` table holds the aggregate statistics and
/// is refreshed after every mutation.
#[derive(Debug)]
pub struct SqliteItemCache {
    conn: Mutex<Connection>,
    config: CacheConfig,
}

impl SqliteItemCache {
    /// Create a new SQLite cache at the given path with the default policy.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(path, CacheConfig::default())
    }

    /// Create a new SQLite cache at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn with_config(path: impl AsRef<Path>, config: CacheConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(cache_err)?;
        Self::from_connection(conn, config)
    }

    /// Create an in-memory SQLite cache with the default policy.
    ///
    /// Data is lost when the cache is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with_config(CacheConfig::default())
    }

    /// Create an in-memory SQLite cache.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory_with_config(config: CacheConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(cache_err)?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: CacheConfig) -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(conn),
            config,
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// The expiration and eviction policy.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(cache_err)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS item_cache (
                cache_key TEXT PRIMARY KEY,
                gtin TEXT,
                sku TEXT,
                external_item_no TEXT,
                store_number INTEGER,
                item_json TEXT NOT NULL,
                prices_json TEXT,
                last_updated INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_item_cache_gtin ON item_cache(gtin);
            CREATE INDEX IF NOT EXISTS idx_item_cache_sku ON item_cache(sku);
            CREATE INDEX IF NOT EXISTS idx_item_cache_external_item_no
                ON item_cache(external_item_no);
            CREATE INDEX IF NOT EXISTS idx_item_cache_store_number ON item_cache(store_number);
            CREATE INDEX IF NOT EXISTS idx_item_cache_last_accessed ON item_cache(last_accessed);

            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                total_items INTEGER NOT NULL,
                oldest_entry INTEGER,
                newest_entry INTEGER,
                last_cleanup INTEGER
            );",
        )
        .map_err(cache_err)?;

        debug!("SQLite cache schema initialized");
        Ok(())
    }

    /// Recomputes the aggregate statistics row.
    ///
    /// `cleaned_at` is recorded as the last cleanup time when given; the
    /// previous value is kept otherwise.
    fn refresh_metadata(conn: &Connection, cleaned_at: Option<i64>) -> Result<()> {
        conn.execute(
            "INSERT INTO cache_metadata (key, total_items, oldest_entry, newest_entry, last_cleanup)
             SELECT 'stats', COUNT(*), MIN(last_updated), MAX(last_updated), ?1
             FROM item_cache WHERE true
             ON CONFLICT(key) DO UPDATE SET
                total_items = excluded.total_items,
                oldest_entry = excluded.oldest_entry,
                newest_entry = excluded.newest_entry,
                last_cleanup = COALESCE(excluded.last_cleanup, cache_metadata.last_cleanup)",
            params![cleaned_at],
        )
        .map_err(cache_err)?;
        Ok(())
    }

    fn delete_key(conn: &Connection, key: &str) -> Result<usize> {
        conn.execute("DELETE FROM item_cache WHERE cache_key = ?1", params![key])
            .map_err(cache_err)
    }

    /// Evicts least recently accessed rows down to the retain target.
    fn cleanup_locked(&self, conn: &Connection) -> Result<usize> {
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM item_cache", [], |row| row.get(0))
            .map_err(cache_err)?;
        let evict = self
            .config
            .eviction_count(usize::try_from(total).unwrap_or_default());
        if evict == 0 {
            return Ok(0);
        }

        debug!(
            total,
            max_entries = self.config.max_entries,
            evict,
            "Cache over capacity, evicting least recently accessed entries"
        );
        let deleted = conn
            .execute(
                "DELETE FROM item_cache WHERE cache_key IN (
                    SELECT cache_key FROM item_cache
                    ORDER BY last_accessed ASC, last_updated ASC
                    LIMIT ?1
                )",
                params![i64::try_from(evict).unwrap_or(i64::MAX)],
            )
            .map_err(cache_err)?;
        Self::refresh_metadata(conn, Some(to_millis(Utc::now())))?;
        Ok(deleted)
    }
}

#[async_trait]
impl ItemCache for SqliteItemCache {
    async fn init(&self) -> Result<()> {
        self.initialize_schema()
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn get(
        &self,
        identifier: &ItemIdentifier,
        store_number: Option<u32>,
    ) -> Result<Option<CachedEntry>> {
        let key = CacheKey::new(identifier, store_number);
        let now = Utc::now();
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM item_cache WHERE cache_key = ?1"),
                params![key.as_str()],
                StoredRow::from_row,
            )
            .optional()
            .map_err(cache_err)?;

        let Some(row) = row else {
            debug!("Cache miss");
            return Ok(None);
        };

        let mut entry = match row.into_entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Dropping unreadable cache entry");
                Self::delete_key(&conn, key.as_str())?;
                Self::refresh_metadata(&conn, None)?;
                return Ok(None);
            }
        };

        if entry.is_expired(now, self.config.ttl) {
            debug!("Cache entry expired");
            Self::delete_key(&conn, key.as_str())?;
            Self::refresh_metadata(&conn, None)?;
            return Ok(None);
        }

        entry.touch(now);
        conn.execute(
            "UPDATE item_cache SET last_accessed = ?2 WHERE cache_key = ?1",
            params![key.as_str(), to_millis(entry.last_accessed)],
        )
        .map_err(cache_err)?;

        debug!("Cache hit");
        Ok(Some(entry))
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
        let fields = IndexFields::resolve(identifier, item);
        let item_json = serde_json::to_string(item).map_err(|e| LookupError::Parse(e.to_string()))?;
        let prices_json = prices
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| LookupError::Parse(e.to_string()))?;
        let now = to_millis(Utc::now());

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO item_cache
             (cache_key, gtin, sku, external_item_no, store_number, item_json, prices_json,
              last_updated, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                key.as_str(),
                fields.gtin,
                fields.sku,
                fields.external_item_no,
                store_number,
                item_json,
                prices_json,
                now
            ],
        )
        .map_err(cache_err)?;
        Self::refresh_metadata(&conn, None)?;
        debug!(key = %key, "Cached item");

        self.cleanup_locked(&conn)?;
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

        let conn = self.lock()?;
        let rows = {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM item_cache
                     WHERE (?2 AND instr(gtin, ?1) > 0)
                        OR instr(sku, ?1) > 0
                        OR instr(external_item_no, ?1) > 0"
                ))
                .map_err(cache_err)?;
            stmt.query_map(params![term, is_numeric_term(term)], StoredRow::from_row)
                .map_err(cache_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(cache_err)?
        };

        let tx = conn.unchecked_transaction().map_err(cache_err)?;
        let mut expired = 0usize;
        let mut matches = Vec::new();
        for row in rows {
            let mut entry = match row.into_entry() {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };
            if entry.is_expired(now, self.config.ttl) {
                expired += Self::delete_key(&tx, entry.key.as_str())?;
                continue;
            }
            if !entry.visible_in(store_number) || !entry.text_matches(&needle) {
                continue;
            }
            entry.touch(now);
            tx.execute(
                "UPDATE item_cache SET last_accessed = ?2 WHERE cache_key = ?1",
                params![entry.key.as_str(), to_millis(entry.last_accessed)],
            )
            .map_err(cache_err)?;
            matches.push(entry);
        }
        if expired > 0 {
            Self::refresh_metadata(&tx, None)?;
        }
        tx.commit().map_err(cache_err)?;

        debug!(matches = matches.len(), expired, "Searched cached items");
        Ok(matches)
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn remove(&self, identifier: &ItemIdentifier, store_number: Option<u32>) -> Result<()> {
        let key = CacheKey::new(identifier, store_number);
        let conn = self.lock()?;
        let deleted = Self::delete_key(&conn, key.as_str())?;
        Self::refresh_metadata(&conn, None)?;
        debug!(deleted, "Removed cache entry");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup(&self) -> Result<usize> {
        let conn = self.lock()?;
        self.cleanup_locked(&conn)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> Result<usize> {
        let ttl = chrono::TimeDelta::from_std(self.config.ttl)
            .map_err(|e| LookupError::Cache(format!("Invalid TTL duration: {e}")))?;
        let cutoff = to_millis(Utc::now() - ttl);

        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM item_cache WHERE last_updated < ?1",
                params![cutoff],
            )
            .map_err(cache_err)?;
        Self::refresh_metadata(&conn, None)?;

        if deleted > 0 {
            debug!("Purged {} expired cache entries", deleted);
        }
        Ok(deleted)
    }

    async fn stats(&self) -> Result<CacheMetadata> {
        let conn = self.lock()?;
        Self::refresh_metadata(&conn, None)?;
        let (total, oldest, newest, last_cleanup) = conn
            .query_row(
                "SELECT total_items, oldest_entry, newest_entry, last_cleanup
                 FROM cache_metadata WHERE key = 'stats'",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .map_err(cache_err)?;

        Ok(CacheMetadata {
            total_items: usize::try_from(total).unwrap_or_default(),
            oldest_entry: oldest.map(from_millis),
            newest_entry: newest.map(from_millis),
            last_cleanup: last_cleanup.map(from_millis),
        })
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM item_cache", [])
            .map_err(cache_err)?;
        Self::refresh_metadata(&conn, None)?;

        debug!("Cleared all cache entries");
        Ok(())
    }
}
