//! Read-through item lookup service.

use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use lookup_cache::InMemoryItemCache;
#[cfg(feature = "cache-sqlite")]
use lookup_cache::SqliteItemCache;
use lookup_catalog::CatalogClient;
use lookup_core::{
    AdvancedSearchRequest, CacheMetadata, CachedEntry, Environment, ItemCache, ItemCatalog,
    ItemIdentifier, ItemLookup, ItemRecord, LookupError, PriceRecord, Result, SearchFilters,
    SearchPage, SearchResultItem, Source, StoreIdentifier, TextSearchOptions,
};

use crate::config::LookupConfig;
use crate::credentials::CredentialSource;

/// Default number of results of [`LookupService::search_products`].
pub const DEFAULT_MAX_RESULTS: u32 = 20;

/// Minimum query length for [`LookupService::quick_search`].
const QUICK_SEARCH_MIN_CHARS: usize = 2;

/// Default number of suggestions of [`LookupService::quick_search`].
pub const DEFAULT_QUICK_SEARCH_RESULTS: u32 = 10;

/// Minimum length of an all-digit term treated as a GTIN.
const GTIN_MIN_DIGITS: usize = 8;

/// Minimum length of a term treated as a SKU.
const SKU_MIN_CHARS: usize = 3;

/// Product id of the throwaway item written by [`LookupService::check_service`].
const PROBE_PRODUCT_ID: &str = "__lookup_service_probe__";

/// Options for [`LookupService::get_item`] and [`LookupService::get_items`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetItemOptions {
    /// Store scope of the lookup and its prices.
    pub store_number: Option<u32>,
    /// Skip the cache read and always ask the catalog.
    pub force_refresh: bool,
    /// Read from and write to the cache.
    pub include_cache: bool,
}

impl Default for GetItemOptions {
    fn default() -> Self {
        Self {
            store_number: None,
            force_refresh: false,
            include_cache: true,
        }
    }
}

impl GetItemOptions {
    /// Options scoped to a store.
    #[must_use]
    pub fn for_store(store_number: u32) -> Self {
        Self {
            store_number: Some(store_number),
            ..Self::default()
        }
    }
}

/// Options for [`LookupService::search_products`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub max_results: u32,
    /// Number of remote results to skip.
    pub skip: Option<u32>,
    /// Store scope.
    pub store_number: Option<u32>,
    /// Filters; when set, the remote step uses the advanced search.
    pub filters: Option<SearchFilters>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            skip: None,
            store_number: None,
            filters: None,
        }
    }
}

/// Readiness and cache state of a [`LookupService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    /// `init` succeeded.
    pub initialized: bool,
    /// The catalog has a credential.
    pub configured: bool,
    /// Configured catalog environment.
    pub environment: Option<Environment>,
    /// Cache statistics, when readable.
    pub cache: Option<CacheMetadata>,
}

/// Outcome of [`LookupService::check_service`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCheck {
    /// Catalog connection probe result.
    pub catalog: std::result::Result<(), LookupError>,
    /// Cache write/read/remove probe result.
    pub cache: std::result::Result<(), LookupError>,
}

impl ServiceCheck {
    /// Returns true if both probes succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.catalog.is_ok() && self.cache.is_ok()
    }
}

/// Maps a search term that looks like an identifier to one.
///
/// All-digit terms of at least 8 characters are GTINs; other terms made of
/// ASCII alphanumerics, `-` and `_` with at least 3 characters are treated as
/// a SKU or external item number.
#[must_use]
pub fn identifier_for_term(term: &str) -> Option<ItemIdentifier> {
    let term = term.trim();
    if term.len() >= GTIN_MIN_DIGITS && term.bytes().all(|b| b.is_ascii_digit()) {
        return Some(ItemIdentifier::gtin(term));
    }
    let identifier_like = term
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    (term.len() >= SKU_MIN_CHARS && identifier_like)
        .then(|| ItemIdentifier::sku(term).with_external_item_no(term))
}

/// Read-through item lookup over a local cache and a remote catalog.
///
/// The cache is an optimization: read failures degrade to a miss and write
/// failures are logged and ignored. Every lookup first checks readiness
/// (`init` called and catalog configured) and fails with
/// [`LookupError::NotConfigured`] without touching storage or network.
///
/// # Example
///
/// ```rust,ignore
/// use lookup::{GetItemOptions, ItemIdentifier, LookupConfig, LookupService};
/// use lookup::Environment;
///
/// let service = LookupService::from_config(&LookupConfig::default())?;
/// service.init().await?;
/// service.configure("token", Environment::Test);
///
/// let lookup = service
///     .get_item(&ItemIdentifier::gtin("5711724072697"), GetItemOptions::for_store(1000))
///     .await?;
/// println!("{} from {}", lookup.item.display_text().unwrap_or_default(), lookup.source);
/// ```
pub struct LookupService {
    cache: Arc<dyn ItemCache>,
    catalog: Arc<dyn ItemCatalog>,
    credentials: Option<Arc<dyn CredentialSource>>,
    sweep_interval: Option<Duration>,
    initialized: AtomicBool,
    lazy_configure_attempted: AtomicBool,
}

impl std::fmt::Debug for LookupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupService")
            .field("cache", &self.cache)
            .field("catalog", &self.catalog)
            .field("credentials", &self.credentials.as_ref().map(|_| "configured"))
            .field("sweep_interval", &self.sweep_interval)
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .finish()
    }
}

impl LookupService {
    /// Create a service over the given cache and catalog.
    #[must_use]
    pub fn new(cache: Arc<dyn ItemCache>, catalog: Arc<dyn ItemCatalog>) -> Self {
        Self {
            cache,
            catalog,
            credentials: None,
            sweep_interval: None,
            initialized: AtomicBool::new(false),
            lazy_configure_attempted: AtomicBool::new(false),
        }
    }

    /// Build the cache and catalog client described by `config`.
    ///
    /// # Errors
    /// Returns an error if the cache database cannot be opened or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        let cache_config = config.cache_config();
        #[cfg(feature = "cache-sqlite")]
        let cache: Arc<dyn ItemCache> = match &config.cache_path {
            Some(path) => Arc::new(SqliteItemCache::with_config(path, cache_config)?),
            None => Arc::new(SqliteItemCache::in_memory_with_config(cache_config)?),
        };
        #[cfg(not(feature = "cache-sqlite"))]
        let cache: Arc<dyn ItemCache> = Arc::new(InMemoryItemCache::with_config(cache_config));

        let catalog = CatalogClient::with_timeout(
            config.endpoints(),
            config.deployment,
            config.request_timeout(),
        )?
        .with_user_id(config.user_id.clone());

        let mut service = Self::new(cache, Arc::new(catalog));
        service.sweep_interval = config.sweep_interval();
        Ok(service)
    }

    /// Create a service with an in-memory cache, e.g. for tests.
    #[must_use]
    pub fn in_memory(catalog: Arc<dyn ItemCatalog>) -> Self {
        Self::new(Arc::new(InMemoryItemCache::new()), catalog)
    }

    /// Attach a credential source used for one lazy configure attempt when
    /// a lookup finds the catalog unconfigured.
    #[must_use]
    pub fn with_credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    /// Set the interval of the background expiry sweep.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Initialize the cache storage. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the storage schema cannot be created; the service
    /// then stays not ready.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        self.cache.init().await?;
        self.initialized.store(true, Ordering::Release);
        debug!("Lookup service initialized");
        Ok(())
    }

    /// Configure the catalog credential and environment.
    pub fn configure(&self, credential: &str, environment: Environment) {
        self.catalog.configure(credential, environment);
    }

    /// Returns true once `init` succeeded and the catalog is configured.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && self.catalog.is_configured()
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        if !self.initialized.load(Ordering::Acquire) {
            return Err(LookupError::NotConfigured(
                "Lookup service not initialized. Call init() first.".to_string(),
            ));
        }

        if let Some(source) = &self.credentials {
            if !self.lazy_configure_attempted.swap(true, Ordering::AcqRel) {
                match source.load().await {
                    Ok(Some(credentials)) => {
                        info!(environment = %credentials.environment, "Configuring catalog from stored credentials");
                        self.catalog
                            .configure(&credentials.token, credentials.environment);
                    }
                    Ok(None) => debug!("No stored catalog credentials"),
                    Err(e) => warn!(error = %e, "Failed to load stored catalog credentials"),
                }
            }
        }

        if self.catalog.is_configured() {
            Ok(())
        } else {
            Err(LookupError::NotConfigured(
                "Item catalog not configured. Provide a bearer token and environment.".to_string(),
            ))
        }
    }

    async fn cached(
        &self,
        identifier: &ItemIdentifier,
        store_number: Option<u32>,
    ) -> Option<CachedEntry> {
        match self.cache.get(identifier, store_number).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn remember(
        &self,
        identifier: &ItemIdentifier,
        item: &ItemRecord,
        prices: Option<&[PriceRecord]>,
        store_number: Option<u32>,
    ) {
        if let Err(e) = self
            .cache
            .put_keyed(identifier, item, prices, store_number)
            .await
        {
            warn!(identifier = %identifier, error = %e, "Failed to cache item");
        }
    }

    async fn fetch_prices(
        &self,
        identifier: &ItemIdentifier,
        store_number: Option<u32>,
    ) -> (Option<Vec<PriceRecord>>, Option<LookupError>) {
        match self
            .catalog
            .get_prices(identifier, StoreIdentifier::from_option(store_number))
            .await
        {
            Ok(prices) => (Some(prices), None),
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Item found but price lookup failed");
                (None, Some(e))
            }
        }
    }

    /// Look up one item, cache first.
    ///
    /// # Errors
    /// - [`LookupError::NotConfigured`] if the service is not ready
    /// - [`LookupError::InvalidParameter`] for an empty identifier
    /// - [`LookupError::NotFound`] if the catalog returned no item
    /// - [`LookupError::Transport`] / [`LookupError::Protocol`] if the item
    ///   request failed
    ///
    /// A failed price request is not an error: the lookup carries the item
    /// with `prices: None` and the reason in `price_error`.
    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn get_item(
        &self,
        identifier: &ItemIdentifier,
        options: GetItemOptions,
    ) -> Result<ItemLookup> {
        self.ensure_ready().await?;
        if identifier.is_empty() {
            return Err(LookupError::InvalidParameter(
                "Item identifier has no value".to_string(),
            ));
        }
        let store = options.store_number;

        if options.include_cache && !options.force_refresh {
            if let Some(entry) = self.cached(identifier, store).await {
                debug!("Cache hit");
                return Ok(ItemLookup::from_cache(entry));
            }
        }

        debug!("Fetching item from catalog");
        let mut items = self
            .catalog
            .get_items_by_identifiers(slice::from_ref(identifier))
            .await?;
        if items.is_empty() {
            return Err(LookupError::NotFound(identifier.to_string()));
        }
        let index = items
            .iter()
            .position(|item| {
                item.identifier
                    .as_ref()
                    .is_some_and(|own| own.matches(identifier))
            })
            .unwrap_or(0);
        let item = items.swap_remove(index);

        let (prices, price_error) = self.fetch_prices(identifier, store).await;
        if options.include_cache {
            self.remember(identifier, &item, prices.as_deref(), store)
                .await;
        }

        Ok(ItemLookup {
            item,
            prices,
            source: Source::Api,
            price_error,
        })
    }

    /// Look up several items: cache hits first, then one batched catalog
    /// request for the misses with prices fetched concurrently.
    ///
    /// # Errors
    /// Fails if the service is not ready, the list is empty, or the batched
    /// item request fails. Price failures are reported per item.
    #[instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    pub async fn get_items(
        &self,
        identifiers: &[ItemIdentifier],
        options: GetItemOptions,
    ) -> Result<Vec<ItemLookup>> {
        self.ensure_ready().await?;
        if identifiers.is_empty() {
            return Err(LookupError::InvalidParameter(
                "No item identifiers provided".to_string(),
            ));
        }
        let store = options.store_number;

        let mut results = Vec::with_capacity(identifiers.len());
        let mut misses = Vec::new();
        for identifier in identifiers.iter().filter(|id| !id.is_empty()) {
            if options.include_cache && !options.force_refresh {
                if let Some(entry) = self.cached(identifier, store).await {
                    results.push(ItemLookup::from_cache(entry));
                    continue;
                }
            }
            misses.push(identifier.clone());
        }
        debug!(hits = results.len(), misses = misses.len(), "Checked cache");
        if misses.is_empty() {
            return Ok(results);
        }

        let items = self.catalog.get_items_by_identifiers(&misses).await?;
        let misses = &misses;
        let fetched = join_all(items.into_iter().map(|item| async move {
            let requested = misses.iter().find(|id| {
                item.identifier
                    .as_ref()
                    .is_some_and(|own| own.matches(id))
            });
            let price_identifier = item
                .identifier
                .clone()
                .filter(|own| !own.is_empty())
                .or_else(|| requested.cloned());

            let (prices, price_error) = match &price_identifier {
                Some(identifier) => self.fetch_prices(identifier, store).await,
                None => (
                    None,
                    Some(LookupError::InvalidParameter(
                        "Item has no identifier for price lookup".to_string(),
                    )),
                ),
            };

            if options.include_cache {
                match requested.or(price_identifier.as_ref()) {
                    Some(key) => self.remember(key, &item, prices.as_deref(), store).await,
                    None => warn!("Skipping cache write for item without identifier"),
                }
            }

            ItemLookup {
                item,
                prices,
                source: Source::Api,
                price_error,
            }
        }))
        .await;

        debug!(fetched = fetched.len(), "Fetched items from catalog");
        results.extend(fetched);
        Ok(results)
    }

    /// Look up a scanned or typed code as a SKU, retrying as a GTIN if that
    /// fails.
    ///
    /// # Errors
    /// Returns the GTIN attempt's error when both attempts fail, or
    /// [`LookupError::NotConfigured`] without a retry.
    #[instrument(skip(self))]
    pub async fn get_item_by_code(&self, code: &str, options: GetItemOptions) -> Result<ItemLookup> {
        let code = code.trim();
        if code.is_empty() {
            self.ensure_ready().await?;
            return Err(LookupError::InvalidParameter(
                "Item code cannot be empty".to_string(),
            ));
        }

        match self.get_item(&ItemIdentifier::sku(code), options).await {
            Ok(lookup) => Ok(lookup),
            Err(e) if e.is_not_configured() => Err(e),
            Err(e) => {
                debug!(error = %e, "SKU lookup failed, retrying as GTIN");
                self.get_item(&ItemIdentifier::gtin(code), options).await
            }
        }
    }

    /// Search products: cached items first, then a direct identifier lookup
    /// for identifier-like terms, then the catalog's text search.
    ///
    /// The first step with results wins. Remote search results are not
    /// cached.
    ///
    /// # Errors
    /// Fails if the service is not ready, the query is blank, or the remote
    /// search fails.
    #[instrument(skip(self, options))]
    pub async fn search_products(&self, query: &str, options: SearchOptions) -> Result<SearchPage> {
        self.ensure_ready().await?;
        let query = query.trim();
        if query.is_empty() {
            return Err(LookupError::InvalidParameter(
                "Search query cannot be empty".to_string(),
            ));
        }
        let store = options.store_number;
        let max = options.max_results;

        let cached = self.search_cached_entries(query, store).await;
        if !cached.is_empty() {
            debug!(hits = cached.len(), "Search served from cache");
            return Ok(page_of(cached, max));
        }

        if let Some(identifier) = identifier_for_term(query) {
            let lookup_options = GetItemOptions {
                store_number: store,
                ..GetItemOptions::default()
            };
            match self.get_item(&identifier, lookup_options).await {
                Ok(lookup) => {
                    debug!(source = %lookup.source, "Search resolved by identifier lookup");
                    return Ok(SearchPage {
                        items: vec![SearchResultItem::from_lookup(&lookup)],
                        total_count: Some(1),
                        facets: None,
                    });
                }
                Err(e) if e.is_not_configured() => return Err(e),
                Err(e) => debug!(error = %e, "Identifier lookup found nothing, using text search"),
            }
        }

        match options.filters {
            Some(filters) => {
                let request = AdvancedSearchRequest {
                    query: query.to_string(),
                    top: max,
                    skip: options.skip,
                    store_number: store,
                    filters,
                };
                self.catalog.advanced_search(&request).await
            }
            None => {
                let text_options = TextSearchOptions {
                    top: Some(max),
                    skip: options.skip,
                    store_number: store,
                };
                self.catalog.search_text(query, text_options).await
            }
        }
    }

    async fn search_cached_entries(&self, term: &str, store: Option<u32>) -> Vec<CachedEntry> {
        match self.cache.search_by_text(term, store).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cache search failed, treating as no results");
                Vec::new()
            }
        }
    }

    /// Search cached items only.
    ///
    /// # Errors
    /// Fails only if the service is not ready.
    #[instrument(skip(self))]
    pub async fn search_cached(
        &self,
        term: &str,
        store_number: Option<u32>,
    ) -> Result<Vec<SearchResultItem>> {
        self.ensure_ready().await?;
        let entries = self.search_cached_entries(term, store_number).await;
        Ok(entries
            .iter()
            .map(|e| SearchResultItem::from_item(&e.item, e.prices.as_deref(), Source::Cache))
            .collect())
    }

    /// Autocomplete suggestions, at most [`DEFAULT_QUICK_SEARCH_RESULTS`]
    /// unless `max_results` says otherwise. Queries shorter than two
    /// characters yield no suggestions.
    ///
    /// # Errors
    /// Fails if the service is not ready or the remote request fails.
    #[instrument(skip(self))]
    pub async fn quick_search(
        &self,
        query: &str,
        max_results: Option<u32>,
    ) -> Result<Vec<SearchResultItem>> {
        self.ensure_ready().await?;
        let query = query.trim();
        if query.chars().count() < QUICK_SEARCH_MIN_CHARS {
            return Ok(Vec::new());
        }
        let top = max_results.unwrap_or(DEFAULT_QUICK_SEARCH_RESULTS);
        self.catalog.suggest(query, Some(top)).await
    }

    /// Cache statistics. A storage failure yields empty statistics.
    ///
    /// # Errors
    /// Fails only if the service is not ready.
    pub async fn cache_stats(&self) -> Result<CacheMetadata> {
        self.ensure_ready().await?;
        Ok(self.cache.stats().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read cache statistics");
            CacheMetadata::default()
        }))
    }

    /// Remove every cached item. A storage failure is logged.
    ///
    /// # Errors
    /// Fails only if the service is not ready.
    pub async fn clear_cache(&self) -> Result<()> {
        self.ensure_ready().await?;
        match self.cache.clear().await {
            Ok(()) => info!("Item cache cleared"),
            Err(e) => warn!(error = %e, "Failed to clear item cache"),
        }
        Ok(())
    }

    /// Readiness and cache state, without readiness checks.
    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            initialized: self.initialized.load(Ordering::Acquire),
            configured: self.catalog.is_configured(),
            environment: self.catalog.environment(),
            cache: self.cache.stats().await.ok(),
        }
    }

    /// Probe the catalog connection and a cache write/read/remove cycle.
    #[instrument(skip(self))]
    pub async fn check_service(&self) -> ServiceCheck {
        let catalog = self.catalog.check_connection().await;
        let cache = self.probe_cache().await;
        if let Err(e) = &catalog {
            warn!(error = %e, "Catalog connection check failed");
        }
        if let Err(e) = &cache {
            warn!(error = %e, "Cache check failed");
        }
        ServiceCheck { catalog, cache }
    }

    async fn probe_cache(&self) -> Result<()> {
        let identifier = ItemIdentifier::default().with_product_id(PROBE_PRODUCT_ID);
        let item = ItemRecord::new(identifier.clone(), "Cache probe");
        self.cache.put_keyed(&identifier, &item, None, None).await?;
        let hit = self.cache.get(&identifier, None).await?;
        self.cache.remove(&identifier, None).await?;
        match hit {
            Some(entry) if entry.item == item => Ok(()),
            _ => Err(LookupError::Cache(
                "Probe item was not readable after write".to_string(),
            )),
        }
    }

    /// Spawn the periodic expiry sweep if an interval is configured.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_expiry_sweep(&self) -> Option<JoinHandle<()>> {
        let period = self.sweep_interval?;
        let cache = Arc::clone(&self.cache);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Expiry sweep removed entries"),
                    Err(e) => warn!(error = %e, "Expiry sweep failed"),
                }
            }
        }))
    }
}

fn page_of(entries: Vec<CachedEntry>, max: u32) -> SearchPage {
    let total = entries.len() as u64;
    let items = entries
        .iter()
        .take(max as usize)
        .map(|e| SearchResultItem::from_item(&e.item, e.prices.as_deref(), Source::Cache))
        .collect();
    SearchPage {
        items,
        total_count: Some(total),
        facets: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, StaticCredentials};
    use async_trait::async_trait;
    use lookup_core::{CacheConfig, CacheKey};
    use std::sync::Mutex;

    const GTIN: &str = "5711724072697";

    /// Catalog fake recording every call.
    #[derive(Debug, Default)]
    struct FakeCatalog {
        environment: Mutex<Option<Environment>>,
        items: Vec<ItemRecord>,
        prices: Mutex<Option<Vec<PriceRecord>>>,
        search_hits: Vec<SearchResultItem>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with_items(items: Vec<ItemRecord>) -> Self {
            Self {
                items,
                prices: Mutex::new(Some(vec![PriceRecord::sales(29.99, "NOK")])),
                ..Default::default()
            }
        }

        fn set_prices(&self, prices: Option<Vec<PriceRecord>>) {
            *self.prices.lock().unwrap() = prices;
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ItemCatalog for FakeCatalog {
        fn configure(&self, _credential: &str, environment: Environment) {
            *self.environment.lock().unwrap() = Some(environment);
        }

        fn is_configured(&self) -> bool {
            self.environment.lock().unwrap().is_some()
        }

        fn environment(&self) -> Option<Environment> {
            *self.environment.lock().unwrap()
        }

        async fn get_items_by_identifiers(
            &self,
            identifiers: &[ItemIdentifier],
        ) -> Result<Vec<ItemRecord>> {
            let keys: Vec<String> = identifiers.iter().map(ToString::to_string).collect();
            self.record(format!("items:{}", keys.join(",")));
            Ok(self
                .items
                .iter()
                .filter(|item| {
                    item.identifier
                        .as_ref()
                        .is_some_and(|own| identifiers.iter().any(|id| own.matches(id)))
                })
                .cloned()
                .collect())
        }

        async fn get_prices(
            &self,
            identifier: &ItemIdentifier,
            store: StoreIdentifier,
        ) -> Result<Vec<PriceRecord>> {
            self.record(format!("prices:{identifier}:{:?}", store.store_number));
            self.prices
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LookupError::Transport("price service down".to_string()))
        }

        async fn search_text(&self, query: &str, options: TextSearchOptions) -> Result<SearchPage> {
            self.record(format!("search_text:{query}:{:?}", options.top));
            Ok(SearchPage {
                items: self.search_hits.clone(),
                total_count: Some(self.search_hits.len() as u64),
                facets: None,
            })
        }

        async fn advanced_search(&self, request: &AdvancedSearchRequest) -> Result<SearchPage> {
            self.record(format!("advanced:{}", request.query));
            Ok(SearchPage::default())
        }

        async fn suggest(&self, query: &str, top: Option<u32>) -> Result<Vec<SearchResultItem>> {
            self.record(format!("suggest:{query}:{top:?}"));
            Ok(self.search_hits.clone())
        }

        async fn check_connection(&self) -> Result<()> {
            self.record("check".to_string());
            Ok(())
        }
    }

    /// In-memory cache that records the name of every operation.
    #[derive(Debug, Default)]
    struct RecordingCache {
        inner: InMemoryItemCache,
        ops: Mutex<Vec<&'static str>>,
    }

    impl RecordingCache {
        fn record(&self, op: &'static str) {
            self.ops.lock().unwrap().push(op);
        }

        fn take_ops(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.ops.lock().unwrap())
        }
    }

    #[async_trait]
    impl ItemCache for RecordingCache {
        async fn init(&self) -> Result<()> {
            self.record("init");
            self.inner.init().await
        }
        async fn get(&self, id: &ItemIdentifier, store: Option<u32>) -> Result<Option<CachedEntry>> {
            self.record("get");
            self.inner.get(id, store).await
        }
        async fn put_keyed(
            &self,
            id: &ItemIdentifier,
            item: &ItemRecord,
            prices: Option<&[PriceRecord]>,
            store: Option<u32>,
        ) -> Result<()> {
            self.record("put_keyed");
            self.inner.put_keyed(id, item, prices, store).await
        }
        async fn search_by_text(&self, term: &str, store: Option<u32>) -> Result<Vec<CachedEntry>> {
            self.record("search_by_text");
            self.inner.search_by_text(term, store).await
        }
        async fn remove(&self, id: &ItemIdentifier, store: Option<u32>) -> Result<()> {
            self.record("remove");
            self.inner.remove(id, store).await
        }
        async fn cleanup(&self) -> Result<usize> {
            self.record("cleanup");
            self.inner.cleanup().await
        }
        async fn purge_expired(&self) -> Result<usize> {
            self.record("purge_expired");
            self.inner.purge_expired().await
        }
        async fn stats(&self) -> Result<CacheMetadata> {
            self.record("stats");
            self.inner.stats().await
        }
        async fn clear(&self) -> Result<()> {
            self.record("clear");
            self.inner.clear().await
        }
    }

    /// Cache whose every operation fails.
    #[derive(Debug)]
    struct BrokenCache;

    #[async_trait]
    impl ItemCache for BrokenCache {
        async fn init(&self) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _: &ItemIdentifier, _: Option<u32>) -> Result<Option<CachedEntry>> {
            Err(LookupError::Cache("disk full".to_string()))
        }
        async fn put_keyed(
            &self,
            _: &ItemIdentifier,
            _: &ItemRecord,
            _: Option<&[PriceRecord]>,
            _: Option<u32>,
        ) -> Result<()> {
            Err(LookupError::Cache("disk full".to_string()))
        }
        async fn search_by_text(&self, _: &str, _: Option<u32>) -> Result<Vec<CachedEntry>> {
            Err(LookupError::Cache("disk full".to_string()))
        }
        async fn remove(&self, _: &ItemIdentifier, _: Option<u32>) -> Result<()> {
            Err(LookupError::Cache("disk full".to_string()))
        }
        async fn cleanup(&self) -> Result<usize> {
            Ok(0)
        }
        async fn purge_expired(&self) -> Result<usize> {
            Ok(0)
        }
        async fn stats(&self) -> Result<CacheMetadata> {
            Err(LookupError::Cache("disk full".to_string()))
        }
        async fn clear(&self) -> Result<()> {
            Err(LookupError::Cache("disk full".to_string()))
        }
    }

    fn boots() -> ItemRecord {
        ItemRecord::new(ItemIdentifier::gtin(GTIN).with_sku("BOOT-1"), "Winter Boots")
            .with_brand("Acme")
    }

    async fn ready(catalog: FakeCatalog) -> (LookupService, Arc<FakeCatalog>, Arc<InMemoryItemCache>) {
        let catalog = Arc::new(catalog);
        let cache = Arc::new(InMemoryItemCache::new());
        let service = LookupService::new(cache.clone(), catalog.clone());
        service.init().await.unwrap();
        service.configure("token", Environment::Test);
        (service, catalog, cache)
    }

    #[tokio::test]
    async fn test_not_configured_touches_nothing() {
        let catalog = Arc::new(FakeCatalog::with_items(vec![boots()]));
        let cache = Arc::new(RecordingCache::default());
        let service = LookupService::new(cache.clone(), catalog.clone());
        let id = ItemIdentifier::gtin(GTIN);

        let result = service.get_item(&id, GetItemOptions::default()).await;
        assert!(matches!(result, Err(LookupError::NotConfigured(_))));

        // Initialized but without credential
        service.init().await.unwrap();
        assert_eq!(cache.take_ops(), vec!["init"]);
        assert!(!service.is_ready());

        let result = service.get_item(&id, GetItemOptions::default()).await;
        assert!(matches!(result, Err(LookupError::NotConfigured(_))));
        let result = service.get_items(&[id], GetItemOptions::default()).await;
        assert!(matches!(result, Err(LookupError::NotConfigured(_))));
        let result = service.search_products("boots", SearchOptions::default()).await;
        assert!(matches!(result, Err(LookupError::NotConfigured(_))));
        assert!(service.search_cached("boots", None).await.is_err());
        assert!(service.cache_stats().await.is_err());
        assert!(service.clear_cache().await.is_err());

        assert!(cache.take_ops().is_empty());
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_api_then_cache() {
        let (service, catalog, _) = ready(FakeCatalog::with_items(vec![boots()])).await;
        let id = ItemIdentifier::gtin(GTIN);

        let first = service.get_item(&id, GetItemOptions::for_store(1000)).await.unwrap();
        assert_eq!(first.source, Source::Api);
        assert_eq!(first.unit_price(), Some(29.99));
        assert_eq!(first.prices.as_ref().unwrap()[0].currency_code(), Some("NOK"));
        let calls_after_first = catalog.calls().len();
        assert_eq!(calls_after_first, 2);

        let second = service.get_item(&id, GetItemOptions::for_store(1000)).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.item, first.item);
        assert_eq!(second.unit_price(), Some(29.99));
        assert_eq!(catalog.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_cached_under_requested_identifier() {
        let (service, _, cache) = ready(FakeCatalog::with_items(vec![boots()])).await;
        let id = ItemIdentifier::sku("BOOT-1");
        service.get_item(&id, GetItemOptions::default()).await.unwrap();

        let entry = cache.get(&id, None).await.unwrap().unwrap();
        assert_eq!(entry.key, CacheKey::new(&id, None));
    }

    #[tokio::test]
    async fn test_force_refresh_skips_read_but_writes() {
        let catalog = Arc::new(FakeCatalog::with_items(vec![boots()]));
        let cache = Arc::new(RecordingCache::default());
        let service = LookupService::new(cache.clone(), catalog.clone());
        service.init().await.unwrap();
        service.configure("token", Environment::Test);
        let id = ItemIdentifier::gtin(GTIN);

        service.get_item(&id, GetItemOptions::default()).await.unwrap();
        catalog.set_prices(Some(vec![PriceRecord::sales(24.99, "NOK")]));
        cache.take_ops();

        let refreshed = service
            .get_item(
                &id,
                GetItemOptions {
                    force_refresh: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(refreshed.source, Source::Api);
        assert_eq!(refreshed.unit_price(), Some(24.99));
        assert_eq!(catalog.calls().len(), 4);
        assert_eq!(cache.take_ops(), vec!["put_keyed"]);

        let cached = service.get_item(&id, GetItemOptions::default()).await.unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(cached.unit_price(), Some(24.99));
        assert_eq!(catalog.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_without_cache_nothing_is_written() {
        let (service, _, cache) = ready(FakeCatalog::with_items(vec![boots()])).await;
        let options = GetItemOptions {
            include_cache: false,
            ..Default::default()
        };
        let lookup = service
            .get_item(&ItemIdentifier::gtin(GTIN), options)
            .await
            .unwrap();
        assert_eq!(lookup.source, Source::Api);
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_price_failure_is_partial_success() {
        let catalog = FakeCatalog {
            prices: Mutex::new(None),
            ..FakeCatalog::with_items(vec![boots()])
        };
        let (service, _, cache) = ready(catalog).await;

        let lookup = service
            .get_item(&ItemIdentifier::gtin(GTIN), GetItemOptions::for_store(1000))
            .await
            .unwrap();
        assert_eq!(lookup.item.display_text(), Some("Winter Boots"));
        assert!(lookup.prices.is_none());
        assert!(matches!(lookup.price_error, Some(LookupError::Transport(_))));
        // The item is still cached, without prices
        let entry = cache
            .get(&ItemIdentifier::gtin(GTIN), Some(1000))
            .await
            .unwrap()
            .unwrap();
        assert!(entry.prices.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_distinct() {
        let (service, _, _) = ready(FakeCatalog::with_items(vec![])).await;
        let err = service
            .get_item(&ItemIdentifier::gtin("0000000000000"), GetItemOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_miss() {
        let catalog = Arc::new(FakeCatalog::with_items(vec![boots()]));
        let service = LookupService::new(Arc::new(BrokenCache), catalog.clone());
        service.init().await.unwrap();
        service.configure("token", Environment::Test);

        let lookup = service
            .get_item(&ItemIdentifier::gtin(GTIN), GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(lookup.source, Source::Api);
        assert_eq!(service.cache_stats().await.unwrap(), CacheMetadata::default());
        service.clear_cache().await.unwrap();
        assert!(service.check_service().await.cache.is_err());
    }

    #[tokio::test]
    async fn test_sku_then_gtin_fallback() {
        let item = ItemRecord::new(ItemIdentifier::gtin("7040001234567"), "Milk 1L");
        let (service, catalog, _) = ready(FakeCatalog::with_items(vec![item])).await;

        let lookup = service
            .get_item_by_code("7040001234567", GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(lookup.item.display_text(), Some("Milk 1L"));

        let calls = catalog.calls();
        assert_eq!(calls[0], "items:sku:7040001234567");
        assert_eq!(calls[1], "items:gtin:7040001234567");
    }

    #[tokio::test]
    async fn test_sku_hit_needs_no_fallback() {
        let (service, catalog, _) = ready(FakeCatalog::with_items(vec![boots()])).await;
        service
            .get_item_by_code("BOOT-1", GetItemOptions::default())
            .await
            .unwrap();
        let calls = catalog.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("items:")).count(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_suppresses_remote_search() {
        let (service, catalog, cache) = ready(FakeCatalog::default()).await;
        cache
            .put_keyed(&ItemIdentifier::sku("BOOT-1"), &boots(), None, None)
            .await
            .unwrap();

        let page = service
            .search_products("BOOT", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].source, Some(Source::Cache));
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_numeric_term_tries_identifier_lookup_first() {
        let item = ItemRecord::new(ItemIdentifier::gtin("123456789"), "Gift card");
        let (service, catalog, _) = ready(FakeCatalog::with_items(vec![item])).await;

        let page = service
            .search_products("123456789", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].source, Some(Source::Api));
        assert_eq!(page.items[0].item_text.as_deref(), Some("Gift card"));

        let calls = catalog.calls();
        assert_eq!(calls[0], "items:gtin:123456789");
        assert!(!calls.iter().any(|c| c.starts_with("search_text")));
    }

    #[tokio::test]
    async fn test_unknown_identifier_falls_back_to_text_search() {
        let catalog = FakeCatalog {
            search_hits: vec![SearchResultItem {
                item_text: Some("Something".to_string()),
                source: Some(Source::Search),
                ..Default::default()
            }],
            ..FakeCatalog::default()
        };
        let (service, catalog, cache) = ready(catalog).await;

        let page = service
            .search_products("987654321", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].source, Some(Source::Search));
        assert_eq!(
            catalog.calls(),
            vec![
                "items:gtin:987654321".to_string(),
                "search_text:987654321:Some(20)".to_string()
            ]
        );
        // Remote search results are not cached
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_filters_use_advanced_search() {
        let (service, catalog, _) = ready(FakeCatalog::default()).await;
        let options = SearchOptions {
            filters: Some(SearchFilters {
                in_stock: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        service.search_products("warm jacket", options).await.unwrap();
        assert_eq!(catalog.calls(), vec!["advanced:warm jacket".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let (service, catalog, _) = ready(FakeCatalog::default()).await;
        let result = service.search_products("   ", SearchOptions::default()).await;
        assert!(matches!(result, Err(LookupError::InvalidParameter(_))));
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_quick_search_min_length() {
        let (service, catalog, _) = ready(FakeCatalog::default()).await;
        assert!(service.quick_search("w", None).await.unwrap().is_empty());
        assert!(catalog.calls().is_empty());

        service.quick_search("wi", None).await.unwrap();
        service.quick_search("wi", Some(5)).await.unwrap();
        assert_eq!(
            catalog.calls(),
            vec!["suggest:wi:Some(10)".to_string(), "suggest:wi:Some(5)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_get_items_batches_misses() {
        let milk = ItemRecord::new(ItemIdentifier::gtin("7040001234567"), "Milk 1L");
        let (service, catalog, cache) = ready(FakeCatalog::with_items(vec![boots(), milk])).await;
        let boots_id = ItemIdentifier::gtin(GTIN);
        let milk_id = ItemIdentifier::gtin("7040001234567");
        service.get_item(&boots_id, GetItemOptions::default()).await.unwrap();
        let before = catalog.calls().len();

        let results = service
            .get_items(&[boots_id, milk_id.clone()], GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, Source::Cache);
        assert_eq!(results[1].source, Source::Api);
        assert_eq!(results[1].unit_price(), Some(29.99));

        let calls = catalog.calls();
        assert_eq!(calls[before], "items:gtin:7040001234567");
        assert!(cache.get(&milk_id, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lazy_configure_from_credentials() {
        let catalog = Arc::new(FakeCatalog::with_items(vec![boots()]));
        let service = LookupService::in_memory(catalog.clone()).with_credentials(Arc::new(
            StaticCredentials::new(Credentials::new("stored", Environment::Prod)),
        ));
        service.init().await.unwrap();
        assert!(!service.is_ready());

        let lookup = service
            .get_item(&ItemIdentifier::gtin(GTIN), GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(lookup.source, Source::Api);
        assert!(service.is_ready());
        assert_eq!(catalog.environment(), Some(Environment::Prod));
    }

    #[tokio::test]
    async fn test_status_and_check() {
        let (service, catalog, _) = ready(FakeCatalog::default()).await;
        let status = service.status().await;
        assert!(status.initialized);
        assert!(status.configured);
        assert_eq!(status.environment, Some(Environment::Test));
        assert_eq!(status.cache.unwrap().total_items, 0);

        let check = service.check_service().await;
        assert!(check.is_healthy());
        assert_eq!(catalog.calls(), vec!["check".to_string()]);
        // The cache probe leaves nothing behind
        assert_eq!(service.cache_stats().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_expiry_sweep_purges() {
        let catalog = Arc::new(FakeCatalog::with_items(vec![boots()]));
        let cache = Arc::new(InMemoryItemCache::with_config(
            CacheConfig::new().with_ttl(Duration::from_millis(10)),
        ));
        let service = LookupService::new(cache.clone(), catalog)
            .with_sweep_interval(Duration::from_millis(20));
        service.init().await.unwrap();
        service.configure("token", Environment::Test);
        service
            .get_item(&ItemIdentifier::gtin(GTIN), GetItemOptions::default())
            .await
            .unwrap();
        assert_eq!(cache.stats().await.unwrap().total_items, 1);

        let handle = service.spawn_expiry_sweep().unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();
        assert_eq!(cache.stats().await.unwrap().total_items, 0);
    }

    #[test]
    fn test_identifier_for_term() {
        assert_eq!(
            identifier_for_term("123456789"),
            Some(ItemIdentifier::gtin("123456789"))
        );
        assert_eq!(
            identifier_for_term("AB-12"),
            Some(ItemIdentifier::sku("AB-12").with_external_item_no("AB-12"))
        );
        assert_eq!(
            identifier_for_term("12345"),
            Some(ItemIdentifier::sku("12345").with_external_item_no("12345"))
        );
        assert_eq!(identifier_for_term("ab"), None);
        assert_eq!(identifier_for_term("winter boots"), None);
    }

    #[tokio::test]
    async fn test_from_config_starts_unready() {
        let service = LookupService::from_config(&LookupConfig::default()).unwrap();
        assert!(!service.is_ready());
        service.init().await.unwrap();
        assert!(!service.is_ready());
        assert!(service.spawn_expiry_sweep().is_none());
    }
}
