#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Remote item catalog client.
//!
//! This crate implements the lookup-core [`ItemCatalog`] trait for the item
//! gateway HTTP API.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lookup_catalog::CatalogClient;
//! use lookup_core::{Environment, ItemCatalog, ItemIdentifier, StoreIdentifier};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = CatalogClient::local_proxy("http://localhost:5173")?;
//!     catalog.configure("your_token", Environment::Test);
//!
//!     let id = ItemIdentifier::gtin("5711724072697");
//!     let items = catalog.get_items_by_identifiers(&[id.clone()]).await?;
//!     let prices = catalog.get_prices(&id, StoreIdentifier::new(1000)).await?;
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use lookup_core::{
    AdvancedSearchRequest, DeploymentMode, Environment, Facets, ItemCatalog, ItemIdentifier,
    ItemRecord, LookupError, PriceRecord, Result, SearchPage, SearchResultItem, Source,
    StoreIdentifier, TextSearchOptions, TextValue,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Header carrying the calling user id.
const USER_ID_HEADER: &str = "lrs-userid";

/// Header carrying the bearer token at the edge.
const EDGE_AUTH_HEADER: &str = "X-Item-Authorization";

/// Default value of the `lrs-userid` header.
pub const DEFAULT_USER_ID: &str = "ZGV2ZWxvcGVy";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GTIN looked up by [`CatalogClient::check_connection`].
const PROBE_GTIN: &str = "1234567890123";

/// Default page size of a basic text search.
const DEFAULT_TEXT_SEARCH_TOP: u32 = 50;

/// Default number of autocomplete suggestions.
const DEFAULT_SUGGEST_TOP: u32 = 100;

const ITEMS_BY_IDENTIFIERS: &str = "/gateway/Items/GetItemsByItemIdentifiers";
const ORDINARY_PRICES: &str = "/gateway/Items/GetOrdinaryPrices";
const TEXT_SEARCH: &str = "/gateway/ItemSearch/items";
const ADVANCED_SEARCH: &str = "/gateway/Search/items";
const SUGGEST: &str = "/gateway/ItemSearch";

// ============================================================================
// Endpoints
// ============================================================================

/// Base URLs of the catalog, one per environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Development base URL.
    pub dev: String,
    /// Test base URL.
    pub test: String,
    /// Production base URL.
    pub prod: String,
}

impl Endpoints {
    /// The public item service origins, used at the edge.
    #[must_use]
    pub fn edge() -> Self {
        Self {
            dev: "https://itemservice.egretail-dev.cloud/api".to_string(),
            test: "https://itemservice.egretail-test.cloud/api".to_string(),
            prod: "https://itemservice.egretail.cloud/api".to_string(),
        }
    }

    /// Per-environment routes of a local reverse proxy at `origin`.
    #[must_use]
    pub fn local_proxy(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            dev: format!("{origin}/api/itemservice-dev"),
            test: format!("{origin}/api/itemservice-test"),
            prod: format!("{origin}/api/itemservice-prod"),
        }
    }

    /// The same base URL for every environment.
    #[must_use]
    pub fn uniform(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            dev: base.clone(),
            test: base.clone(),
            prod: base,
        }
    }

    /// Returns the base URL for an environment.
    #[must_use]
    pub fn base_for(&self, environment: Environment) -> &str {
        match environment {
            Environment::Dev => &self.dev,
            Environment::Test => &self.test,
            Environment::Prod => &self.prod,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
struct Session {
    token: String,
    environment: Environment,
}

/// Item gateway client.
///
/// Provides access to:
/// - Items by GTIN, SKU or external item number (batched)
/// - Ordinary store prices
/// - Basic, advanced and autocomplete search
///
/// Clones share the configured credential.
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    endpoints: Endpoints,
    deployment: DeploymentMode,
    user_id: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("endpoints", &self.endpoints)
            .field("deployment", &self.deployment)
            .field("user_id", &self.user_id)
            .field("environment", &self.environment())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl CatalogClient {
    /// Create an unconfigured client with the default request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: Endpoints, deployment: DeploymentMode) -> Result<Self> {
        Self::with_timeout(endpoints, deployment, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create an unconfigured client with a per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(
        endpoints: Endpoints,
        deployment: DeploymentMode,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, endpoints, deployment))
    }

    /// Create an unconfigured client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, endpoints: Endpoints, deployment: DeploymentMode) -> Self {
        Self {
            client,
            endpoints,
            deployment,
            user_id: DEFAULT_USER_ID.to_string(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Client for the public item service origins.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn edge() -> Result<Self> {
        Self::new(Endpoints::edge(), DeploymentMode::Edge)
    }

    /// Client talking through a local reverse proxy at `origin`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn local_proxy(origin: &str) -> Result<Self> {
        Self::new(Endpoints::local_proxy(origin), DeploymentMode::LocalProxy)
    }

    /// Set the `lrs-userid` header value.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// The configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The deployment mode.
    #[must_use]
    pub fn deployment(&self) -> DeploymentMode {
        self.deployment
    }

    fn current_session(&self) -> Result<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                LookupError::NotConfigured(
                    "Item service not configured. Provide a bearer token and environment."
                        .to_string(),
                )
            })
    }

    /// Build an authorized request for a gateway path.
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let session = self.current_session()?;
        let url = format!("{}{path}", self.endpoints.base_for(session.environment));
        debug!(%method, endpoint = path, environment = %session.environment, "Catalog request");

        let bearer = format!("Bearer {}", session.token);
        let builder = self
            .client
            .request(method, url)
            .header(USER_ID_HEADER, &self.user_id);
        Ok(match self.deployment {
            DeploymentMode::LocalProxy => builder.header(AUTHORIZATION, bearer),
            DeploymentMode::Edge => builder.header(EDGE_AUTH_HEADER, bearer),
        })
    }

    /// Send a request and return the status and body text.
    async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok((status, text))
    }

    /// Send a request and decode a successful JSON response.
    async fn call<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let (status, text) = Self::send(request).await?;
        if !status.is_success() {
            warn!(endpoint = path, status = status.as_u16(), "Catalog request failed");
            return Err(LookupError::protocol(status.as_u16(), &text));
        }
        Ok(decode(path, &text))
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned + Default>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.request(Method::POST, path)?.json(body);
        self.call(path, request).await
    }

    async fn get<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let request = self.request(Method::GET, path)?.query(query);
        self.call(path, request).await
    }
}

/// Decode a response body, treating an unexpected shape as empty.
fn decode<T: DeserializeOwned + Default>(endpoint: &str, text: &str) -> T {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(endpoint, error = %e, "Malformed catalog response, treating as empty");
            T::default()
        }
    }
}

fn require_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(LookupError::InvalidParameter(
            "Search query cannot be empty".to_string(),
        ));
    }
    Ok(query)
}

#[async_trait]
impl ItemCatalog for CatalogClient {
    fn configure(&self, credential: &str, environment: Environment) {
        let credential = credential.trim();
        let mut session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if credential.is_empty() {
            warn!(%environment, "Ignoring empty catalog credential");
            *session = None;
            return;
        }
        *session = Some(Session {
            token: credential.to_string(),
            environment,
        });
        debug!(
            %environment,
            base_url = self.endpoints.base_for(environment),
            "Catalog configured"
        );
    }

    fn is_configured(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn environment(&self) -> Option<Environment> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.environment)
    }

    #[instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    async fn get_items_by_identifiers(
        &self,
        identifiers: &[ItemIdentifier],
    ) -> Result<Vec<ItemRecord>> {
        if identifiers.is_empty() {
            return Err(LookupError::InvalidParameter(
                "No item identifiers provided".to_string(),
            ));
        }
        let response: ItemsResponse = self
            .post(
                ITEMS_BY_IDENTIFIERS,
                &ItemsRequest {
                    item_identifiers: identifiers,
                },
            )
            .await?;
        debug!(found = response.items.len(), "Fetched items");
        Ok(response.items)
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn get_prices(
        &self,
        identifier: &ItemIdentifier,
        store: StoreIdentifier,
    ) -> Result<Vec<PriceRecord>> {
        let response: PricesResponse = self
            .post(
                ORDINARY_PRICES,
                &PricesRequest {
                    item_identifier: identifier,
                    store_identifier: store,
                },
            )
            .await?;
        debug!(prices = response.prices.len(), "Fetched prices");
        Ok(response.prices)
    }

    #[instrument(skip(self))]
    async fn search_text(&self, query: &str, options: TextSearchOptions) -> Result<SearchPage> {
        let query = require_query(query)?;
        let mut params = vec![
            ("query", query.to_string()),
            (
                "top",
                options.top.unwrap_or(DEFAULT_TEXT_SEARCH_TOP).to_string(),
            ),
        ];
        if let Some(skip) = options.skip {
            params.push(("skip", skip.to_string()));
        }
        if let Some(store) = options.store_number {
            params.push(("storeNo", store.to_string()));
        }

        let response: TextSearchResponse = self.get(TEXT_SEARCH, &params).await?;
        let items: Vec<_> = response
            .searchable_items
            .into_iter()
            .map(map_searchable_item)
            .collect();
        debug!(results = items.len(), total = ?response.total_count, "Text search done");
        Ok(SearchPage {
            items,
            total_count: response.total_count,
            facets: None,
        })
    }

    #[instrument(skip(self, request), fields(query = %request.query))]
    async fn advanced_search(&self, request: &AdvancedSearchRequest) -> Result<SearchPage> {
        let query = require_query(&request.query)?;
        let filters = &request.filters;
        let body = AdvancedSearchBody {
            full_text_query: query,
            top: request.top,
            skip: request.skip,
            is_in_stock: filters.in_stock,
            is_in_promotion: filters.in_promotion,
            effective_price_from: filters.price_range.and_then(|r| r.from),
            effective_price_to: filters.price_range.and_then(|r| r.to),
            store_no: request.store_number,
            department_numbers: &filters.department_numbers,
            brand_codes: &filters.brand_codes,
        };

        let response: AdvancedSearchResponse = self.post(ADVANCED_SEARCH, &body).await?;
        let items: Vec<_> = response
            .results
            .into_iter()
            .map(map_advanced_item)
            .collect();
        debug!(results = items.len(), total = ?response.total_count, "Advanced search done");
        Ok(SearchPage {
            items,
            total_count: response.total_count,
            facets: response.facets,
        })
    }

    #[instrument(skip(self))]
    async fn suggest(&self, query: &str, top: Option<u32>) -> Result<Vec<SearchResultItem>> {
        let query = require_query(query)?;
        let params = [
            ("query", query.to_string()),
            ("top", top.unwrap_or(DEFAULT_SUGGEST_TOP).to_string()),
        ];
        let items: Vec<SearchableItem> = self.get(SUGGEST, &params).await?;
        Ok(items.into_iter().map(map_searchable_item).collect())
    }

    #[instrument(skip(self))]
    async fn check_connection(&self) -> Result<()> {
        let probe = [ItemIdentifier::gtin(PROBE_GTIN)];
        let request = self
            .request(Method::POST, ITEMS_BY_IDENTIFIERS)?
            .json(&ItemsRequest {
                item_identifiers: &probe,
            });
        let (status, text) = Self::send(request).await?;
        // A missing probe item still proves the gateway is reachable
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(status = status.as_u16(), "Catalog reachable");
            return Ok(());
        }
        Err(LookupError::protocol(status.as_u16(), &text))
    }
}

// ============================================================================
// Gateway wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemsRequest<'a> {
    item_identifiers: &'a [ItemIdentifier],
}

#[derive(Debug, Default, Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<ItemRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PricesRequest<'a> {
    item_identifier: &'a ItemIdentifier,
    store_identifier: StoreIdentifier,
}

#[derive(Debug, Default, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    prices: Vec<PriceRecord>,
}

/// Flat search hit returned by basic search and suggestions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchableItem {
    id: Option<String>,
    item_text: Option<String>,
    brand_name: Option<String>,
    color_text: Option<String>,
    size_text: Option<String>,
    external_item_number: Option<String>,
    model_no: Option<String>,
    gtin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextSearchResponse {
    #[serde(default)]
    searchable_items: Vec<SearchableItem>,
    total_count: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedSearchBody<'a> {
    full_text_query: &'a str,
    top: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_in_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_in_promotion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    effective_price_from: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    effective_price_to: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_no: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    department_numbers: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    brand_codes: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct Amount {
    amount: Option<f64>,
}

/// Rich search hit returned by advanced search.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedSearchItem {
    identifier: Option<ItemIdentifier>,
    model_no: Option<String>,
    color: Option<TextValue>,
    size: Option<TextValue>,
    item_text: Option<String>,
    label_text1: Option<String>,
    brand_name: Option<String>,
    current_ordinary_price: Option<Amount>,
    current_promotion_price: Option<Amount>,
    current_effective_price: Option<Amount>,
    available_in_store: Option<bool>,
    current_stock_quantity_available: Option<f64>,
    thumbnail_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedSearchResponse {
    #[serde(default)]
    results: Vec<AdvancedSearchItem>,
    total_count: Option<u64>,
    facets: Option<Facets>,
}

fn amount(value: Option<&Amount>) -> Option<f64> {
    value.and_then(|a| a.amount)
}

/// Project a flat search hit. Basic search carries no price or stock.
fn map_searchable_item(item: SearchableItem) -> SearchResultItem {
    let identifier = ItemIdentifier {
        gtin: item.gtin.clone(),
        external_item_no: item.external_item_number,
        product_id: item.id,
        ..Default::default()
    };
    SearchResultItem {
        identifier: (!identifier.is_empty()).then_some(identifier),
        item_text: item.item_text,
        brand_name: item.brand_name,
        model_no: item.model_no,
        gtin: item.gtin,
        color_text: item.color_text,
        size_text: item.size_text,
        source: Some(Source::Search),
        ..Default::default()
    }
}

/// Project an advanced search hit.
fn map_advanced_item(item: AdvancedSearchItem) -> SearchResultItem {
    let gtin = item
        .identifier
        .as_ref()
        .and_then(ItemIdentifier::gtin_value)
        .map(str::to_string);
    SearchResultItem {
        gtin,
        identifier: item.identifier,
        item_text: item.item_text.or(item.label_text1),
        brand_name: item.brand_name,
        model_no: item.model_no,
        color_text: item.color.and_then(|c| c.text),
        size_text: item.size.and_then(|s| s.text),
        current_price: amount(item.current_ordinary_price.as_ref())
            .or_else(|| amount(item.current_effective_price.as_ref())),
        promotion_price: amount(item.current_promotion_price.as_ref()),
        in_stock: item
            .available_in_store
            .map(|available| available && item.current_stock_quantity_available.unwrap_or(0.0) > 0.0),
        thumbnail_url: item.thumbnail_url,
        source: Some(Source::Search),
    }
}
