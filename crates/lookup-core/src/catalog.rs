//! Remote catalog trait.
//!
//! [`ItemCatalog`] is the boundary to the remote item catalog and pricing
//! service. Item details and prices are separate requests and fail
//! independently.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    environment::Environment,
    error::Result,
    search::{AdvancedSearchRequest, SearchPage, SearchResultItem, TextSearchOptions},
    types::{ItemIdentifier, ItemRecord, PriceRecord, StoreIdentifier},
};

/// Remote item catalog and pricing service.
///
/// Every request issued before [`Self::configure`] fails with
/// [`LookupError::NotConfigured`](crate::LookupError::NotConfigured) without
/// touching the network.
#[async_trait]
pub trait ItemCatalog: Send + Sync + Debug {
    /// Stores the credential and selects the environment's base endpoint.
    fn configure(&self, credential: &str, environment: Environment);

    /// Returns true once a credential has been configured.
    fn is_configured(&self) -> bool;

    /// Returns the configured environment.
    fn environment(&self) -> Option<Environment>;

    /// Fetches items for a batch of identifiers in one request.
    ///
    /// An empty batch is rejected without a network call. An unknown
    /// identifier yields no item rather than an error.
    async fn get_items_by_identifiers(
        &self,
        identifiers: &[ItemIdentifier],
    ) -> Result<Vec<ItemRecord>>;

    /// Fetches the ordinary prices of an item in a store.
    async fn get_prices(
        &self,
        identifier: &ItemIdentifier,
        store: StoreIdentifier,
    ) -> Result<Vec<PriceRecord>>;

    /// Fast basic full-text search without pricing or stock information.
    async fn search_text(&self, query: &str, options: TextSearchOptions) -> Result<SearchPage>;

    /// Filtered search with prices, stock and facet counts.
    async fn advanced_search(&self, request: &AdvancedSearchRequest) -> Result<SearchPage>;

    /// Autocomplete suggestions for a partial query.
    async fn suggest(&self, query: &str, top: Option<u32>) -> Result<Vec<SearchResultItem>>;

    /// Verifies that the catalog is reachable with the configured credential.
    async fn check_connection(&self) -> Result<()>;
}
