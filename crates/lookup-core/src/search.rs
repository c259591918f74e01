//! Search and lookup result types.
//!
//! - [`Source`] - Provenance tag of a result
//! - [`ItemLookup`] - Result of a single item lookup
//! - [`SearchResultItem`] - Projection of an item for result lists
//! - [`TextSearchOptions`] / [`AdvancedSearchRequest`] - Remote search requests
//! - [`SearchPage`] / [`Facets`] - Remote search responses

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LookupError;
use crate::types::{CachedEntry, ItemIdentifier, ItemRecord, PriceRecord};

/// Where a result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Served from the local cache.
    Cache,
    /// Fetched by identifier from the remote catalog.
    Api,
    /// Returned by a remote text search.
    Search,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Api => "api",
            Self::Search => "search",
        })
    }
}

/// Result of looking up one item.
///
/// A failed price lookup does not fail the item lookup: `prices` is `None`
/// and `price_error` carries the reason, so the item can still be sold.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemLookup {
    /// The item.
    pub item: ItemRecord,
    /// Store prices, if known.
    pub prices: Option<Vec<PriceRecord>>,
    /// Where the item came from.
    pub source: Source,
    /// Why prices are missing, when the price lookup failed.
    pub price_error: Option<LookupError>,
}

impl ItemLookup {
    /// Builds a cache-sourced lookup from a cached entry.
    #[must_use]
    pub fn from_cache(entry: CachedEntry) -> Self {
        Self {
            item: entry.item,
            prices: entry.prices,
            source: Source::Cache,
            price_error: None,
        }
    }

    /// Returns the unit amount of the first price, if any.
    #[must_use]
    pub fn unit_price(&self) -> Option<f64> {
        self.prices
            .as_ref()
            .and_then(|p| p.first())
            .and_then(PriceRecord::unit_amount)
    }
}

/// An item projected for result lists.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    /// Identifier fields, when the source provides them.
    pub identifier: Option<ItemIdentifier>,
    /// Display text.
    pub item_text: Option<String>,
    /// Brand display name.
    pub brand_name: Option<String>,
    /// Model number.
    pub model_no: Option<String>,
    /// GTIN, duplicated from the identifier for convenience.
    pub gtin: Option<String>,
    /// Color text.
    pub color_text: Option<String>,
    /// Size text.
    pub size_text: Option<String>,
    /// Current price.
    pub current_price: Option<f64>,
    /// Promotion price.
    pub promotion_price: Option<f64>,
    /// Whether the item is in stock in the requested store.
    pub in_stock: Option<bool>,
    /// Thumbnail image URL.
    pub thumbnail_url: Option<String>,
    /// Where the result came from.
    pub source: Option<Source>,
}

impl SearchResultItem {
    /// Projects an item and optional prices.
    #[must_use]
    pub fn from_item(item: &ItemRecord, prices: Option<&[PriceRecord]>, source: Source) -> Self {
        let identifier = item.identifier.clone();
        Self {
            gtin: identifier
                .as_ref()
                .and_then(|id| id.gtin_value())
                .map(str::to_string),
            identifier,
            item_text: item.display_text().map(str::to_string),
            brand_name: item.brand_text().map(str::to_string),
            model_no: item.model_no.clone(),
            color_text: item.color.as_ref().and_then(|c| c.text.clone()),
            size_text: item.size.as_ref().and_then(|s| s.text.clone()),
            current_price: prices
                .and_then(|p| p.first())
                .and_then(PriceRecord::unit_amount),
            source: Some(source),
            ..Default::default()
        }
    }

    /// Projects an [`ItemLookup`].
    #[must_use]
    pub fn from_lookup(lookup: &ItemLookup) -> Self {
        Self::from_item(&lookup.item, lookup.prices.as_deref(), lookup.source)
    }
}

/// Options for a basic remote text search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearchOptions {
    /// Maximum number of results.
    pub top: Option<u32>,
    /// Number of results to skip.
    pub skip: Option<u32>,
    /// Store scope.
    pub store_number: Option<u32>,
}

/// Inclusive effective price range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    /// Lower bound.
    pub from: Option<f64>,
    /// Upper bound.
    pub to: Option<f64>,
}

/// Filters that opt a search into the advanced endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Only in-stock items when `Some(true)`.
    pub in_stock: Option<bool>,
    /// Restrict on promotion state.
    pub in_promotion: Option<bool>,
    /// Effective price range.
    pub price_range: Option<PriceRange>,
    /// Department numbers.
    pub department_numbers: Vec<String>,
    /// Brand codes.
    pub brand_codes: Vec<String>,
}

/// A filtered, faceted remote search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedSearchRequest {
    /// Full-text query.
    pub query: String,
    /// Maximum number of results.
    pub top: u32,
    /// Number of results to skip.
    pub skip: Option<u32>,
    /// Store scope.
    pub store_number: Option<u32>,
    /// Filters.
    pub filters: SearchFilters,
}

/// A facet value with its result count.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facet {
    /// Facet code.
    #[serde(default)]
    pub code: Option<String>,
    /// Facet display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Number of matching results.
    #[serde(default)]
    pub count: u64,
}

/// A facet value with nested child facets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchicalFacet {
    /// The facet value itself.
    #[serde(flatten)]
    pub facet: Facet,
    /// Child facets.
    #[serde(default)]
    pub child_facets: Vec<HierarchicalFacet>,
}

/// Facet counts returned by an advanced search.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    /// Department hierarchy.
    #[serde(default)]
    pub departments: Vec<HierarchicalFacet>,
    /// Brands.
    #[serde(default)]
    pub brands: Vec<Facet>,
}

/// One page of remote search results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPage {
    /// Results, tagged [`Source::Search`].
    pub items: Vec<SearchResultItem>,
    /// Total number of matches reported by the catalog.
    pub total_count: Option<u64>,
    /// Facet counts, only for advanced searches.
    pub facets: Option<Facets>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextValue;

    #[test]
    fn test_projection_from_item_and_price() {
        let mut item =
            ItemRecord::new(ItemIdentifier::gtin("5711724072697"), "Test Product").with_brand("Acme");
        item.color = Some(TextValue {
            text: Some("Red".to_string()),
        });
        let prices = vec![PriceRecord::sales(29.99, "NOK")];

        let projected = SearchResultItem::from_item(&item, Some(&prices), Source::Cache);
        assert_eq!(projected.gtin.as_deref(), Some("5711724072697"));
        assert_eq!(projected.item_text.as_deref(), Some("Test Product"));
        assert_eq!(projected.brand_name.as_deref(), Some("Acme"));
        assert_eq!(projected.color_text.as_deref(), Some("Red"));
        assert_eq!(projected.current_price, Some(29.99));
        assert_eq!(projected.source, Some(Source::Cache));
    }

    #[test]
    fn test_unit_price_of_lookup() {
        let lookup = ItemLookup {
            item: ItemRecord::default(),
            prices: Some(vec![PriceRecord::sales(5.0, "NOK")]),
            source: Source::Api,
            price_error: None,
        };
        assert_eq!(lookup.unit_price(), Some(5.0));
    }

    #[test]
    fn test_facets_decode_hierarchy() {
        let facets: Facets = serde_json::from_value(serde_json::json!({
            "departments": [{
                "code": "10", "name": "Shoes", "count": 4,
                "childFacets": [{ "code": "11", "name": "Boots", "count": 1 }]
            }],
            "brands": [{ "code": "AC", "name": "Acme", "count": 3 }]
        }))
        .unwrap();
        assert_eq!(facets.departments[0].facet.count, 4);
        assert_eq!(facets.departments[0].child_facets[0].facet.name.as_deref(), Some("Boots"));
        assert_eq!(facets.brands[0].count, 3);
    }
}
