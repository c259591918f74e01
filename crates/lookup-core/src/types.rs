//! Core data types for item lookups.
//!
//! This module defines the fundamental data structures:
//!
//! - [`ItemIdentifier`] - The identifier fields an item can be addressed by
//! - [`StoreIdentifier`] - Optional store scope
//! - [`CacheKey`] - Deterministic primary key of a cache entry
//! - [`ItemRecord`] - Catalog item payload
//! - [`PriceRecord`] - Store price payload
//! - [`CachedEntry`] - An item stored in the local cache
//! - [`CacheMetadata`] - Aggregate cache statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Opaque catalog attributes carried through unchanged.
pub type Attributes = Map<String, Value>;

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Identifies a catalog item by one or more identifier fields.
///
/// There is no single canonical id; at least one field must be set and
/// equality between identifiers is decided per field (see [`Self::matches`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIdentifier {
    /// Stock-keeping unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Global trade item number (barcode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<String>,
    /// External item number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_item_no: Option<String>,
    /// Catalog product id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl ItemIdentifier {
    /// Creates an identifier with only the GTIN set.
    #[must_use]
    pub fn gtin(gtin: impl Into<String>) -> Self {
        Self {
            gtin: Some(gtin.into()),
            ..Default::default()
        }
    }

    /// Creates an identifier with only the SKU set.
    #[must_use]
    pub fn sku(sku: impl Into<String>) -> Self {
        Self {
            sku: Some(sku.into()),
            ..Default::default()
        }
    }

    /// Creates an identifier with only the external item number set.
    #[must_use]
    pub fn external_item_no(external_item_no: impl Into<String>) -> Self {
        Self {
            external_item_no: Some(external_item_no.into()),
            ..Default::default()
        }
    }

    /// Sets the SKU.
    #[must_use]
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Sets the GTIN.
    #[must_use]
    pub fn with_gtin(mut self, gtin: impl Into<String>) -> Self {
        self.gtin = Some(gtin.into());
        self
    }

    /// Sets the external item number.
    #[must_use]
    pub fn with_external_item_no(mut self, external_item_no: impl Into<String>) -> Self {
        self.external_item_no = Some(external_item_no.into());
        self
    }

    /// Sets the product id.
    #[must_use]
    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// Returns the GTIN if set and non-blank.
    #[must_use]
    pub fn gtin_value(&self) -> Option<&str> {
        present(&self.gtin)
    }

    /// Returns the SKU if set and non-blank.
    #[must_use]
    pub fn sku_value(&self) -> Option<&str> {
        present(&self.sku)
    }

    /// Returns the external item number if set and non-blank.
    #[must_use]
    pub fn external_item_no_value(&self) -> Option<&str> {
        present(&self.external_item_no)
    }

    /// Returns the product id if set and non-blank.
    #[must_use]
    pub fn product_id_value(&self) -> Option<&str> {
        present(&self.product_id)
    }

    /// Returns true if no identifier field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gtin_value().is_none()
            && self.sku_value().is_none()
            && self.external_item_no_value().is_none()
            && self.product_id_value().is_none()
    }

    /// Returns true if any field present on both identifiers is equal.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        let eq = |a: Option<&str>, b: Option<&str>| matches!((a, b), (Some(a), Some(b)) if a == b);
        eq(self.gtin_value(), other.gtin_value())
            || eq(self.sku_value(), other.sku_value())
            || eq(self.external_item_no_value(), other.external_item_no_value())
            || eq(self.product_id_value(), other.product_id_value())
    }
}

impl fmt::Display for ItemIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(CacheKey::new(self, None).as_str())
    }
}

/// Optional store scope for price lookups and cache entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreIdentifier {
    /// Store number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_number: Option<u32>,
}

impl StoreIdentifier {
    /// Creates a store identifier for the given store number.
    #[must_use]
    pub const fn new(store_number: u32) -> Self {
        Self {
            store_number: Some(store_number),
        }
    }

    /// Creates a store identifier from an optional store number.
    #[must_use]
    pub const fn from_option(store_number: Option<u32>) -> Self {
        Self { store_number }
    }
}

/// Primary key of a cache entry.
///
/// Built from the present identifier fields in a fixed order followed by the
/// store number, e.g. `gtin:5711724072697|store:1000`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for an identifier and optional store number.
    #[must_use]
    pub fn new(identifier: &ItemIdentifier, store_number: Option<u32>) -> Self {
        let mut parts = Vec::with_capacity(5);
        if let Some(gtin) = identifier.gtin_value() {
            parts.push(format!("gtin:{gtin}"));
        }
        if let Some(sku) = identifier.sku_value() {
            parts.push(format!("sku:{sku}"));
        }
        if let Some(ext) = identifier.external_item_no_value() {
            parts.push(format!("ext:{ext}"));
        }
        if let Some(pid) = identifier.product_id_value() {
            parts.push(format!("pid:{pid}"));
        }
        if let Some(store) = store_number {
            parts.push(format!("store:{store}"));
        }
        Self(parts.join("|"))
    }

    /// Wraps an already built key, e.g. one read back from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Brand information on a catalog item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    /// Brand display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// External brand number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_no: Option<String>,
}

/// A `{ "text": ... }` wrapper used for colors and sizes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    /// Display text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Catalog item payload.
///
/// Only the fields lookups and searches branch on are typed; everything else
/// the catalog returns is kept in [`Self::attributes`] and passed through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Identifier fields of the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<ItemIdentifier>,
    /// Primary display text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_text: Option<String>,
    /// Shelf label text, used when no item text is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_text1: Option<String>,
    /// Model number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_no: Option<String>,
    /// Brand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<Brand>,
    /// Color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<TextValue>,
    /// Size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<TextValue>,
    /// Remaining catalog attributes, untouched.
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl ItemRecord {
    /// Creates an item with the given identifier and display text.
    #[must_use]
    pub fn new(identifier: ItemIdentifier, item_text: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier),
            item_text: Some(item_text.into()),
            ..Default::default()
        }
    }

    /// Sets the brand display name.
    #[must_use]
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(Brand {
            text: Some(brand.into()),
            external_no: None,
        });
        self
    }

    /// Returns the item text, falling back to the first label text.
    #[must_use]
    pub fn display_text(&self) -> Option<&str> {
        self.item_text
            .as_deref()
            .or(self.label_text1.as_deref())
    }

    /// Returns the brand display name.
    #[must_use]
    pub fn brand_text(&self) -> Option<&str> {
        self.brand.as_ref().and_then(|b| b.text.as_deref())
    }
}

/// A monetary amount.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in major currency units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// ISO 4217 currency code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
}

impl Money {
    /// Creates an amount in the given currency.
    #[must_use]
    pub fn new(amount: f64, currency_code: impl Into<String>) -> Self {
        Self {
            amount: Some(amount),
            currency_code: Some(currency_code.into()),
        }
    }
}

/// A store price for an item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    /// Item the price applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_identifier: Option<ItemIdentifier>,
    /// Consumer sales price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_price: Option<Money>,
    /// Net price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_price: Option<Money>,
    /// First day the price is valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    /// Last day the price is valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    /// Remaining price attributes, untouched.
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl PriceRecord {
    /// Creates a price record with only a sales price.
    #[must_use]
    pub fn sales(amount: f64, currency_code: impl Into<String>) -> Self {
        Self {
            sales_price: Some(Money::new(amount, currency_code)),
            ..Default::default()
        }
    }

    /// Returns the unit amount: the sales price, or the net price when no
    /// sales price is set.
    #[must_use]
    pub fn unit_amount(&self) -> Option<f64> {
        self.sales_price
            .as_ref()
            .and_then(|m| m.amount)
            .or_else(|| self.net_price.as_ref().and_then(|m| m.amount))
    }

    /// Returns the currency of the unit amount.
    #[must_use]
    pub fn currency_code(&self) -> Option<&str> {
        self.sales_price
            .as_ref()
            .and_then(|m| m.currency_code.as_deref())
            .or_else(|| {
                self.net_price
                    .as_ref()
                    .and_then(|m| m.currency_code.as_deref())
            })
    }
}

/// An item stored in the local cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    /// Primary key.
    pub key: CacheKey,
    /// Cached item.
    pub item: ItemRecord,
    /// Cached prices, absent when the price lookup failed or was skipped.
    pub prices: Option<Vec<PriceRecord>>,
    /// Store the entry is scoped to.
    pub store_number: Option<u32>,
    /// When the entry was written.
    pub last_updated: DateTime<Utc>,
    /// When the entry was last read. Never earlier than `last_updated`.
    pub last_accessed: DateTime<Utc>,
}

impl CachedEntry {
    /// Creates an entry written at `now`.
    #[must_use]
    pub fn new(
        key: CacheKey,
        item: ItemRecord,
        prices: Option<Vec<PriceRecord>>,
        store_number: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            item,
            prices,
            store_number,
            last_updated: now,
            last_accessed: now,
        }
    }

    /// Returns true once `now - last_updated` exceeds `ttl`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.last_updated);
        age > chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Records an access at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now.max(self.last_updated);
    }

    /// Returns true if the entry is visible for the requested store scope.
    ///
    /// Unscoped entries match every scope.
    #[must_use]
    pub fn visible_in(&self, store_number: Option<u32>) -> bool {
        match (self.store_number, store_number) {
            (None, _) | (_, None) => true,
            (Some(stored), Some(requested)) => stored == requested,
        }
    }

    /// Returns true if item text or brand contains `needle_lower`, which must
    /// already be lowercase.
    #[must_use]
    pub fn text_matches(&self, needle_lower: &str) -> bool {
        let contains = |s: Option<&str>| s.is_some_and(|s| s.to_lowercase().contains(needle_lower));
        contains(self.item.item_text.as_deref()) || contains(self.item.brand_text())
    }
}

/// Aggregate statistics about the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Number of stored entries.
    pub total_items: usize,
    /// Oldest `last_updated` among stored entries.
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Newest `last_updated` among stored entries.
    pub newest_entry: Option<DateTime<Utc>>,
    /// When size-based cleanup last ran.
    pub last_cleanup: Option<DateTime<Utc>>,
}
