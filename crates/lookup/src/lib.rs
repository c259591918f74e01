#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Read-through item lookup over a local cache and a remote catalog.
//!
//! This crate re-exports the core types, the cache backends and the HTTP
//! catalog client, and provides [`LookupService`] which orchestrates them.
//!
//! # Features
//!
//! - `cache-sqlite` - SQLite-based item cache
//!
//! # Example
//!
//! ```rust,ignore
//! use lookup::{Environment, LookupConfig, LookupService, SearchOptions};
//!
//! #[tokio::main]
//! async fn main() -> lookup::Result<()> {
//!     let service = LookupService::from_config(&LookupConfig::default())?;
//!     service.init().await?;
//!     service.configure("token", Environment::Test);
//!
//!     let page = service.search_products("winter boots", SearchOptions::default()).await?;
//!     for item in page.items {
//!         println!("{:?} {:?}", item.item_text, item.current_price);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use lookup_core::*;

// Cache implementations
#[cfg(feature = "cache-sqlite")]
pub use lookup_cache::SqliteItemCache;
pub use lookup_cache::{InMemoryItemCache, NoopItemCache};

// Remote catalog
pub use lookup_catalog::{CatalogClient, Endpoints};

mod config;
mod credentials;
mod service;

pub use config::LookupConfig;
pub use credentials::{
    CredentialSource, Credentials, ENVIRONMENT_VAR, EnvCredentials, StaticCredentials, TOKEN_VAR,
};
pub use service::{
    DEFAULT_MAX_RESULTS, DEFAULT_QUICK_SEARCH_RESULTS, GetItemOptions, LookupService,
    SearchOptions, ServiceCheck, ServiceStatus, identifier_for_term,
};
