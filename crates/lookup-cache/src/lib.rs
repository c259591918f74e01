#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Local item cache backends.
//!
//! This crate provides implementations of the [`ItemCache`] trait from `lookup-core`:
//!
//! - [`SqliteItemCache`] - Persistent SQLite-based cache (default, requires `sqlite` feature)
//! - [`InMemoryItemCache`] - Simple in-memory cache for testing
//! - [`NoopItemCache`] - No-op cache that doesn't store anything

/// In-memory cache implementation.
pub mod memory;
/// No-op cache implementation.
pub mod noop;

/// SQLite-based cache implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use lookup_core::{CacheConfig, ItemCache};

// Re-export implementations
pub use memory::InMemoryItemCache;
pub use noop::NoopItemCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteItemCache;
