//! Error types for item lookup operations.
//!
//! This module defines [`LookupError`] which covers every failure that can
//! cross the public API: configuration, remote catalog, and cache errors.

use thiserror::Error;

/// Maximum number of response body characters kept in a [`LookupError::Protocol`].
pub const BODY_SNIPPET_LEN: usize = 512;

/// Errors that can occur during item lookup operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    /// The service has not been initialized or the catalog client has no
    /// credential yet.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The remote catalog answered successfully but returned no item.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// The request never produced a response (connect failure, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote catalog answered with a non-2xx status.
    #[error("API Error {status}: {body}")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// Error interacting with the local cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A payload could not be serialized or deserialized.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl LookupError {
    /// Builds a [`LookupError::Protocol`], truncating the body to
    /// [`BODY_SNIPPET_LEN`] characters.
    #[must_use]
    pub fn protocol(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(BODY_SNIPPET_LEN) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::Protocol { status, body }
    }

    /// Returns true for errors where the remote catalog confirmed the item
    /// does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true when the error stems from missing initialization or
    /// configuration rather than from the lookup itself.
    #[must_use]
    pub const fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// Result type alias using [`LookupError`].
pub type Result<T> = std::result::Result<T, LookupError>;
