//! Service configuration.

use lookup_catalog::{DEFAULT_USER_ID, Endpoints};
use lookup_core::{CacheConfig, DeploymentMode, LookupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of a [`LookupService`](crate::LookupService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// SQLite database file. `None` keeps the cache in memory.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Maximum number of cached items before eviction.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Interval of the background expiry sweep. `None` disables it.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    /// How requests reach the catalog.
    #[serde(default)]
    pub deployment: DeploymentMode,
    /// Origin of the local reverse proxy, used in `local_proxy` mode.
    #[serde(default = "default_proxy_origin")]
    pub proxy_origin: String,
    /// Value of the `lrs-userid` header.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_proxy_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            sweep_interval_secs: None,
            deployment: DeploymentMode::default(),
            proxy_origin: default_proxy_origin(),
            user_id: default_user_id(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LookupConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LookupError::InvalidParameter(format!("Cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| LookupError::Parse(e.to_string()))
    }

    /// Cache policy derived from this configuration.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_max_entries(self.cache_max_entries)
    }

    /// Catalog endpoints for the deployment mode.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        match self.deployment {
            DeploymentMode::LocalProxy => Endpoints::local_proxy(&self.proxy_origin),
            DeploymentMode::Edge => Endpoints::edge(),
        }
    }

    /// Expiry sweep interval, if enabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
