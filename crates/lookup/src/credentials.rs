//! Sources of previously persisted catalog credentials.

use async_trait::async_trait;
use lookup_core::{Environment, Result};
use std::fmt;

/// Environment variable holding the bearer token.
pub const TOKEN_VAR: &str = "ITEM_TOKEN";

/// Environment variable holding the catalog environment.
pub const ENVIRONMENT_VAR: &str = "ITEM_ENVIRONMENT";

/// A bearer token together with the environment it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token.
    pub token: String,
    /// Catalog environment.
    pub environment: Environment,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .field("environment", &self.environment)
            .finish()
    }
}

impl Credentials {
    /// Create credentials for an environment.
    #[must_use]
    pub fn new(token: impl Into<String>, environment: Environment) -> Self {
        Self {
            token: token.into(),
            environment,
        }
    }
}

/// Provides credentials for a one-time lazy configure of the catalog.
#[async_trait]
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Loads the persisted credentials, if any.
    async fn load(&self) -> Result<Option<Credentials>>;
}

/// Reads credentials from `ITEM_TOKEN` and `ITEM_ENVIRONMENT`, optionally
/// prefixed (e.g. `POS_ITEM_TOKEN`).
///
/// A missing environment variable defaults to [`Environment::Test`].
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    prefix: Option<String>,
}

impl EnvCredentials {
    /// Create a source reading variables with the given prefix.
    #[must_use]
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    fn resolve_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}_{name}"),
            None => name.to_string(),
        }
    }

    fn from_values(token: Option<String>, environment: Option<String>) -> Result<Option<Credentials>> {
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };
        let environment = match environment {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };
        Ok(Some(Credentials::new(token, environment)))
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn load(&self) -> Result<Option<Credentials>> {
        let token = std::env::var(self.resolve_name(TOKEN_VAR)).ok();
        let environment = std::env::var(self.resolve_name(ENVIRONMENT_VAR)).ok();
        Self::from_values(token, environment)
    }
}

/// Fixed credentials, e.g. restored by the embedding application.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    /// Create a source that always yields `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(Some(self.0.clone()))
    }
}
