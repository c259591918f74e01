//! Catalog environment and deployment mode definitions.
//!
//! This module defines [`Environment`] for selecting which catalog backend a
//! client talks to, and [`DeploymentMode`] for how requests reach it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LookupError;

/// Remote catalog environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development backend.
    Dev,
    /// Test backend.
    #[default]
    Test,
    /// Production backend.
    Prod,
}

impl Environment {
    /// Returns the lowercase name of the environment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(LookupError::InvalidParameter(format!(
                "Unknown environment: {other}. Supported: dev, test, prod"
            ))),
        }
    }
}

/// How requests reach the remote catalog.
///
/// The deployment mode, not the [`Environment`], decides which header carries
/// the credential: the production edge strips a standard bearer header before
/// forwarding, so edge requests use a custom header instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Same-origin local reverse proxy (development).
    #[default]
    LocalProxy,
    /// Direct edge/CDN origin (production).
    Edge,
}
