//! Shared enums used by configuration and the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Let's Encrypt production directory URL
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt staging directory URL
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// ACME certificate authority environment.
///
/// Staging issues certificates browsers do not trust, without the
/// production rate limits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CaEnvironment {
    #[default]
    Staging,
    Production,
}

impl CaEnvironment {
    /// Select the environment from the `use_production` flag callers pass around
    pub fn from_production_flag(use_production: bool) -> Self {
        if use_production {
            Self::Production
        } else {
            Self::Staging
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Default Let's Encrypt directory URL for this environment
    pub fn default_directory_url(self) -> &'static str {
        match self {
            Self::Staging => LETSENCRYPT_STAGING,
            Self::Production => LETSENCRYPT_PRODUCTION,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for CaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown CA environment name
#[derive(Debug, Clone, Error)]
#[error("unknown CA environment '{0}', expected 'staging' or 'production'")]
pub struct ParseCaEnvironmentError(pub String);

impl FromStr for CaEnvironment {
    type Err = ParseCaEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ParseCaEnvironmentError(other.to_string())),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}
