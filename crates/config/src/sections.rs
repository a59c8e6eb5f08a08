//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use certkeeper_common::{CaEnvironment, LogFormat};

use crate::defaults::*;

/// ACME client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct AcmeConfig {
    /// CA environment used when a caller does not choose one
    #[serde(default)]
    pub environment: CaEnvironment,

    /// Staging directory URL
    #[serde(default = "staging_directory")]
    pub staging_directory: String,

    /// Production directory URL
    #[serde(default = "production_directory")]
    pub production_directory: String,

    /// Default contact email for scheduled renewals
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,

    /// Lifetime of a stored HTTP-01 challenge
    #[serde(default = "default_challenge_ttl_secs")]
    #[validate(range(min = 1, max = 86400))]
    pub challenge_ttl_secs: u64,

    /// Validity assumed when the issued chain cannot be parsed
    #[serde(default = "default_validity_days")]
    #[validate(range(min = 1, max = 398))]
    pub default_validity_days: u32,

    /// How long to wait for the CA to validate an order
    #[serde(default = "default_order_timeout_secs")]
    #[validate(range(min = 5, max = 3600))]
    pub order_timeout_secs: u64,
}

fn staging_directory() -> String {
    CaEnvironment::Staging.default_directory_url().to_string()
}

fn production_directory() -> String {
    CaEnvironment::Production.default_directory_url().to_string()
}

impl AcmeConfig {
    /// Directory URL for the given environment
    pub fn directory_url(&self, environment: CaEnvironment) -> &str {
        match environment {
            CaEnvironment::Staging => &self.staging_directory,
            CaEnvironment::Production => &self.production_directory,
        }
    }
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            environment: CaEnvironment::default(),
            staging_directory: staging_directory(),
            production_directory: production_directory(),
            email: None,
            challenge_ttl_secs: default_challenge_ttl_secs(),
            default_validity_days: default_validity_days(),
            order_timeout_secs: default_order_timeout_secs(),
        }
    }
}

/// Secret vault configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct VaultConfig {
    /// Environment variables consulted for the master secret, first set wins
    #[serde(default = "default_master_key_env")]
    #[validate(length(min = 1))]
    pub master_key_env: Vec<String>,

    /// PBKDF2 iteration count
    #[serde(default = "default_kdf_iterations")]
    #[validate(range(min = 10000))]
    pub iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            master_key_env: default_master_key_env(),
            iterations: default_kdf_iterations(),
        }
    }
}

/// Renewal scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct RenewalConfig {
    #[serde(default = "default_check_interval_hours")]
    #[validate(range(min = 1, max = 168))]
    pub check_interval_hours: u64,

    /// User recorded on audit actions produced by scheduled runs
    #[serde(default = "default_system_user")]
    #[validate(length(min = 1))]
    pub system_user: String,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: default_check_interval_hours(),
            system_user: default_system_user(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
