//! Configuration for the certkeeper certificate manager.
//!
//! Configuration is written in KDL (JSON is accepted as well). A built-in
//! default is embedded for running without a file, and a small set of
//! environment variables can override the CA defaults at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use validator::Validate;

pub mod defaults;
pub mod kdl;
pub mod sections;
pub mod validate;

pub use defaults::DEFAULT_CONFIG_KDL;
pub use sections::{AcmeConfig, LoggingConfig, RenewalConfig, StorageConfig, VaultConfig};
pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

use certkeeper_common::CaEnvironment;

/// Environment variable selecting the default CA environment
pub const ENV_CA_ENVIRONMENT: &str = "CERTKEEPER_CA_ENV";
/// Environment variable providing the default ACME contact
pub const ENV_ACME_EMAIL: &str = "CERTKEEPER_ACME_EMAIL";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub acme: AcmeConfig,

    #[serde(default)]
    #[validate(nested)]
    pub vault: VaultConfig,

    #[serde(default)]
    #[validate(nested)]
    pub renewal: RenewalConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file, picking the format by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        let config = match extension {
            "kdl" => Self::from_kdl(&content),
            "json" => Self::from_json(&content),
            _ => Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        }?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load the default embedded configuration
    pub fn default_embedded() -> Result<Self> {
        Self::from_kdl(DEFAULT_CONFIG_KDL).or_else(|e| {
            tracing::warn!(
                "Failed to parse embedded KDL config, using programmatic default: {}",
                e
            );
            Ok(Self::default())
        })
    }

    /// Parse configuration from KDL format
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content
            .parse()
            .map_err(|e: ::kdl::KdlError| anyhow::anyhow!(kdl::render_parse_error(content, &e)))?;

        kdl::parse_document(&doc)
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON configuration")
    }

    /// Apply `CERTKEEPER_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(env) = lookup(ENV_CA_ENVIRONMENT) {
            let environment: CaEnvironment = env
                .parse()
                .with_context(|| format!("Invalid {}", ENV_CA_ENVIRONMENT))?;
            debug!(environment = %environment, "CA environment overridden from environment");
            self.acme.environment = environment;
        }

        if let Some(email) = lookup(ENV_ACME_EMAIL).filter(|e| !e.trim().is_empty()) {
            debug!("ACME contact overridden from environment");
            self.acme.email = Some(email);
        }

        Ok(())
    }

    /// Validate field rules and semantic constraints
    pub fn validate(&self) -> Result<ValidationResult> {
        Validate::validate(self)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

        let result = validate::validate_all(self);
        if !result.is_valid() {
            let messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
            anyhow::bail!("Configuration validation failed:\n  {}", messages.join("\n  "));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certkeeper_common::LogFormat;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_embedded_parses() {
        let config = Config::default_embedded().unwrap();
        assert_eq!(config.acme.environment, CaEnvironment::Staging);
        assert_eq!(config.acme.challenge_ttl_secs, 600);
        assert_eq!(config.vault.iterations, 100_000);
        assert_eq!(
            config.vault.master_key_env,
            vec!["TLS_MASTER_KEY".to_string(), "SESSION_SECRET".to_string()]
        );
        assert_eq!(config.renewal.check_interval_hours, 12);
    }

    #[test]
    fn test_from_kdl_overrides() {
        let config = Config::from_kdl(
            r#"
            acme {
                environment "production"
                email "ops@example.com"
                challenge-ttl-secs 300
            }
            logging {
                level "debug"
                format "json"
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.acme.environment, CaEnvironment::Production);
        assert_eq!(config.acme.email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.acme.challenge_ttl_secs, 300);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "debug");
        // Untouched blocks keep defaults
        assert_eq!(config.renewal.system_user, "system");
    }

    #[test]
    fn test_from_kdl_invalid_environment() {
        let err = Config::from_kdl(r#"acme { environment "qa" }"#).unwrap_err();
        assert!(format!("{:#}", err).contains("qa"));
    }

    #[test]
    fn test_from_kdl_syntax_error() {
        let err = Config::from_kdl("acme { environment \"staging\" ").unwrap_err();
        assert!(err.to_string().contains("KDL configuration parse error"));
    }

    #[test]
    fn test_from_json() {
        let config = Config::from_json(
            r#"{"acme": {"environment": "production", "challenge-ttl-secs": 120}}"#,
        )
        .unwrap();
        assert_eq!(config.acme.environment, CaEnvironment::Production);
        assert_eq!(config.acme.challenge_ttl_secs, 120);
        assert_eq!(config.acme.default_validity_days, 90);
    }

    #[test]
    fn test_from_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".kdl").tempfile().unwrap();
        writeln!(file, "storage {{ path \"/tmp/certkeeper-test\" }}").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.storage.path,
            std::path::PathBuf::from("/tmp/certkeeper-test")
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_CA_ENVIRONMENT, "production"),
            (ENV_ACME_EMAIL, "admin@example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.acme.environment, CaEnvironment::Production);
        assert_eq!(config.acme.email.as_deref(), Some("admin@example.com"));
    }

    #[test]
    fn test_env_override_rejects_unknown_environment() {
        let mut config = Config::default();
        let result = config.apply_overrides_from(|name| {
            (name == ENV_CA_ENVIRONMENT).then(|| "moon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let mut config = Config::default();
        config.acme.email = Some("not-an-email".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default_passes() {
        let config = Config::default_embedded().unwrap();
        assert!(config.validate().is_ok());
    }
}
