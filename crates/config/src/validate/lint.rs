//! Configuration linting for best practices

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// Lint configuration for best practices
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    // Scheduled renewals fall back to the configured contact
    if config.acme.environment.is_production() && config.acme.email.is_none() {
        result.add_warning(ValidationWarning::new(
            "Production CA selected without a default contact email (expiry notices will not reach anyone)",
        ));
    }

    if config.acme.challenge_ttl_secs < 60 {
        result.add_warning(ValidationWarning::new(format!(
            "Challenge TTL of {}s is shorter than typical CA validation latency",
            config.acme.challenge_ttl_secs
        )));
    }

    if config.acme.order_timeout_secs > config.acme.challenge_ttl_secs {
        result.add_warning(ValidationWarning::new(format!(
            "Order timeout ({}s) exceeds challenge TTL ({}s); challenges may be swept mid-order",
            config.acme.order_timeout_secs, config.acme.challenge_ttl_secs
        )));
    }

    if config.vault.iterations < 100_000 {
        result.add_warning(ValidationWarning::new(format!(
            "Vault key derivation uses {} iterations; existing records need the same count to decrypt",
            config.vault.iterations
        )));
    }

    if config.vault.master_key_env.iter().all(|var| std::env::var(var).is_err()) {
        result.add_warning(ValidationWarning::new(format!(
            "None of the vault master key variables ({}) are set",
            config.vault.master_key_env.join(", ")
        )));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use certkeeper_common::CaEnvironment;

    #[test]
    fn test_production_without_email_warns() {
        let mut config = Config::default();
        config.acme.environment = CaEnvironment::Production;
        config.acme.email = None;

        let result = lint_config(&config);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("contact email")));
    }

    #[test]
    fn test_short_ttl_warns() {
        let mut config = Config::default();
        config.acme.challenge_ttl_secs = 30;
        config.acme.order_timeout_secs = 20;

        let result = lint_config(&config);
        assert!(result.warnings.iter().any(|w| w.message.contains("30s")));
        assert!(result.is_valid());
    }

    #[test]
    fn test_master_key_env_missing_warns() {
        let mut config = Config::default();
        config.vault.master_key_env = vec!["CERTKEEPER_LINT_TEST_UNSET_VAR".to_string()];

        let result = lint_config(&config);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("CERTKEEPER_LINT_TEST_UNSET_VAR")));
    }
}
