//! Section block parsers.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::trace;

use certkeeper_common::{CaEnvironment, LogFormat};

use crate::defaults::*;
use crate::sections::*;

use super::helpers::{get_int_entry, get_string_args, get_string_entry};

/// Parse the `acme` block
pub fn parse_acme_config(node: &kdl::KdlNode) -> Result<AcmeConfig> {
    trace!("Parsing acme configuration block");
    let defaults = AcmeConfig::default();

    let environment = match get_string_entry(node, "environment") {
        Some(env) => env
            .parse::<CaEnvironment>()
            .context("Invalid 'environment' in acme block")?,
        None => defaults.environment,
    };

    let config = AcmeConfig {
        environment,
        staging_directory: get_string_entry(node, "staging-directory")
            .unwrap_or(defaults.staging_directory),
        production_directory: get_string_entry(node, "production-directory")
            .unwrap_or(defaults.production_directory),
        email: get_string_entry(node, "email"),
        challenge_ttl_secs: get_int_entry(node, "challenge-ttl-secs")
            .map(|v| v as u64)
            .unwrap_or_else(default_challenge_ttl_secs),
        default_validity_days: get_int_entry(node, "default-validity-days")
            .map(|v| v as u32)
            .unwrap_or_else(default_validity_days),
        order_timeout_secs: get_int_entry(node, "order-timeout-secs")
            .map(|v| v as u64)
            .unwrap_or_else(default_order_timeout_secs),
    };

    trace!(
        environment = %config.environment,
        challenge_ttl_secs = config.challenge_ttl_secs,
        "Parsed acme configuration"
    );

    Ok(config)
}

/// Parse the `vault` block
pub fn parse_vault_config(node: &kdl::KdlNode) -> Result<VaultConfig> {
    trace!("Parsing vault configuration block");

    let master_key_env = get_string_args(node, "master-key-env")
        .filter(|vars| !vars.is_empty())
        .unwrap_or_else(default_master_key_env);

    Ok(VaultConfig {
        master_key_env,
        iterations: get_int_entry(node, "iterations")
            .map(|v| v as u32)
            .unwrap_or_else(default_kdf_iterations),
    })
}

/// Parse the `renewal` block
pub fn parse_renewal_config(node: &kdl::KdlNode) -> Result<RenewalConfig> {
    Ok(RenewalConfig {
        check_interval_hours: get_int_entry(node, "check-interval-hours")
            .map(|v| v as u64)
            .unwrap_or_else(default_check_interval_hours),
        system_user: get_string_entry(node, "system-user").unwrap_or_else(default_system_user),
    })
}

/// Parse the `storage` block
pub fn parse_storage_config(node: &kdl::KdlNode) -> Result<StorageConfig> {
    Ok(StorageConfig {
        path: get_string_entry(node, "path")
            .map(PathBuf::from)
            .unwrap_or_else(default_storage_path),
    })
}

/// Parse the `logging` block
pub fn parse_logging_config(node: &kdl::KdlNode) -> Result<LoggingConfig> {
    Ok(LoggingConfig {
        level: get_string_entry(node, "level").unwrap_or_else(default_log_level),
        format: get_string_entry(node, "format")
            .map(|s| LogFormat::from_str_loose(&s))
            .unwrap_or_default(),
    })
}
