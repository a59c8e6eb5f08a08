//! Default values and the embedded default configuration.

use std::path::PathBuf;

/// Configuration used when no file is supplied.
pub const DEFAULT_CONFIG_KDL: &str = r#"
acme {
    environment "staging"
    staging-directory "https://acme-staging-v02.api.letsencrypt.org/directory"
    production-directory "https://acme-v02.api.letsencrypt.org/directory"
    challenge-ttl-secs 600
    default-validity-days 90
    order-timeout-secs 120
}

vault {
    master-key-env "TLS_MASTER_KEY" "SESSION_SECRET"
    iterations 100000
}

renewal {
    check-interval-hours 12
    system-user "system"
}

storage {
    path "/var/lib/certkeeper"
}

logging {
    level "info"
    format "pretty"
}
"#;

pub fn default_challenge_ttl_secs() -> u64 {
    600
}

pub fn default_validity_days() -> u32 {
    90
}

pub fn default_order_timeout_secs() -> u64 {
    120
}

pub fn default_master_key_env() -> Vec<String> {
    vec!["TLS_MASTER_KEY".to_string(), "SESSION_SECRET".to_string()]
}

pub fn default_kdf_iterations() -> u32 {
    100_000
}

pub fn default_check_interval_hours() -> u64 {
    12
}

pub fn default_system_user() -> String {
    "system".to_string()
}

pub fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/certkeeper")
}

pub fn default_log_level() -> String {
    "info".to_string()
}
