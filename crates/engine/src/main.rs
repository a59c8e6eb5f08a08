//! Certkeeper - Main entry point
//!
//! Command line front end for the certificate lifecycle engine.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use certkeeper_common::observability::init_logging;
use certkeeper_common::{CertificateId, TenantId, UserId};
use certkeeper_config::Config;
use certkeeper_engine::acme::InstantAcmeConnector;
use certkeeper_engine::models::SettingsUpdate;
use certkeeper_engine::{
    CertificateLifecycle, CertificateRequest, FileStore, OperationOutcome, RenewalScheduler,
    SecretVault,
};

/// Certkeeper - ACME certificate lifecycle manager
#[derive(Parser, Debug)]
#[command(name = "certkeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTKEEPER_CONFIG", global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit
    CheckConfig,
    /// Request a new certificate for a domain
    Request {
        domain: String,
        /// ACME contact email
        #[arg(long)]
        email: String,
        /// Use the production CA instead of staging
        #[arg(long)]
        production: bool,
        #[arg(long, default_value = "admin")]
        requested_by: String,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Renew a certificate with its existing key
    Renew {
        id: String,
        /// ACME contact email (defaults to the stored settings)
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "admin")]
        requested_by: String,
    },
    /// Revoke a certificate at the CA
    Revoke {
        id: String,
        #[arg(long, default_value = "admin")]
        requested_by: String,
    },
    /// Make a certificate the one served for its domain
    Activate {
        id: String,
        #[arg(long, default_value = "admin")]
        requested_by: String,
    },
    /// Delete a certificate and its audit trail
    Delete { id: String },
    /// Show one certificate
    Show { id: String },
    /// List certificates
    List,
    /// List audit actions
    Actions {
        #[arg(long)]
        certificate: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show or change TLS settings
    Settings {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        auto_renew: Option<bool>,
        #[arg(long)]
        renew_days: Option<u32>,
        #[arg(long)]
        https: Option<bool>,
    },
    /// Run one renewal scan now
    CheckRenewals,
    /// Run the renewal scheduler until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env_overrides()?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_logging(level, config.logging.format);

    let lifecycle = match cli.command {
        Commands::CheckConfig => return check_config(&config, cli.config.as_deref()),
        _ => open_lifecycle(&config)?,
    };

    match cli.command {
        Commands::CheckConfig => check_config(&config, cli.config.as_deref()),
        Commands::Request {
            domain,
            email,
            production,
            requested_by,
            tenant,
        } => {
            let result = lifecycle
                .request_certificate(CertificateRequest {
                    domain,
                    email,
                    requested_by: UserId::new(requested_by),
                    use_production: production,
                    tenant_id: tenant.map(TenantId::new),
                })
                .await;
            report(OperationOutcome::from(result))
        }
        Commands::Renew {
            id,
            email,
            requested_by,
        } => {
            let Some(email) = lifecycle
                .settings()
                .contact_email(email.as_deref())
                .await?
            else {
                anyhow::bail!("No ACME contact email given or stored in settings");
            };
            let id = CertificateId::from_string(id);
            let result = lifecycle
                .renew_certificate(&id, &email, &UserId::new(requested_by), None)
                .await;
            report(with_id(OperationOutcome::from(result), id))
        }
        Commands::Revoke { id, requested_by } => {
            let id = CertificateId::from_string(id);
            let result = lifecycle
                .revoke_certificate(&id, &UserId::new(requested_by))
                .await;
            report(with_id(OperationOutcome::from(result), id))
        }
        Commands::Activate { id, requested_by } => {
            let id = CertificateId::from_string(id);
            let result = lifecycle
                .activate_certificate(&id, &UserId::new(requested_by))
                .await;
            report(with_id(OperationOutcome::from(result), id))
        }
        Commands::Delete { id } => {
            let id = CertificateId::from_string(id);
            let result = lifecycle.delete_certificate(&id).await;
            report(with_id(OperationOutcome::from(result), id))
        }
        Commands::Show { id } => {
            let cert = lifecycle
                .get_certificate(&CertificateId::from_string(id))
                .await?;
            print_json(&cert)
        }
        Commands::List => print_json(&lifecycle.list_certificates().await?),
        Commands::Actions { certificate, limit } => {
            let certificate = certificate.map(CertificateId::from_string);
            let actions = lifecycle.get_actions(certificate.as_ref(), limit).await?;
            print_json(&actions)
        }
        Commands::Settings {
            email,
            auto_renew,
            renew_days,
            https,
        } => {
            let accounts = lifecycle.settings();
            let mut settings = if email.is_some()
                || auto_renew.is_some()
                || renew_days.is_some()
                || https.is_some()
            {
                accounts
                    .update_settings(SettingsUpdate {
                        acme_email: email,
                        auto_renew_enabled: auto_renew,
                        renew_days_before_expiry: renew_days,
                        https_enabled: https,
                        ..Default::default()
                    })
                    .await?
            } else {
                accounts.get_settings().await?
            };
            if settings.account_key_pem.is_some() {
                settings.account_key_pem = Some("<encrypted>".to_string());
            }
            for key in settings.account_keys.values_mut() {
                *key = "<encrypted>".to_string();
            }
            print_json(&settings)
        }
        Commands::CheckRenewals => {
            let scheduler = RenewalScheduler::new(
                lifecycle.clone(),
                UserId::new(config.renewal.system_user.clone()),
            );
            match scheduler.run_once().await? {
                Some(report) => print_json(&report),
                None => {
                    info!("Renewal scan skipped");
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Commands::Run => {
            let scheduler = RenewalScheduler::new(
                lifecycle.clone(),
                UserId::new(config.renewal.system_user.clone()),
            )
            .with_interval(Duration::from_secs(
                config.renewal.check_interval_hours * 3600,
            ));

            tokio::select! {
                _ = scheduler.run() => {}
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Shutdown signal received, stopping scheduler");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_lifecycle(config: &Config) -> Result<Arc<CertificateLifecycle>> {
    config.validate()?;

    let store = FileStore::new(&config.storage.path).with_context(|| {
        format!(
            "Failed to open certificate store at {}",
            config.storage.path.display()
        )
    })?;
    Ok(Arc::new(CertificateLifecycle::new(
        Arc::new(store),
        Arc::new(SecretVault::from_config(&config.vault)),
        Arc::new(InstantAcmeConnector::new()),
        config.acme.clone(),
    )))
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path).context("Failed to load configuration file"),
        None => Config::default_embedded().context("Failed to load embedded configuration"),
    }
}

/// Validate configuration and print the result
fn check_config(config: &Config, path: Option<&str>) -> Result<ExitCode> {
    let result = config.validate().context("Configuration validation failed")?;

    for warning in &result.warnings {
        warn!("{}", warning);
    }

    info!("Configuration test successful:");
    info!("  - CA environment: {}", config.acme.environment);
    info!("  - storage: {}", config.storage.path.display());
    info!(
        "  - renewal check every {} hour(s)",
        config.renewal.check_interval_hours
    );

    println!(
        "certkeeper: configuration file {} test is successful",
        path.unwrap_or("(embedded)")
    );
    Ok(ExitCode::SUCCESS)
}

fn with_id(mut outcome: OperationOutcome, id: CertificateId) -> OperationOutcome {
    outcome.certificate_id.get_or_insert(id);
    outcome
}

fn report(outcome: OperationOutcome) -> Result<ExitCode> {
    let success = outcome.success;
    print_json(&outcome)?;
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}
