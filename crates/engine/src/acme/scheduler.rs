//! Background certificate renewal scheduler
//!
//! Periodically renews certificates close to expiry and marks lapsed ones
//! as expired.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant};
use tracing::{debug, error, info};

use certkeeper_common::UserId;

use crate::errors::LifecycleResult;
use crate::lifecycle::{CertificateLifecycle, RenewalReport};

/// Default check interval (12 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 3600);

/// Minimum check interval (1 hour)
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Background certificate renewal scheduler
///
/// Reads the renewal window and auto-renew switch from the stored settings
/// on every tick, so changes take effect without a restart.
pub struct RenewalScheduler {
    lifecycle: Arc<CertificateLifecycle>,
    /// Identity recorded as `performed_by` on scheduled renewals
    system_user: UserId,
    check_interval: Duration,
}

impl RenewalScheduler {
    pub fn new(lifecycle: Arc<CertificateLifecycle>, system_user: UserId) -> Self {
        Self {
            lifecycle,
            system_user,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 hour to avoid
    /// excessive polling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run the renewal loop forever
    pub async fn run(self) {
        info!(
            check_interval_hours = self.check_interval.as_secs() / 3600,
            "Starting certificate renewal scheduler"
        );

        // Initial check after a short delay
        tokio::time::sleep(Duration::from_secs(10)).await;

        if let Err(e) = self.run_once().await {
            error!(error = %e, "Initial certificate renewal check failed");
        }

        let mut interval = interval(self.check_interval);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            debug!("Running scheduled certificate renewal check");

            if let Err(e) = self.run_once().await {
                error!(error = %e, "Certificate renewal check failed");
            }
        }
    }

    /// One scheduler tick
    ///
    /// Returns `None` when renewal was skipped because auto-renew is off or
    /// no contact email is known. Expired certificates are swept either way.
    pub async fn run_once(&self) -> LifecycleResult<Option<RenewalReport>> {
        let start = Instant::now();
        let accounts = self.lifecycle.settings();
        let settings = accounts.get_settings().await?;

        let report = if !settings.auto_renew_enabled {
            info!("Automatic renewal disabled, skipping renewal scan");
            None
        } else {
            match accounts.contact_email(None).await? {
                None => {
                    info!("No ACME contact email configured, skipping renewal scan");
                    None
                }
                Some(email) => Some(
                    self.lifecycle
                        .check_and_renew_expiring(
                            settings.renew_days_before_expiry,
                            &email,
                            &self.system_user,
                            None,
                        )
                        .await?,
                ),
            }
        };

        let expired = self.lifecycle.sweep_expired_certificates().await?;

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            renewed = report.as_ref().map_or(0, |r| r.renewed),
            failed = report.as_ref().map_or(0, |r| r.errors.len()),
            expired,
            "Certificate renewal check completed"
        );

        Ok(report)
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("check_interval", &self.check_interval)
            .field("system_user", &self.system_user)
            .finish()
    }
}
