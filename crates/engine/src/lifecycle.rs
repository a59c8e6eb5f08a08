//! Certificate lifecycle engine
//!
//! Drives certificates through request, issuance, renewal, activation and
//! revocation. Every state change is mirrored by an audit action, and
//! failures are logged with a title, description, cause and suggested fix.
//!
//! # States
//!
//! ```text
//! pending ──issued──► active ──renew──► pending ──► active
//!    │                  │  │                  │
//!    └──failure──► failed  └──revoke──► revoked └──failure──► failed
//! ```
//!
//! `active` certificates whose `expires_at` has passed read as `expired`
//! and are persisted as such by [`CertificateLifecycle::sweep_expired_certificates`].

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use certkeeper_common::{CaEnvironment, CertificateId, TenantId, UserId};
use certkeeper_config::AcmeConfig;

use crate::acme::{keys, AcmeConnector, AcmeError, AcmeSession, ChallengeBridge, SettingsManager};
use crate::errors::{LifecycleError, LifecycleResult, StoreError};
use crate::models::{
    ActionDetails, ActionKind, ActionStatus, CertificateStatus, CertificateUpdate, ChallengeType,
    NewAction, NewCertificate, TlsCertificate, TlsCertificateAction,
};
use crate::store::{TlsStore, DEFAULT_ACTION_LIMIT};
use crate::vault::SecretVault;

/// Parameters of a new certificate request
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub domain: String,
    pub email: String,
    pub requested_by: UserId,
    pub use_production: bool,
    pub tenant_id: Option<TenantId>,
}

/// One certificate the renewal scan could not renew
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalFailure {
    pub certificate_id: CertificateId,
    pub domain: String,
    pub message: String,
}

/// Outcome of a renewal scan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalReport {
    pub renewed: usize,
    pub errors: Vec<RenewalFailure>,
    pub challenges_swept: usize,
}

/// Serializable result of a single operation, for CLI and API callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<CertificateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    pub fn success(certificate_id: Option<CertificateId>) -> Self {
        Self {
            success: true,
            certificate_id,
            error: None,
        }
    }

    pub fn failure(error: &LifecycleError) -> Self {
        Self {
            success: false,
            certificate_id: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<LifecycleResult<CertificateId>> for OperationOutcome {
    fn from(result: LifecycleResult<CertificateId>) -> Self {
        match result {
            Ok(id) => Self::success(Some(id)),
            Err(e) => Self::failure(&e),
        }
    }
}

impl From<LifecycleResult<()>> for OperationOutcome {
    fn from(result: LifecycleResult<()>) -> Self {
        match result {
            Ok(()) => Self::success(None),
            Err(e) => Self::failure(&e),
        }
    }
}

/// Timing knobs derived from the `acme` config block
#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    pub challenge_ttl: Duration,
    pub order_timeout: StdDuration,
    pub default_validity: Duration,
}

impl From<&AcmeConfig> for LifecycleOptions {
    fn from(config: &AcmeConfig) -> Self {
        Self {
            challenge_ttl: Duration::seconds(config.challenge_ttl_secs as i64),
            order_timeout: StdDuration::from_secs(config.order_timeout_secs),
            default_validity: Duration::days(i64::from(config.default_validity_days)),
        }
    }
}

/// Certificate lifecycle engine
pub struct CertificateLifecycle {
    store: Arc<dyn TlsStore>,
    vault: Arc<SecretVault>,
    accounts: Arc<SettingsManager>,
    challenges: ChallengeBridge,
    options: LifecycleOptions,
    in_flight: DashMap<CertificateId, ()>,
}

impl CertificateLifecycle {
    pub fn new(
        store: Arc<dyn TlsStore>,
        vault: Arc<SecretVault>,
        connector: Arc<dyn AcmeConnector>,
        acme: AcmeConfig,
    ) -> Self {
        let options = LifecycleOptions::from(&acme);
        let accounts = Arc::new(SettingsManager::new(
            store.clone(),
            vault.clone(),
            connector,
            acme,
        ));
        let challenges = ChallengeBridge::new(store.clone()).with_ttl(options.challenge_ttl);

        Self {
            store,
            vault,
            accounts,
            challenges,
            options,
            in_flight: DashMap::new(),
        }
    }

    /// Settings and account manager shared with this engine
    pub fn settings(&self) -> &Arc<SettingsManager> {
        &self.accounts
    }

    /// Challenge bridge for the port-80 responder
    pub fn challenges(&self) -> &ChallengeBridge {
        &self.challenges
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Request a new certificate for a single domain
    ///
    /// Returns the new certificate id once it is active. A failure after the
    /// row was created leaves it `failed` with a matching audit action.
    pub async fn request_certificate(
        &self,
        request: CertificateRequest,
    ) -> LifecycleResult<CertificateId> {
        let domain = normalize_domain(&request.domain)?;
        let environment = CaEnvironment::from_production_flag(request.use_production);

        info!(
            domain = %domain,
            environment = %environment,
            requested_by = %request.requested_by,
            "Requesting certificate"
        );

        let session = self
            .accounts
            .session(environment, Some(&request.email))
            .await
            .inspect_err(|e| {
                log_failure(
                    "Certificate request failed",
                    &format!("Could not prepare an ACME account for {}", domain),
                    e,
                    "Check the contact email, the vault master key and CA reachability",
                )
            })?;

        // Plaintext key is dropped (and zeroized) at the end of this block
        let (encrypted_key, csr) = {
            let key_pem = keys::generate_private_key()?;
            let encrypted = self.vault.encrypt_to_portable(&key_pem)?;
            let csr = keys::create_csr(&domain, &key_pem)?;
            (encrypted, csr)
        };

        let cert = self
            .store
            .create_certificate(NewCertificate {
                domain: domain.clone(),
                status: CertificateStatus::Pending,
                ca_type: environment,
                private_key_pem: encrypted_key,
                tenant_id: request.tenant_id.clone(),
                created_by: Some(request.requested_by.clone()),
            })
            .await?;

        self.audit(NewAction {
            certificate_id: cert.id.clone(),
            action: ActionKind::Requested,
            status: ActionStatus::Pending,
            performed_by: Some(request.requested_by.clone()),
            message: format!("Certificate requested for {}", domain),
            details: ActionDetails::Requested {
                domain: domain.clone(),
                challenge_type: ChallengeType::Http01,
                ca_type: environment,
            },
        })
        .await?;

        let chain = match self
            .run_order(session.as_ref(), &domain, &csr, request.tenant_id.as_ref())
            .await
        {
            Ok(chain) => chain,
            Err(e) => {
                self.mark_failed(&cert.id).await;
                self.audit_best_effort(NewAction {
                    certificate_id: cert.id.clone(),
                    action: ActionKind::Requested,
                    status: ActionStatus::Failed,
                    performed_by: Some(request.requested_by.clone()),
                    message: format!("Certificate request failed: {}", e),
                    details: ActionDetails::failure(e.to_string(), &domain)
                        .with_context("environment", environment.as_str()),
                })
                .await;
                log_failure(
                    "Certificate request failed",
                    &format!("ACME order for {} did not complete", domain),
                    &e,
                    "Make sure port 80 serves /.well-known/acme-challenge/ for this domain",
                );
                return Err(e);
            }
        };

        let now = Utc::now();
        let expires_at = self.expiry_of(&chain, now);
        self.store
            .update_certificate(
                &cert.id,
                CertificateUpdate {
                    status: Some(CertificateStatus::Active),
                    is_active: Some(true),
                    certificate_pem: Some(chain),
                    issued_at: Some(now),
                    expires_at: Some(expires_at),
                    ..Default::default()
                },
            )
            .await?;

        self.audit(NewAction {
            certificate_id: cert.id.clone(),
            action: ActionKind::Issued,
            status: ActionStatus::Success,
            performed_by: Some(request.requested_by),
            message: format!("Certificate issued for {}", domain),
            details: ActionDetails::Issued {
                domain: domain.clone(),
                expires_at,
            },
        })
        .await?;

        info!(
            certificate_id = %cert.id,
            domain = %domain,
            expires_at = %expires_at,
            "Certificate issued"
        );
        Ok(cert.id)
    }

    /// Renew a certificate with its existing private key
    ///
    /// Revoked certificates are refused. `renewal_attempts` is incremented
    /// before the order starts and is not reset on success.
    pub async fn renew_certificate(
        &self,
        id: &CertificateId,
        email: &str,
        requested_by: &UserId,
        tenant_id: Option<&TenantId>,
    ) -> LifecycleResult<()> {
        let _guard = self.claim(id)?;
        let cert = self.load(id).await?;

        if cert.status == CertificateStatus::Revoked {
            warn!(certificate_id = %id, domain = %cert.domain, "Refusing to renew revoked certificate");
            return Err(LifecycleError::Revoked(id.clone()));
        }
        let Some(encrypted_key) = cert.private_key_pem.as_deref() else {
            return Err(LifecycleError::InvalidState {
                id: id.clone(),
                operation: "renewed",
                status: "missing private key".to_string(),
            });
        };

        let attempt = cert.renewal_attempts + 1;
        self.store
            .update_certificate(
                id,
                CertificateUpdate {
                    status: Some(CertificateStatus::Pending),
                    renewal_attempts: Some(attempt),
                    ..Default::default()
                },
            )
            .await?;

        self.audit(NewAction {
            certificate_id: id.clone(),
            action: ActionKind::Renewed,
            status: ActionStatus::Pending,
            performed_by: Some(requested_by.clone()),
            message: format!("Certificate renewal started for {}", cert.domain),
            details: ActionDetails::RenewalStarted {
                domain: cert.domain.clone(),
                attempt,
            },
        })
        .await?;

        info!(
            certificate_id = %id,
            domain = %cert.domain,
            attempt,
            "Renewing certificate"
        );

        let tenant_id = tenant_id.or(cert.tenant_id.as_ref());
        let chain = match self.renew_order(&cert, encrypted_key, email, tenant_id).await {
            Ok(chain) => chain,
            Err(e) => {
                self.mark_failed(id).await;
                self.audit_best_effort(NewAction {
                    certificate_id: id.clone(),
                    action: ActionKind::Renewed,
                    status: ActionStatus::Failed,
                    performed_by: Some(requested_by.clone()),
                    message: format!("Certificate renewal failed: {}", e),
                    details: ActionDetails::failure(e.to_string(), &cert.domain)
                        .with_context("attempt", attempt.to_string()),
                })
                .await;
                log_failure(
                    "Certificate renewal failed",
                    &format!("Renewal attempt {} for {} did not complete", attempt, cert.domain),
                    &e,
                    "Check that the domain still resolves to this host and port 80 is reachable",
                );
                return Err(e);
            }
        };

        let now = Utc::now();
        let expires_at = self.expiry_of(&chain, now);
        self.store
            .update_certificate(
                id,
                CertificateUpdate {
                    status: Some(CertificateStatus::Active),
                    certificate_pem: Some(chain),
                    issued_at: Some(now),
                    expires_at: Some(expires_at),
                    last_renewal_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        self.audit(NewAction {
            certificate_id: id.clone(),
            action: ActionKind::Renewed,
            status: ActionStatus::Success,
            performed_by: Some(requested_by.clone()),
            message: format!("Certificate renewed for {}", cert.domain),
            details: ActionDetails::Renewed {
                domain: cert.domain.clone(),
                expires_at,
                attempt,
            },
        })
        .await?;

        info!(
            certificate_id = %id,
            domain = %cert.domain,
            expires_at = %expires_at,
            "Certificate renewed"
        );
        Ok(())
    }

    async fn renew_order(
        &self,
        cert: &TlsCertificate,
        encrypted_key: &str,
        email: &str,
        tenant_id: Option<&TenantId>,
    ) -> LifecycleResult<String> {
        let session = self.accounts.session(cert.ca_type, Some(email)).await?;
        let csr = {
            let key_pem = self.vault.read_transparent(encrypted_key)?;
            keys::create_csr(&cert.domain, &key_pem)?
        };
        self.run_order(session.as_ref(), &cert.domain, &csr, tenant_id)
            .await
    }

    /// Order, answer every HTTP-01 challenge, finalize and download the chain
    async fn run_order(
        &self,
        session: &dyn AcmeSession,
        domain: &str,
        csr_der: &[u8],
        tenant_id: Option<&TenantId>,
    ) -> LifecycleResult<String> {
        let order = session.new_order(domain).await?;
        let challenges = session.http01_challenges(&order).await?;

        if challenges.is_empty() {
            debug!(domain = %domain, "All authorizations already valid");
            session
                .wait_for_valid(&order, self.options.order_timeout)
                .await?;
        }

        for challenge in &challenges {
            self.challenges
                .store_challenge(
                    &challenge.token,
                    &challenge.key_authorization,
                    &challenge.domain,
                    tenant_id,
                )
                .await?;
            session.verify_challenge(&order, challenge).await?;
            session
                .wait_for_valid(&order, self.options.order_timeout)
                .await?;
            self.challenges.mark_complete(&challenge.token).await?;
        }

        Ok(session.finalize(&order, csr_der).await?)
    }

    fn expiry_of(&self, chain: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        keys::parse_not_after(chain).unwrap_or_else(|| {
            warn!(
                validity_days = self.options.default_validity.num_days(),
                "Could not read notAfter from issued chain, assuming default validity"
            );
            now + self.options.default_validity
        })
    }

    // =========================================================================
    // Revocation and activation
    // =========================================================================

    /// Revoke a certificate at the CA
    ///
    /// Idempotent: revoking an already revoked certificate succeeds, and a
    /// CA response saying so counts as success as well.
    pub async fn revoke_certificate(
        &self,
        id: &CertificateId,
        requested_by: &UserId,
    ) -> LifecycleResult<()> {
        let _guard = match self.claim(id) {
            Ok(guard) => guard,
            Err(e) => {
                self.audit_revoke_refused(id, requested_by, &e).await;
                return Err(e);
            }
        };
        let cert = match self.load(id).await {
            Ok(cert) => cert,
            Err(e @ LifecycleError::NotFound(_)) => return Err(e),
            Err(e) => {
                self.audit_revoke_refused(id, requested_by, &e).await;
                return Err(e);
            }
        };

        if cert.status == CertificateStatus::Revoked {
            info!(certificate_id = %id, "Certificate already revoked");
            self.audit(NewAction {
                certificate_id: id.clone(),
                action: ActionKind::Revoked,
                status: ActionStatus::Success,
                performed_by: Some(requested_by.clone()),
                message: format!("Certificate for {} was already revoked", cert.domain),
                details: ActionDetails::Revoked {
                    domain: cert.domain.clone(),
                    already_revoked: true,
                },
            })
            .await?;
            return Ok(());
        }

        let already_revoked = match self.revoke_at_ca(&cert).await {
            Ok(already) => already,
            Err(e) => {
                self.audit_best_effort(NewAction {
                    certificate_id: id.clone(),
                    action: ActionKind::Revoked,
                    status: ActionStatus::Failed,
                    performed_by: Some(requested_by.clone()),
                    message: format!("Certificate revocation failed: {}", e),
                    details: ActionDetails::failure(e.to_string(), &cert.domain)
                        .with_context("status", cert.status.as_str()),
                })
                .await;
                log_failure(
                    "Certificate revocation failed",
                    &format!("CA did not revoke the certificate for {}", cert.domain),
                    &e,
                    "Retry later, or check that the account which issued it still exists",
                );
                return Err(e);
            }
        };

        self.store
            .update_certificate(
                id,
                CertificateUpdate {
                    status: Some(CertificateStatus::Revoked),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        self.audit(NewAction {
            certificate_id: id.clone(),
            action: ActionKind::Revoked,
            status: ActionStatus::Success,
            performed_by: Some(requested_by.clone()),
            message: format!("Certificate revoked for {}", cert.domain),
            details: ActionDetails::Revoked {
                domain: cert.domain.clone(),
                already_revoked,
            },
        })
        .await?;

        info!(certificate_id = %id, domain = %cert.domain, already_revoked, "Certificate revoked");
        Ok(())
    }

    /// Failed revocation that never reached the CA
    async fn audit_revoke_refused(
        &self,
        id: &CertificateId,
        requested_by: &UserId,
        e: &LifecycleError,
    ) {
        warn!(certificate_id = %id, error = %e, "Certificate revocation refused");
        self.audit_best_effort(NewAction {
            certificate_id: id.clone(),
            action: ActionKind::Revoked,
            status: ActionStatus::Failed,
            performed_by: Some(requested_by.clone()),
            message: format!("Certificate revocation failed: {}", e),
            details: ActionDetails::Failure {
                error: e.to_string(),
                context: Default::default(),
            },
        })
        .await;
    }

    /// Returns whether the CA reported the certificate as already revoked
    async fn revoke_at_ca(&self, cert: &TlsCertificate) -> LifecycleResult<bool> {
        let Some(pem) = cert.certificate_pem.as_deref() else {
            return Err(LifecycleError::InvalidState {
                id: cert.id.clone(),
                operation: "revoked",
                status: cert.status.to_string(),
            });
        };

        let session = self.accounts.session(cert.ca_type, None).await?;
        match session.revoke(pem).await {
            Ok(()) => Ok(false),
            Err(AcmeError::AlreadyRevoked) => {
                debug!(certificate_id = %cert.id, "CA reports certificate already revoked");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Make `id` the certificate served for its domain
    ///
    /// Other active certificates for the same domain are deactivated.
    pub async fn activate_certificate(
        &self,
        id: &CertificateId,
        requested_by: &UserId,
    ) -> LifecycleResult<()> {
        let cert = self.load(id).await?;
        let status = cert.effective_status(Utc::now());
        if status != CertificateStatus::Active {
            return Err(LifecycleError::InvalidState {
                id: id.clone(),
                operation: "activated",
                status: status.to_string(),
            });
        }

        let mut deactivated = Vec::new();
        for other in self.store.list_certificates().await? {
            if other.id != cert.id && other.domain == cert.domain && other.is_active {
                self.store
                    .update_certificate(
                        &other.id,
                        CertificateUpdate {
                            is_active: Some(false),
                            ..Default::default()
                        },
                    )
                    .await?;
                deactivated.push(other.id);
            }
        }

        self.store
            .update_certificate(
                id,
                CertificateUpdate {
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        self.audit(NewAction {
            certificate_id: id.clone(),
            action: ActionKind::Activated,
            status: ActionStatus::Success,
            performed_by: Some(requested_by.clone()),
            message: format!("Certificate activated for {}", cert.domain),
            details: ActionDetails::Activated {
                domain: cert.domain.clone(),
                deactivated: deactivated.clone(),
            },
        })
        .await?;

        info!(
            certificate_id = %id,
            domain = %cert.domain,
            deactivated = deactivated.len(),
            "Certificate activated"
        );
        Ok(())
    }

    // =========================================================================
    // Renewal scan
    // =========================================================================

    /// Renew every active certificate expiring within `days_before_expiry`
    ///
    /// Certificates are processed one at a time and a failure never stops
    /// the scan. Expired challenges are swept afterwards whatever happened.
    pub async fn check_and_renew_expiring(
        &self,
        days_before_expiry: u32,
        email: &str,
        requested_by: &UserId,
        tenant_id: Option<&TenantId>,
    ) -> LifecycleResult<RenewalReport> {
        let scan = self
            .renew_due(days_before_expiry, email, requested_by, tenant_id)
            .await;

        let swept = match self.challenges.sweep_expired().await {
            Ok(swept) => swept,
            Err(e) => {
                warn!(error = %e, "Failed to sweep expired ACME challenges");
                0
            }
        };

        let mut report = scan?;
        report.challenges_swept = swept;
        info!(
            renewed = report.renewed,
            failed = report.errors.len(),
            challenges_swept = swept,
            "Renewal scan finished"
        );
        Ok(report)
    }

    async fn renew_due(
        &self,
        days_before_expiry: u32,
        email: &str,
        requested_by: &UserId,
        tenant_id: Option<&TenantId>,
    ) -> LifecycleResult<RenewalReport> {
        let now = Utc::now();
        let due: Vec<TlsCertificate> = self
            .store
            .list_certificates()
            .await?
            .into_iter()
            .filter(|cert| cert.is_due_for_renewal(now, days_before_expiry))
            .collect();

        info!(
            due = due.len(),
            days_before_expiry,
            "Checking certificates for renewal"
        );

        let mut report = RenewalReport::default();
        for cert in due {
            match self
                .renew_certificate(&cert.id, email, requested_by, tenant_id)
                .await
            {
                Ok(()) => report.renewed += 1,
                Err(e) => {
                    warn!(
                        certificate_id = %cert.id,
                        domain = %cert.domain,
                        error = %e,
                        "Renewal failed, continuing with remaining certificates"
                    );
                    report.errors.push(RenewalFailure {
                        certificate_id: cert.id,
                        domain: cert.domain,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Persist `expired` for active certificates past their expiry
    pub async fn sweep_expired_certificates(&self) -> LifecycleResult<usize> {
        let now = Utc::now();
        let mut expired = 0;
        for cert in self.store.list_certificates().await? {
            if cert.status == CertificateStatus::Active
                && cert.effective_status(now) == CertificateStatus::Expired
            {
                self.store
                    .update_certificate(&cert.id, CertificateUpdate::status(CertificateStatus::Expired))
                    .await?;
                warn!(certificate_id = %cert.id, domain = %cert.domain, "Certificate expired");
                expired += 1;
            }
        }
        Ok(expired)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Certificate without key material, status as of now
    pub async fn get_certificate(&self, id: &CertificateId) -> LifecycleResult<TlsCertificate> {
        let cert = self.load(id).await?;
        Ok(view(&cert, Utc::now()))
    }

    /// All certificates without key material, newest first
    pub async fn list_certificates(&self) -> LifecycleResult<Vec<TlsCertificate>> {
        let now = Utc::now();
        Ok(self
            .store
            .list_certificates()
            .await?
            .iter()
            .map(|cert| view(cert, now))
            .collect())
    }

    /// Audit actions, newest first
    pub async fn get_actions(
        &self,
        certificate_id: Option<&CertificateId>,
        limit: Option<usize>,
    ) -> LifecycleResult<Vec<TlsCertificateAction>> {
        Ok(self
            .store
            .list_actions(certificate_id, limit.unwrap_or(DEFAULT_ACTION_LIMIT))
            .await?)
    }

    /// Remove a certificate and its audit trail
    pub async fn delete_certificate(&self, id: &CertificateId) -> LifecycleResult<()> {
        if !self.store.delete_certificate(id).await? {
            return Err(LifecycleError::NotFound(id.clone()));
        }
        info!(certificate_id = %id, "Certificate deleted");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, id: &CertificateId) -> LifecycleResult<TlsCertificate> {
        self.store
            .get_certificate(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    fn claim(&self, id: &CertificateId) -> LifecycleResult<InFlight<'_>> {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => Err(LifecycleError::Busy(id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlight {
                    map: &self.in_flight,
                    id: id.clone(),
                })
            }
        }
    }

    async fn mark_failed(&self, id: &CertificateId) {
        if let Err(e) = self
            .store
            .update_certificate(id, CertificateUpdate::status(CertificateStatus::Failed))
            .await
        {
            error!(certificate_id = %id, error = %e, "Failed to mark certificate as failed");
        }
    }

    async fn audit(&self, action: NewAction) -> Result<(), StoreError> {
        self.store.create_action(action).await.map(|_| ())
    }

    /// Audit on an error path, where the original error must win
    async fn audit_best_effort(&self, action: NewAction) {
        let certificate_id = action.certificate_id.clone();
        let kind = action.action;
        if let Err(e) = self.store.create_action(action).await {
            error!(
                certificate_id = %certificate_id,
                action = %kind,
                error = %e,
                "Failed to record audit action"
            );
        }
    }
}

impl std::fmt::Debug for CertificateLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateLifecycle")
            .field("options", &self.options)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

/// Marks a certificate as busy until dropped
struct InFlight<'a> {
    map: &'a DashMap<CertificateId, ()>,
    id: CertificateId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

fn view(cert: &TlsCertificate, now: DateTime<Utc>) -> TlsCertificate {
    let mut view = cert.redacted();
    view.status = cert.effective_status(now);
    view
}

/// Lowercase single-name domain; wildcards and lists are rejected
fn normalize_domain(domain: &str) -> LifecycleResult<String> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(LifecycleError::InvalidDomain(domain, "domain is empty"));
    }
    if domain.contains('*') {
        return Err(LifecycleError::InvalidDomain(
            domain,
            "wildcard certificates need DNS-01 validation",
        ));
    }
    if domain.contains(|c: char| c.is_whitespace() || c == ',') {
        return Err(LifecycleError::InvalidDomain(
            domain,
            "only one domain per certificate is supported",
        ));
    }
    Ok(domain)
}

fn log_failure(title: &str, description: &str, cause: &LifecycleError, solution: &str) {
    error!(
        title = %title,
        description = %description,
        cause = %cause,
        solution = %solution,
        "{}",
        title
    );
}
