//! Integration tests for the certificate lifecycle
//!
//! Runs the engine against an in-memory store and a scripted ACME CA.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use http::StatusCode;
use tokio::sync::Notify;

use certkeeper_common::{CaEnvironment, CertificateId, UserId};
use certkeeper_config::AcmeConfig;
use certkeeper_engine::acme::{
    AccountKey, AcmeConnector, AcmeError, AcmeSession, ChallengeBridge, Http01Challenge,
    OrderHandle, ACME_CHALLENGE_PREFIX,
};
use certkeeper_engine::models::{CertificateUpdate, SettingsUpdate};
use certkeeper_engine::{
    ActionDetails, ActionKind, ActionStatus, CertificateLifecycle, CertificateRequest,
    CertificateStatus, LifecycleError, MemoryStore, RenewalScheduler, SecretVault, TlsStore,
};

const EMAIL: &str = "admin@example.com";

// ============================================================================
// Scripted CA
// ============================================================================

#[derive(Default)]
struct MockState {
    registrations: AtomicUsize,
    connects: AtomicUsize,
    orders: AtomicUsize,
    revocations: AtomicUsize,
    failing_domains: Mutex<HashSet<String>>,
    already_revoked: AtomicBool,
    garbage_chain: AtomicBool,
    /// Whether the challenge responder served the key authorization when
    /// the CA was told to validate
    served_at_verify: Mutex<Vec<bool>>,
    /// Next validation waits on this until notified
    hold_validation: Mutex<Option<Arc<Notify>>>,
    validation_entered: Notify,
}

impl MockState {
    fn fail_domain(&self, domain: &str) {
        self.failing_domains
            .lock()
            .unwrap()
            .insert(domain.to_string());
    }
}

struct MockConnector {
    state: Arc<MockState>,
    responder: ChallengeBridge,
}

#[async_trait]
impl AcmeConnector for MockConnector {
    async fn register_account(
        &self,
        directory_url: &str,
        email: &str,
    ) -> Result<AccountKey, AcmeError> {
        let n = self.state.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(AccountKey::new(format!(
            r#"{{"directory":"{}","contact":"{}","n":{}}}"#,
            directory_url, email, n
        )))
    }

    async fn connect(
        &self,
        _directory_url: &str,
        _key: &AccountKey,
    ) -> Result<Arc<dyn AcmeSession>, AcmeError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            state: self.state.clone(),
            responder: self.responder.clone(),
            orders: Mutex::new(HashMap::new()),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    responder: ChallengeBridge,
    orders: Mutex<HashMap<OrderHandle, String>>,
}

impl MockSession {
    fn domain_of(&self, order: &OrderHandle) -> Result<String, AcmeError> {
        self.orders
            .lock()
            .unwrap()
            .get(order)
            .cloned()
            .ok_or_else(|| AcmeError::UnknownOrder(order.as_str().to_string()))
    }
}

#[async_trait]
impl AcmeSession for MockSession {
    async fn new_order(&self, domain: &str) -> Result<OrderHandle, AcmeError> {
        let n = self.state.orders.fetch_add(1, Ordering::SeqCst);
        let handle = OrderHandle::new(format!("order-{}", n));
        self.orders
            .lock()
            .unwrap()
            .insert(handle.clone(), domain.to_string());
        Ok(handle)
    }

    async fn http01_challenges(
        &self,
        order: &OrderHandle,
    ) -> Result<Vec<Http01Challenge>, AcmeError> {
        let domain = self.domain_of(order)?;
        let token = format!("token-{}", order.as_str());
        Ok(vec![Http01Challenge {
            domain,
            key_authorization: format!("{}.thumbprint", token),
            url: format!("https://ca.test/chall/{}", order.as_str()),
            token,
        }])
    }

    async fn verify_challenge(
        &self,
        _order: &OrderHandle,
        challenge: &Http01Challenge,
    ) -> Result<(), AcmeError> {
        let path = format!("{}{}", ACME_CHALLENGE_PREFIX, challenge.token);
        let response = self.responder.respond(&path).await;
        let served = response.status() == StatusCode::OK
            && response.body() == &challenge.key_authorization;
        self.state.served_at_verify.lock().unwrap().push(served);

        if self
            .state
            .failing_domains
            .lock()
            .unwrap()
            .contains(&challenge.domain)
        {
            return Err(AcmeError::ChallengeValidation {
                domain: challenge.domain.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn wait_for_valid(
        &self,
        _order: &OrderHandle,
        _timeout: Duration,
    ) -> Result<(), AcmeError> {
        let hold = self.state.hold_validation.lock().unwrap().take();
        if let Some(gate) = hold {
            self.state.validation_entered.notify_one();
            gate.notified().await;
        }
        Ok(())
    }

    async fn finalize(&self, order: &OrderHandle, csr_der: &[u8]) -> Result<String, AcmeError> {
        assert!(!csr_der.is_empty());
        if self.state.garbage_chain.load(Ordering::SeqCst) {
            return Ok("not a certificate".to_string());
        }

        let domain = self.domain_of(order)?;
        let key = rcgen::KeyPair::generate()
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;
        let mut params = rcgen::CertificateParams::new(vec![domain])
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;
        params.not_after = rcgen::date_time_ymd(2031, 3, 14);
        let cert = params
            .self_signed(&key)
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;
        Ok(cert.pem())
    }

    async fn revoke(&self, _certificate_pem: &str) -> Result<(), AcmeError> {
        if self.state.already_revoked.load(Ordering::SeqCst) {
            return Err(AcmeError::AlreadyRevoked);
        }
        self.state.revocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    state: Arc<MockState>,
    lifecycle: Arc<CertificateLifecycle>,
    admin: UserId,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(MockState::default());
    let connector = MockConnector {
        state: state.clone(),
        responder: ChallengeBridge::new(store.clone()),
    };
    let lifecycle = CertificateLifecycle::new(
        store.clone(),
        Arc::new(SecretVault::from_secret("test-secret", 1_000)),
        Arc::new(connector),
        AcmeConfig::default(),
    );

    Harness {
        store,
        state,
        lifecycle: Arc::new(lifecycle),
        admin: UserId::new("admin"),
    }
}

impl Harness {
    fn request(&self, domain: &str) -> CertificateRequest {
        CertificateRequest {
            domain: domain.to_string(),
            email: EMAIL.to_string(),
            requested_by: self.admin.clone(),
            use_production: false,
            tenant_id: None,
        }
    }

    async fn issue(&self, domain: &str) -> CertificateId {
        self.lifecycle
            .request_certificate(self.request(domain))
            .await
            .unwrap()
    }

    async fn expire_in(&self, id: &CertificateId, days: i64) {
        self.store
            .update_certificate(
                id,
                CertificateUpdate {
                    expires_at: Some(Utc::now() + ChronoDuration::days(days)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    async fn raw(&self, id: &CertificateId) -> certkeeper_engine::TlsCertificate {
        self.store.get_certificate(id).await.unwrap().unwrap()
    }
}

// ============================================================================
// Issuance
// ============================================================================

mod issuance {
    use super::*;

    #[tokio::test]
    async fn test_fresh_issuance() {
        let h = harness();
        let id = h.issue("example.com").await;

        let cert = h.lifecycle.get_certificate(&id).await.unwrap();
        assert_eq!(cert.domain, "example.com");
        assert_eq!(cert.status, CertificateStatus::Active);
        assert!(cert.is_active);
        assert_eq!(cert.ca_type, CaEnvironment::Staging);
        assert!(cert.certificate_pem.unwrap().contains("BEGIN CERTIFICATE"));
        assert!(cert.issued_at.is_some());
        assert_eq!(cert.expires_at.unwrap().year(), 2031);
        // Views never carry key material
        assert!(cert.private_key_pem.is_none());

        let raw = h.raw(&id).await;
        let key = raw.private_key_pem.unwrap();
        assert!(SecretVault::is_portable_encrypted(&key));
        assert!(!key.contains("PRIVATE KEY"));

        let actions = h.lifecycle.get_actions(Some(&id), None).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, ActionKind::Issued);
        assert_eq!(actions[0].status, ActionStatus::Success);
        assert_eq!(actions[1].action, ActionKind::Requested);
        assert_eq!(actions[1].status, ActionStatus::Pending);
        assert_eq!(actions[1].performed_by.as_ref(), Some(&h.admin));

        assert_eq!(*h.state.served_at_verify.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_account_reused_across_requests() {
        let h = harness();
        h.issue("a.example.com").await;
        h.issue("b.example.com").await;

        assert_eq!(h.state.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(h.state.connects.load(Ordering::SeqCst), 1);

        let settings = h.lifecycle.settings().get_settings().await.unwrap();
        assert!(settings.acme_agreed_to_tos);
        assert_eq!(settings.acme_email.as_deref(), Some(EMAIL));
    }

    #[tokio::test]
    async fn test_challenge_failure_never_reaches_active() {
        let h = harness();
        h.state.fail_domain("bad.example.com");

        let result = h
            .lifecycle
            .request_certificate(h.request("bad.example.com"))
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::Protocol(AcmeError::ChallengeValidation { .. }))
        ));

        let certs = h.lifecycle.list_certificates().await.unwrap();
        assert_eq!(certs.len(), 1);
        let cert = &certs[0];
        assert_eq!(cert.status, CertificateStatus::Failed);
        assert!(!cert.is_active);
        assert!(cert.certificate_pem.is_none());

        let actions = h.lifecycle.get_actions(Some(&cert.id), None).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, ActionKind::Requested);
        assert_eq!(actions[0].status, ActionStatus::Failed);
        assert!(matches!(actions[0].details, ActionDetails::Failure { .. }));
        assert!(actions
            .iter()
            .all(|a| a.action != ActionKind::Issued));
    }

    #[tokio::test]
    async fn test_unparseable_chain_falls_back_to_default_validity() {
        let h = harness();
        h.state.garbage_chain.store(true, Ordering::SeqCst);

        let id = h.issue("example.com").await;
        let expires = h.raw(&id).await.expires_at.unwrap();
        let days = (expires - Utc::now()).num_days();
        assert!((89..=90).contains(&days), "got {} days", days);
    }

    #[tokio::test]
    async fn test_wildcard_rejected_without_row() {
        let h = harness();
        let result = h
            .lifecycle
            .request_certificate(h.request("*.example.com"))
            .await;

        assert!(matches!(result, Err(LifecycleError::InvalidDomain(_, _))));
        assert!(h.lifecycle.list_certificates().await.unwrap().is_empty());
        assert_eq!(h.state.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_production_flag_selects_environment() {
        let h = harness();
        let mut request = h.request("example.com");
        request.use_production = true;

        let id = h.lifecycle.request_certificate(request).await.unwrap();
        assert_eq!(h.raw(&id).await.ca_type, CaEnvironment::Production);
    }

    #[tokio::test]
    async fn test_one_account_per_environment() {
        let h = harness();
        let staging = h.issue("staging.example.com").await;
        let mut request = h.request("prod.example.com");
        request.use_production = true;
        let production = h.lifecycle.request_certificate(request).await.unwrap();

        for id in [&staging, &production, &staging] {
            h.lifecycle
                .renew_certificate(id, EMAIL, &h.admin, None)
                .await
                .unwrap();
        }
        h.lifecycle
            .revoke_certificate(&production, &h.admin)
            .await
            .unwrap();

        assert_eq!(h.state.registrations.load(Ordering::SeqCst), 2);
        let settings = h.lifecycle.settings().get_settings().await.unwrap();
        assert_eq!(settings.account_keys.len(), 2);
    }
}

// ============================================================================
// Revocation
// ============================================================================

mod revocation {
    use super::*;

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let h = harness();
        let id = h.issue("example.com").await;

        h.lifecycle.revoke_certificate(&id, &h.admin).await.unwrap();
        h.lifecycle.revoke_certificate(&id, &h.admin).await.unwrap();

        let cert = h.raw(&id).await;
        assert_eq!(cert.status, CertificateStatus::Revoked);
        assert!(!cert.is_active);
        assert_eq!(h.state.revocations.load(Ordering::SeqCst), 1);

        let revoked: Vec<_> = h
            .lifecycle
            .get_actions(Some(&id), None)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.action == ActionKind::Revoked)
            .collect();
        assert_eq!(revoked.len(), 2);
        assert!(revoked.iter().all(|a| a.status == ActionStatus::Success));
        assert!(matches!(
            revoked[0].details,
            ActionDetails::Revoked {
                already_revoked: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ca_already_revoked_counts_as_success() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.state.already_revoked.store(true, Ordering::SeqCst);

        h.lifecycle.revoke_certificate(&id, &h.admin).await.unwrap();
        assert_eq!(h.raw(&id).await.status, CertificateStatus::Revoked);
    }

    #[tokio::test]
    async fn test_revoke_without_certificate_is_invalid_state() {
        let h = harness();
        h.state.fail_domain("example.com");
        let _ = h
            .lifecycle
            .request_certificate(h.request("example.com"))
            .await;
        let id = h.lifecycle.list_certificates().await.unwrap()[0].id.clone();

        let result = h.lifecycle.revoke_certificate(&id, &h.admin).await;
        assert!(matches!(result, Err(LifecycleError::InvalidState { .. })));
        assert_eq!(h.raw(&id).await.status, CertificateStatus::Failed);
    }

    #[tokio::test]
    async fn test_operations_on_busy_certificate_refused() {
        let h = harness();
        let id = h.issue("example.com").await;
        let gate = Arc::new(Notify::new());
        *h.state.hold_validation.lock().unwrap() = Some(gate.clone());

        let renewal = h.lifecycle.renew_certificate(&id, EMAIL, &h.admin, None);
        let contender = async {
            h.state.validation_entered.notified().await;
            let renew = h
                .lifecycle
                .renew_certificate(&id, EMAIL, &h.admin, None)
                .await;
            let revoke = h.lifecycle.revoke_certificate(&id, &h.admin).await;
            gate.notify_one();
            (renew, revoke)
        };
        let (renewal, (renew, revoke)) = tokio::join!(renewal, contender);

        renewal.unwrap();
        assert!(matches!(renew, Err(LifecycleError::Busy(_))));
        assert!(matches!(revoke, Err(LifecycleError::Busy(_))));
        assert_eq!(h.state.revocations.load(Ordering::SeqCst), 0);

        let refused: Vec<_> = h
            .lifecycle
            .get_actions(Some(&id), None)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.action == ActionKind::Revoked)
            .collect();
        assert_eq!(refused.len(), 1);
        assert_eq!(refused[0].status, ActionStatus::Failed);

        // Guard released once the renewal finished
        h.lifecycle.revoke_certificate(&id, &h.admin).await.unwrap();
        assert_eq!(h.raw(&id).await.status, CertificateStatus::Revoked);
    }

    #[tokio::test]
    async fn test_revoke_unknown_certificate() {
        let h = harness();
        let result = h
            .lifecycle
            .revoke_certificate(&CertificateId::from_string("missing"), &h.admin)
            .await;
        assert!(matches!(result, Err(LifecycleError::NotFound(_))));
    }
}

// ============================================================================
// Renewal
// ============================================================================

mod renewal {
    use super::*;

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let h = harness();
        let a = h.issue("a.example.com").await;
        let b = h.issue("b.example.com").await;
        let c = h.issue("c.example.com").await;
        for id in [&a, &b, &c] {
            h.expire_in(id, 10).await;
        }
        h.state.fail_domain("b.example.com");

        let report = h
            .lifecycle
            .check_and_renew_expiring(30, EMAIL, &h.admin, None)
            .await
            .unwrap();

        assert_eq!(report.renewed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].domain, "b.example.com");
        assert_eq!(report.errors[0].certificate_id, b);

        for id in [&a, &c] {
            let cert = h.raw(id).await;
            assert_eq!(cert.status, CertificateStatus::Active);
            assert_eq!(cert.renewal_attempts, 1);
            assert!(cert.last_renewal_at.is_some());
            assert_eq!(cert.expires_at.unwrap().year(), 2031);
        }

        let failed = h.raw(&b).await;
        assert_eq!(failed.status, CertificateStatus::Failed);
        assert_eq!(failed.renewal_attempts, 1);

        let actions = h.lifecycle.get_actions(Some(&b), Some(1)).await.unwrap();
        let newest = &actions[0];
        assert_eq!(newest.action, ActionKind::Renewed);
        assert_eq!(newest.status, ActionStatus::Failed);
        assert!(!newest.message.is_empty());
        match &newest.details {
            ActionDetails::Failure { error, context } => {
                assert!(error.contains("connection refused"), "got {}", error);
                assert_eq!(context.get("attempt").map(String::as_str), Some("1"));
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_certificates_inside_window() {
        let h = harness();
        let soon = h.issue("soon.example.com").await;
        let later = h.issue("later.example.com").await;
        h.expire_in(&soon, 10).await;
        h.expire_in(&later, 60).await;

        let report = h
            .lifecycle
            .check_and_renew_expiring(30, EMAIL, &h.admin, None)
            .await
            .unwrap();

        assert_eq!(report.renewed, 1);
        assert!(report.errors.is_empty());
        assert_eq!(h.raw(&soon).await.renewal_attempts, 1);
        assert_eq!(h.raw(&later).await.renewal_attempts, 0);
    }

    #[tokio::test]
    async fn test_renewal_keeps_private_key() {
        let h = harness();
        let id = h.issue("example.com").await;
        let key_before = h.raw(&id).await.private_key_pem;

        h.lifecycle
            .renew_certificate(&id, EMAIL, &h.admin, None)
            .await
            .unwrap();

        let cert = h.raw(&id).await;
        assert_eq!(cert.private_key_pem, key_before);
        assert_eq!(cert.status, CertificateStatus::Active);

        let actions = h.lifecycle.get_actions(Some(&id), None).await.unwrap();
        assert_eq!(actions[0].action, ActionKind::Renewed);
        assert_eq!(actions[0].status, ActionStatus::Success);
        assert!(matches!(
            actions[0].details,
            ActionDetails::Renewed { attempt: 1, .. }
        ));
        assert_eq!(actions[1].action, ActionKind::Renewed);
        assert_eq!(actions[1].status, ActionStatus::Pending);
        assert!(matches!(
            &actions[1].details,
            ActionDetails::RenewalStarted { domain, attempt: 1 } if domain == "example.com"
        ));
    }

    #[tokio::test]
    async fn test_renewing_revoked_certificate_refused() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.lifecycle.revoke_certificate(&id, &h.admin).await.unwrap();
        let orders = h.state.orders.load(Ordering::SeqCst);

        let result = h
            .lifecycle
            .renew_certificate(&id, EMAIL, &h.admin, None)
            .await;

        assert!(matches!(result, Err(LifecycleError::Revoked(_))));
        assert_eq!(h.state.orders.load(Ordering::SeqCst), orders);
        assert_eq!(h.raw(&id).await.status, CertificateStatus::Revoked);
    }

    #[tokio::test]
    async fn test_expired_challenges_swept_after_scan() {
        let h = harness();
        h.lifecycle
            .challenges()
            .store_challenge_with_ttl(
                "stale",
                "stale.thumbprint",
                "example.com",
                None,
                ChronoDuration::seconds(-30),
            )
            .await
            .unwrap();

        let report = h
            .lifecycle
            .check_and_renew_expiring(30, EMAIL, &h.admin, None)
            .await
            .unwrap();

        assert_eq!(report.challenges_swept, 1);
        assert_eq!(h.store.challenge_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_sweep() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.expire_in(&id, -1).await;

        // Read-time view already reports the lapse
        let view = h.lifecycle.get_certificate(&id).await.unwrap();
        assert_eq!(view.status, CertificateStatus::Expired);
        assert_eq!(h.raw(&id).await.status, CertificateStatus::Active);

        assert_eq!(h.lifecycle.sweep_expired_certificates().await.unwrap(), 1);
        assert_eq!(h.raw(&id).await.status, CertificateStatus::Expired);
        assert_eq!(h.lifecycle.sweep_expired_certificates().await.unwrap(), 0);
    }
}

// ============================================================================
// Activation and deletion
// ============================================================================

mod activation {
    use super::*;

    #[tokio::test]
    async fn test_activation_deactivates_siblings() {
        let h = harness();
        let first = h.issue("example.com").await;
        let second = h.issue("example.com").await;
        let other = h.issue("other.example.com").await;

        h.lifecycle
            .activate_certificate(&first, &h.admin)
            .await
            .unwrap();

        assert!(h.raw(&first).await.is_active);
        assert!(!h.raw(&second).await.is_active);
        assert!(h.raw(&other).await.is_active);

        let actions = h.lifecycle.get_actions(Some(&first), Some(1)).await.unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0].details {
            ActionDetails::Activated { deactivated, .. } => {
                assert_eq!(deactivated, &vec![second.clone()])
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_certificate_cannot_be_activated() {
        let h = harness();
        h.state.fail_domain("example.com");
        let _ = h
            .lifecycle
            .request_certificate(h.request("example.com"))
            .await;
        let id = h.lifecycle.list_certificates().await.unwrap()[0].id.clone();

        let result = h.lifecycle.activate_certificate(&id, &h.admin).await;
        assert!(matches!(result, Err(LifecycleError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_delete_removes_certificate_and_actions() {
        let h = harness();
        let id = h.issue("example.com").await;

        h.lifecycle.delete_certificate(&id).await.unwrap();
        assert!(h.store.get_certificate(&id).await.unwrap().is_none());
        assert!(h
            .lifecycle
            .get_actions(Some(&id), None)
            .await
            .unwrap()
            .is_empty());

        let again = h.lifecycle.delete_certificate(&id).await;
        assert!(matches!(again, Err(LifecycleError::NotFound(_))));
    }
}

// ============================================================================
// Scheduler
// ============================================================================

mod scheduler {
    use super::*;

    #[tokio::test]
    async fn test_skips_renewal_when_disabled() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.expire_in(&id, 5).await;
        h.lifecycle
            .settings()
            .update_settings(SettingsUpdate {
                auto_renew_enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        let scheduler = RenewalScheduler::new(h.lifecycle.clone(), UserId::new("system"));
        assert_eq!(scheduler.run_once().await.unwrap(), None);
        assert_eq!(h.raw(&id).await.renewal_attempts, 0);
    }

    #[tokio::test]
    async fn test_renews_with_stored_email_and_system_user() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.expire_in(&id, 5).await;

        let scheduler = RenewalScheduler::new(h.lifecycle.clone(), UserId::new("system"));
        let report = scheduler.run_once().await.unwrap().unwrap();
        assert_eq!(report.renewed, 1);

        let actions = h.lifecycle.get_actions(Some(&id), Some(1)).await.unwrap();
        assert_eq!(actions[0].action, ActionKind::Renewed);
        assert_eq!(actions[0].performed_by, Some(UserId::new("system")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_checks_after_initial_delay() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.expire_in(&id, 5).await;

        let early = RenewalScheduler::new(h.lifecycle.clone(), UserId::new("system"));
        let stopped = tokio::time::timeout(Duration::from_secs(5), early.run()).await;
        assert!(stopped.is_err());
        assert_eq!(h.raw(&id).await.renewal_attempts, 0);

        let scheduler = RenewalScheduler::new(h.lifecycle.clone(), UserId::new("system"));
        let stopped = tokio::time::timeout(Duration::from_secs(11), scheduler.run()).await;
        assert!(stopped.is_err());
        let cert = h.raw(&id).await;
        assert_eq!(cert.renewal_attempts, 1);
        assert_eq!(cert.status, CertificateStatus::Active);
    }

    #[tokio::test]
    async fn test_honours_stored_renewal_window() {
        let h = harness();
        let id = h.issue("example.com").await;
        h.expire_in(&id, 20).await;
        h.lifecycle
            .settings()
            .update_settings(SettingsUpdate {
                renew_days_before_expiry: Some(14),
                ..Default::default()
            })
            .await
            .unwrap();

        let scheduler = RenewalScheduler::new(h.lifecycle.clone(), UserId::new("system"));
        let report = scheduler.run_once().await.unwrap().unwrap();
        assert_eq!(report.renewed, 0);
    }
}
