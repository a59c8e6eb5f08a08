//! Domain model for settings, certificates, audit actions and challenges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use certkeeper_common::{CaEnvironment, CertificateId, TenantId, UserId};

/// Default lead time for the renewal scan
pub const DEFAULT_RENEW_DAYS_BEFORE_EXPIRY: u32 = 30;

// =============================================================================
// Settings
// =============================================================================

/// Installation-wide TLS settings (singleton)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    /// Vault-encrypted credentials of the most recently registered account
    pub account_key_pem: Option<String>,
    pub acme_email: Option<String>,
    pub acme_agreed_to_tos: bool,
    /// Environment of `account_key_pem`
    pub ca_type: CaEnvironment,
    /// Vault-encrypted account credentials, one per CA environment
    #[serde(default)]
    pub account_keys: BTreeMap<CaEnvironment, String>,
    pub auto_renew_enabled: bool,
    pub renew_days_before_expiry: u32,
    pub https_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            account_key_pem: None,
            acme_email: None,
            acme_agreed_to_tos: false,
            ca_type: CaEnvironment::Staging,
            account_keys: BTreeMap::new(),
            auto_renew_enabled: true,
            renew_days_before_expiry: DEFAULT_RENEW_DAYS_BEFORE_EXPIRY,
            https_enabled: false,
            updated_at: Utc::now(),
        }
    }
}

/// Partial settings update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub account_key_pem: Option<String>,
    pub acme_email: Option<String>,
    pub acme_agreed_to_tos: Option<bool>,
    pub ca_type: Option<CaEnvironment>,
    /// Credentials registered against an environment; also becomes the
    /// current `account_key_pem`/`ca_type`
    pub account_key: Option<(CaEnvironment, String)>,
    pub auto_renew_enabled: Option<bool>,
    pub renew_days_before_expiry: Option<u32>,
    pub https_enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut TlsSettings, now: DateTime<Utc>) {
        if let Some(v) = self.account_key_pem {
            settings.account_key_pem = Some(v);
        }
        if let Some(v) = self.acme_email {
            settings.acme_email = Some(v);
        }
        if let Some(v) = self.acme_agreed_to_tos {
            settings.acme_agreed_to_tos = v;
        }
        if let Some(v) = self.ca_type {
            settings.ca_type = v;
        }
        if let Some((environment, key)) = self.account_key {
            settings.account_key_pem = Some(key.clone());
            settings.ca_type = environment;
            settings.account_keys.insert(environment, key);
        }
        if let Some(v) = self.auto_renew_enabled {
            settings.auto_renew_enabled = v;
        }
        if let Some(v) = self.renew_days_before_expiry {
            settings.renew_days_before_expiry = v;
        }
        if let Some(v) = self.https_enabled {
            settings.https_enabled = v;
        }
        settings.updated_at = now;
    }
}

// =============================================================================
// Certificates
// =============================================================================

/// Certificate lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Pending,
    Active,
    Expired,
    Failed,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-domain certificate and its key material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificate {
    pub id: CertificateId,
    pub domain: String,
    pub status: CertificateStatus,
    pub ca_type: CaEnvironment,
    /// Whether this is the certificate currently served for the domain
    pub is_active: bool,
    /// Vault-encrypted private key
    pub private_key_pem: Option<String>,
    pub certificate_pem: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_renewal_at: Option<DateTime<Utc>>,
    pub renewal_attempts: u32,
    pub tenant_id: Option<TenantId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TlsCertificate {
    /// Status as seen at `now`: an active certificate past its expiry reads as expired
    pub fn effective_status(&self, now: DateTime<Utc>) -> CertificateStatus {
        match (self.status, self.expires_at) {
            (CertificateStatus::Active, Some(expires)) if expires <= now => {
                CertificateStatus::Expired
            }
            (status, _) => status,
        }
    }

    /// Whether the renewal scan should pick this certificate
    pub fn is_due_for_renewal(&self, now: DateTime<Utc>, days_before_expiry: u32) -> bool {
        if self.status != CertificateStatus::Active || !self.is_active {
            return false;
        }
        match self.expires_at {
            Some(expires) => expires <= now + Duration::days(i64::from(days_before_expiry)),
            None => false,
        }
    }

    /// Copy safe to hand to a UI: key material removed
    pub fn redacted(&self) -> Self {
        Self {
            private_key_pem: None,
            ..self.clone()
        }
    }
}

/// Fields for a new certificate row
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub domain: String,
    pub status: CertificateStatus,
    pub ca_type: CaEnvironment,
    pub private_key_pem: String,
    pub tenant_id: Option<TenantId>,
    pub created_by: Option<UserId>,
}

impl NewCertificate {
    pub fn into_certificate(self, id: CertificateId, now: DateTime<Utc>) -> TlsCertificate {
        TlsCertificate {
            id,
            domain: self.domain,
            status: self.status,
            ca_type: self.ca_type,
            is_active: false,
            private_key_pem: Some(self.private_key_pem),
            certificate_pem: None,
            issued_at: None,
            expires_at: None,
            last_renewal_at: None,
            renewal_attempts: 0,
            tenant_id: self.tenant_id,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial certificate update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct CertificateUpdate {
    pub status: Option<CertificateStatus>,
    pub is_active: Option<bool>,
    pub private_key_pem: Option<String>,
    pub certificate_pem: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_renewal_at: Option<DateTime<Utc>>,
    pub renewal_attempts: Option<u32>,
}

impl CertificateUpdate {
    pub fn status(status: CertificateStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(self, cert: &mut TlsCertificate, now: DateTime<Utc>) {
        if let Some(v) = self.status {
            cert.status = v;
        }
        if let Some(v) = self.is_active {
            cert.is_active = v;
        }
        if let Some(v) = self.private_key_pem {
            cert.private_key_pem = Some(v);
        }
        if let Some(v) = self.certificate_pem {
            cert.certificate_pem = Some(v);
        }
        if let Some(v) = self.issued_at {
            cert.issued_at = Some(v);
        }
        if let Some(v) = self.expires_at {
            cert.expires_at = Some(v);
        }
        if let Some(v) = self.last_renewal_at {
            cert.last_renewal_at = Some(v);
        }
        if let Some(v) = self.renewal_attempts {
            cert.renewal_attempts = v;
        }
        cert.updated_at = now;
    }
}

// =============================================================================
// Audit actions
// =============================================================================

/// What a lifecycle step attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Requested,
    Issued,
    Renewed,
    Revoked,
    Activated,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::Issued => "issued",
            Self::Renewed => "renewed",
            Self::Revoked => "revoked",
            Self::Activated => "activated",
        };
        f.write_str(s)
    }
}

/// Outcome recorded for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
}

/// Domain validation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
}

/// Structured payload per action kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionDetails {
    #[serde(rename_all = "camelCase")]
    Requested {
        domain: String,
        challenge_type: ChallengeType,
        ca_type: CaEnvironment,
    },
    #[serde(rename_all = "camelCase")]
    Issued {
        domain: String,
        expires_at: DateTime<Utc>,
    },
    /// Renewal order started
    RenewalStarted { domain: String, attempt: u32 },
    #[serde(rename_all = "camelCase")]
    Renewed {
        domain: String,
        expires_at: DateTime<Utc>,
        attempt: u32,
    },
    #[serde(rename_all = "camelCase")]
    Revoked {
        domain: String,
        already_revoked: bool,
    },
    #[serde(rename_all = "camelCase")]
    Activated {
        domain: String,
        deactivated: Vec<CertificateId>,
    },
    /// Free-form diagnostics for a failed step
    Failure {
        error: String,
        context: BTreeMap<String, String>,
    },
}

impl ActionDetails {
    /// Failure details with `domain` recorded as context
    pub fn failure(error: impl Into<String>, domain: &str) -> Self {
        let mut context = BTreeMap::new();
        context.insert("domain".to_string(), domain.to_string());
        Self::Failure {
            error: error.into(),
            context,
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        if let Self::Failure { context, .. } = &mut self {
            context.insert(key.to_string(), value.into());
        }
        self
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificateAction {
    pub id: String,
    pub certificate_id: CertificateId,
    pub action: ActionKind,
    pub status: ActionStatus,
    pub performed_by: Option<UserId>,
    pub message: String,
    pub details: ActionDetails,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new audit action
#[derive(Debug, Clone)]
pub struct NewAction {
    pub certificate_id: CertificateId,
    pub action: ActionKind,
    pub status: ActionStatus,
    pub performed_by: Option<UserId>,
    pub message: String,
    pub details: ActionDetails,
}

impl NewAction {
    pub fn into_action(self, now: DateTime<Utc>) -> TlsCertificateAction {
        TlsCertificateAction {
            id: uuid::Uuid::new_v4().to_string(),
            certificate_id: self.certificate_id,
            action: self.action,
            status: self.status,
            performed_by: self.performed_by,
            message: self.message,
            details: self.details,
            created_at: now,
        }
    }
}

// =============================================================================
// Challenges
// =============================================================================

/// Stored HTTP-01 challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsChallenge {
    pub token: String,
    pub key_authorization: String,
    pub domain: String,
    pub tenant_id: Option<TenantId>,
    pub expires_at: DateTime<Utc>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl TlsChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Fields for a new challenge
#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub token: String,
    pub key_authorization: String,
    pub domain: String,
    pub tenant_id: Option<TenantId>,
    pub expires_at: DateTime<Utc>,
}

impl NewChallenge {
    pub fn into_challenge(self, now: DateTime<Utc>) -> TlsChallenge {
        TlsChallenge {
            token: self.token,
            key_authorization: self.key_authorization,
            domain: self.domain,
            tenant_id: self.tenant_id,
            expires_at: self.expires_at,
            completed: false,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate(status: CertificateStatus, expires_in_days: Option<i64>) -> TlsCertificate {
        let now = Utc::now();
        let mut cert = NewCertificate {
            domain: "example.com".to_string(),
            status,
            ca_type: CaEnvironment::Staging,
            private_key_pem: "encrypted".to_string(),
            tenant_id: None,
            created_by: None,
        }
        .into_certificate(CertificateId::new(), now);
        cert.is_active = true;
        cert.expires_at = expires_in_days.map(|d| now + Duration::days(d));
        cert
    }

    #[test]
    fn test_effective_status_expired() {
        let now = Utc::now();
        let cert = certificate(CertificateStatus::Active, Some(-1));
        assert_eq!(cert.effective_status(now), CertificateStatus::Expired);

        let cert = certificate(CertificateStatus::Active, Some(5));
        assert_eq!(cert.effective_status(now), CertificateStatus::Active);

        // Terminal states are never rewritten
        let cert = certificate(CertificateStatus::Revoked, Some(-1));
        assert_eq!(cert.effective_status(now), CertificateStatus::Revoked);
    }

    #[test]
    fn test_renewal_due_window() {
        let now = Utc::now();
        assert!(certificate(CertificateStatus::Active, Some(10)).is_due_for_renewal(now, 30));
        assert!(!certificate(CertificateStatus::Active, Some(60)).is_due_for_renewal(now, 30));
        assert!(!certificate(CertificateStatus::Active, None).is_due_for_renewal(now, 30));
        assert!(!certificate(CertificateStatus::Failed, Some(10)).is_due_for_renewal(now, 30));

        let mut inactive = certificate(CertificateStatus::Active, Some(10));
        inactive.is_active = false;
        assert!(!inactive.is_due_for_renewal(now, 30));
    }

    #[test]
    fn test_redacted_drops_key() {
        let cert = certificate(CertificateStatus::Active, Some(10));
        assert!(cert.private_key_pem.is_some());
        assert!(cert.redacted().private_key_pem.is_none());
    }

    #[test]
    fn test_certificate_update_apply() {
        let mut cert = certificate(CertificateStatus::Pending, None);
        let now = Utc::now();
        CertificateUpdate {
            status: Some(CertificateStatus::Active),
            renewal_attempts: Some(2),
            ..Default::default()
        }
        .apply(&mut cert, now);

        assert_eq!(cert.status, CertificateStatus::Active);
        assert_eq!(cert.renewal_attempts, 2);
        assert_eq!(cert.private_key_pem.as_deref(), Some("encrypted"));
        assert_eq!(cert.updated_at, now);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = TlsSettings::default();
        assert!(settings.auto_renew_enabled);
        assert!(!settings.https_enabled);
        assert!(!settings.acme_agreed_to_tos);
        assert_eq!(settings.renew_days_before_expiry, 30);
        assert_eq!(settings.ca_type, CaEnvironment::Staging);
    }

    #[test]
    fn test_account_keys_kept_per_environment() {
        let mut settings = TlsSettings::default();
        let now = Utc::now();
        SettingsUpdate {
            account_key: Some((CaEnvironment::Staging, "staging-key".to_string())),
            ..Default::default()
        }
        .apply(&mut settings, now);
        SettingsUpdate {
            account_key: Some((CaEnvironment::Production, "production-key".to_string())),
            ..Default::default()
        }
        .apply(&mut settings, now);

        assert_eq!(settings.account_keys.len(), 2);
        assert_eq!(
            settings.account_keys.get(&CaEnvironment::Staging).map(String::as_str),
            Some("staging-key")
        );
        assert_eq!(settings.account_key_pem.as_deref(), Some("production-key"));
        assert_eq!(settings.ca_type, CaEnvironment::Production);

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["accountKeys"]["production"], "production-key");
    }

    #[test]
    fn test_settings_without_account_keys_deserialize() {
        let mut json = serde_json::to_value(TlsSettings::default()).unwrap();
        json.as_object_mut().unwrap().remove("accountKeys");
        let settings: TlsSettings = serde_json::from_value(json).unwrap();
        assert!(settings.account_keys.is_empty());
    }

    #[test]
    fn test_action_details_tagged() {
        let details = ActionDetails::Requested {
            domain: "example.com".to_string(),
            challenge_type: ChallengeType::Http01,
            ca_type: CaEnvironment::Staging,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "requested");
        assert_eq!(json["challengeType"], "http-01");

        let failure = ActionDetails::failure("boom", "example.com").with_context("step", "order");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["type"], "failure");
        assert_eq!(json["context"]["domain"], "example.com");
        assert_eq!(json["context"]["step"], "order");
    }
}
