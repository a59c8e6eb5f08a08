//! Persistence for settings, certificates, audit actions and challenges.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use certkeeper_common::CertificateId;

use crate::errors::StoreError;
use crate::models::{
    CertificateUpdate, NewAction, NewCertificate, NewChallenge, SettingsUpdate, TlsCertificate,
    TlsCertificateAction, TlsChallenge, TlsSettings,
};

/// Default page size when listing audit actions
pub const DEFAULT_ACTION_LIMIT: usize = 100;

/// Storage backend used by the lifecycle engine.
///
/// Implementations must be safe to share across tasks. Lists are returned
/// newest first.
#[async_trait]
pub trait TlsStore: Send + Sync {
    /// Current settings, if any were ever written.
    async fn get_settings(&self) -> Result<Option<TlsSettings>, StoreError>;

    /// Upsert settings, creating the singleton with defaults when absent.
    async fn update_settings(&self, update: SettingsUpdate) -> Result<TlsSettings, StoreError>;

    async fn create_certificate(&self, new: NewCertificate) -> Result<TlsCertificate, StoreError>;

    async fn get_certificate(
        &self,
        id: &CertificateId,
    ) -> Result<Option<TlsCertificate>, StoreError>;

    async fn update_certificate(
        &self,
        id: &CertificateId,
        update: CertificateUpdate,
    ) -> Result<TlsCertificate, StoreError>;

    async fn list_certificates(&self) -> Result<Vec<TlsCertificate>, StoreError>;

    /// Delete a certificate together with its audit actions.
    ///
    /// Returns whether the certificate existed.
    async fn delete_certificate(&self, id: &CertificateId) -> Result<bool, StoreError>;

    async fn create_action(&self, new: NewAction) -> Result<TlsCertificateAction, StoreError>;

    /// Audit actions, optionally filtered by certificate.
    async fn list_actions(
        &self,
        certificate_id: Option<&CertificateId>,
        limit: usize,
    ) -> Result<Vec<TlsCertificateAction>, StoreError>;

    async fn create_challenge(&self, new: NewChallenge) -> Result<TlsChallenge, StoreError>;

    /// Unexpired challenge for `token`.
    async fn get_challenge_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TlsChallenge>, StoreError>;

    async fn complete_challenge(&self, token: &str) -> Result<(), StoreError>;

    /// Remove challenges that expired before `now`, completed or not.
    async fn cleanup_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
