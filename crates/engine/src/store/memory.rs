//! In-memory store backed by concurrent maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use certkeeper_common::CertificateId;

use crate::errors::StoreError;
use crate::models::{
    CertificateUpdate, NewAction, NewCertificate, NewChallenge, SettingsUpdate, TlsCertificate,
    TlsCertificateAction, TlsChallenge, TlsSettings,
};
use crate::store::TlsStore;

/// Volatile store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: RwLock<Option<TlsSettings>>,
    certificates: DashMap<CertificateId, TlsCertificate>,
    /// Append-only, oldest first
    actions: RwLock<Vec<TlsCertificateAction>>,
    challenges: DashMap<String, TlsChallenge>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored challenges, expired ones included
    pub fn challenge_count(&self) -> usize {
        self.challenges.len()
    }
}

#[async_trait]
impl TlsStore for MemoryStore {
    async fn get_settings(&self) -> Result<Option<TlsSettings>, StoreError> {
        Ok(self.settings.read().clone())
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<TlsSettings, StoreError> {
        let mut guard = self.settings.write();
        let settings = guard.get_or_insert_with(TlsSettings::default);
        update.apply(settings, Utc::now());
        Ok(settings.clone())
    }

    async fn create_certificate(&self, new: NewCertificate) -> Result<TlsCertificate, StoreError> {
        let cert = new.into_certificate(CertificateId::new(), Utc::now());
        self.certificates.insert(cert.id.clone(), cert.clone());
        Ok(cert)
    }

    async fn get_certificate(
        &self,
        id: &CertificateId,
    ) -> Result<Option<TlsCertificate>, StoreError> {
        Ok(self.certificates.get(id).map(|c| c.clone()))
    }

    async fn update_certificate(
        &self,
        id: &CertificateId,
        update: CertificateUpdate,
    ) -> Result<TlsCertificate, StoreError> {
        let mut entry = self
            .certificates
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "certificate",
                id: id.to_string(),
            })?;
        update.apply(entry.value_mut(), Utc::now());
        Ok(entry.clone())
    }

    async fn list_certificates(&self) -> Result<Vec<TlsCertificate>, StoreError> {
        let mut certs: Vec<TlsCertificate> =
            self.certificates.iter().map(|c| c.value().clone()).collect();
        certs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(certs)
    }

    async fn delete_certificate(&self, id: &CertificateId) -> Result<bool, StoreError> {
        let existed = self.certificates.remove(id).is_some();
        if existed {
            let mut actions = self.actions.write();
            let before = actions.len();
            actions.retain(|a| &a.certificate_id != id);
            debug!(
                certificate_id = %id,
                actions_removed = before - actions.len(),
                "Deleted certificate"
            );
        }
        Ok(existed)
    }

    async fn create_action(&self, new: NewAction) -> Result<TlsCertificateAction, StoreError> {
        let action = new.into_action(Utc::now());
        self.actions.write().push(action.clone());
        Ok(action)
    }

    async fn list_actions(
        &self,
        certificate_id: Option<&CertificateId>,
        limit: usize,
    ) -> Result<Vec<TlsCertificateAction>, StoreError> {
        let actions = self.actions.read();
        Ok(actions
            .iter()
            .rev()
            .filter(|a| certificate_id.is_none_or(|id| &a.certificate_id == id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_challenge(&self, new: NewChallenge) -> Result<TlsChallenge, StoreError> {
        let challenge = new.into_challenge(Utc::now());
        self.challenges
            .insert(challenge.token.clone(), challenge.clone());
        Ok(challenge)
    }

    async fn get_challenge_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TlsChallenge>, StoreError> {
        Ok(self
            .challenges
            .get(token)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.clone()))
    }

    async fn complete_challenge(&self, token: &str) -> Result<(), StoreError> {
        if let Some(mut challenge) = self.challenges.get_mut(token) {
            challenge.completed = true;
        }
        Ok(())
    }

    async fn cleanup_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.challenges.len();
        self.challenges.retain(|_, c| !c.is_expired(now));
        Ok(before.saturating_sub(self.challenges.len()))
    }
}
