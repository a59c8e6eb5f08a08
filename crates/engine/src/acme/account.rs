//! Settings and ACME account management
//!
//! Owns the TLS settings singleton and the ACME account credentials stored
//! in it. Sessions are cached per CA environment and account key so
//! concurrent operations against staging and production never share a
//! client bound to the wrong directory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use certkeeper_common::CaEnvironment;
use certkeeper_config::AcmeConfig;

use super::client::{AccountKey, AcmeConnector, AcmeSession};
use crate::errors::{LifecycleError, LifecycleResult, StoreError};
use crate::models::{SettingsUpdate, TlsSettings};
use crate::store::TlsStore;
use crate::vault::SecretVault;

type SessionKey = (CaEnvironment, String);

/// Settings and account manager
pub struct SettingsManager {
    store: Arc<dyn TlsStore>,
    vault: Arc<SecretVault>,
    connector: Arc<dyn AcmeConnector>,
    acme: AcmeConfig,
    sessions: Mutex<HashMap<SessionKey, Arc<dyn AcmeSession>>>,
}

impl SettingsManager {
    pub fn new(
        store: Arc<dyn TlsStore>,
        vault: Arc<SecretVault>,
        connector: Arc<dyn AcmeConnector>,
        acme: AcmeConfig,
    ) -> Self {
        Self {
            store,
            vault,
            connector,
            acme,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn acme_config(&self) -> &AcmeConfig {
        &self.acme
    }

    /// Stored settings, or the defaults when none were saved yet
    pub async fn get_settings(&self) -> Result<TlsSettings, StoreError> {
        Ok(self.store.get_settings().await?.unwrap_or_default())
    }

    /// Apply a partial update, creating the settings row if needed
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<TlsSettings, StoreError> {
        let settings = self.store.update_settings(update).await?;
        debug!(
            auto_renew = settings.auto_renew_enabled,
            renew_days = settings.renew_days_before_expiry,
            "Updated TLS settings"
        );
        Ok(settings)
    }

    /// Contact email: explicit argument, then stored settings, then config
    pub async fn contact_email(&self, explicit: Option<&str>) -> Result<Option<String>, StoreError> {
        if let Some(email) = explicit.filter(|e| !e.trim().is_empty()) {
            return Ok(Some(email.to_string()));
        }
        let settings = self.get_settings().await?;
        Ok(settings.acme_email.or_else(|| self.acme.email.clone()))
    }

    /// Account key usable against `environment`
    ///
    /// Reuses the key stored for this environment. Otherwise a new account
    /// is registered, which requires a contact email. Keys of the other
    /// environment are left untouched.
    pub async fn ensure_account_key(
        &self,
        environment: CaEnvironment,
        email: Option<&str>,
    ) -> LifecycleResult<AccountKey> {
        let settings = self.get_settings().await?;

        if let Some(stored) = stored_key_for(&settings, environment) {
            let material = self.vault.read_transparent(stored)?;
            return Ok(AccountKey::new(material.as_str()));
        }

        let email = match email {
            Some(email) => Some(email.to_string()),
            None => self.contact_email(None).await?,
        }
        .ok_or_else(|| {
            LifecycleError::Configuration(format!(
                "no ACME account for {} and no contact email to register one",
                environment
            ))
        })?;

        self.register(environment, &email).await
    }

    /// Make sure an account with agreed terms exists for `environment`
    ///
    /// No-op when the stored account already satisfies this.
    pub async fn ensure_account_registered(
        &self,
        environment: CaEnvironment,
        email: &str,
    ) -> LifecycleResult<AccountKey> {
        self.ensure_account_key(environment, Some(email)).await
    }

    async fn register(&self, environment: CaEnvironment, email: &str) -> LifecycleResult<AccountKey> {
        let directory = self.acme.directory_url(environment);
        info!(
            environment = %environment,
            email = %email,
            "Registering ACME account and agreeing to terms of service"
        );

        let key = self.connector.register_account(directory, email).await?;
        let encrypted = self.vault.encrypt_to_portable(key.expose())?;

        self.store
            .update_settings(SettingsUpdate {
                account_key: Some((environment, encrypted)),
                acme_email: Some(email.to_string()),
                acme_agreed_to_tos: Some(true),
                ..Default::default()
            })
            .await?;

        info!(environment = %environment, "ACME account registered");
        Ok(key)
    }

    /// Session for `environment`, registering an account first if needed
    pub async fn session(
        &self,
        environment: CaEnvironment,
        email: Option<&str>,
    ) -> LifecycleResult<Arc<dyn AcmeSession>> {
        let key = self.ensure_account_key(environment, email).await?;
        let cache_key = (environment, key.fingerprint());

        if let Some(session) = self.sessions.lock().get(&cache_key).cloned() {
            debug!(environment = %environment, "Reusing ACME session");
            return Ok(session);
        }

        let directory = self.acme.directory_url(environment);
        let session = self.connector.connect(directory, &key).await?;

        let mut sessions = self.sessions.lock();
        // Sessions for superseded keys of this environment are stale
        sessions.retain(|(env, _), _| *env != environment);
        sessions.insert(cache_key, session.clone());

        Ok(session)
    }

    /// Drop cached sessions, e.g. after rotating credentials
    pub fn clear_sessions(&self) {
        let mut sessions = self.sessions.lock();
        if !sessions.is_empty() {
            warn!(count = sessions.len(), "Discarding cached ACME sessions");
        }
        sessions.clear();
    }
}

fn stored_key_for(settings: &TlsSettings, environment: CaEnvironment) -> Option<&str> {
    if let Some(key) = settings.account_keys.get(&environment) {
        return Some(key);
    }
    // Settings written before keys were tracked per environment
    match settings.account_key_pem.as_deref() {
        Some(key) if settings.acme_agreed_to_tos && settings.ca_type == environment => Some(key),
        _ => None,
    }
}

impl std::fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsManager")
            .field("cached_sessions", &self.sessions.lock().len())
            .finish()
    }
}
