//! ACME protocol adapter
//!
//! The lifecycle engine drives the CA through two object-safe traits:
//!
//! - [`AcmeConnector`] registers accounts and opens sessions for a
//!   `(directory, account key)` pair.
//! - [`AcmeSession`] is bound to one directory and one account and performs
//!   the order/authorization/finalize/revoke round trips.
//!
//! [`InstantAcmeConnector`] implements both on top of `instant-acme`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus, RevocationRequest,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, trace, warn};
use zeroize::Zeroizing;

use super::error::AcmeError;

/// Timeout for certificate download after finalization
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Poll interval while waiting on the CA
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Serialized ACME account credentials (includes the account private key)
#[derive(Clone)]
pub struct AccountKey(Zeroizing<String>);

impl AccountKey {
    pub fn new(material: impl Into<String>) -> Self {
        Self(Zeroizing::new(material.into()))
    }

    /// The raw credential material
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Stable identifier for session caching; reveals nothing about the key
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountKey").field(&"<redacted>").finish()
    }
}

/// Opaque reference to an order held by a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderHandle(String);

impl OrderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Information about an HTTP-01 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http01Challenge {
    /// Domain this challenge is for
    pub domain: String,
    /// Challenge token (appears in URL path)
    pub token: String,
    /// Key authorization (the response content)
    pub key_authorization: String,
    /// Challenge URL for validation notification
    pub url: String,
}

/// Creates ACME accounts and sessions
#[async_trait]
pub trait AcmeConnector: Send + Sync {
    /// Create an account with explicit Terms-of-Service agreement
    async fn register_account(
        &self,
        directory_url: &str,
        email: &str,
    ) -> Result<AccountKey, AcmeError>;

    /// Open a session bound to `directory_url` and `key`
    async fn connect(
        &self,
        directory_url: &str,
        key: &AccountKey,
    ) -> Result<Arc<dyn AcmeSession>, AcmeError>;
}

/// Protocol operations against one CA directory with one account
#[async_trait]
pub trait AcmeSession: Send + Sync {
    /// Create a single-identifier order
    async fn new_order(&self, domain: &str) -> Result<OrderHandle, AcmeError>;

    /// HTTP-01 challenges for every pending authorization of the order
    ///
    /// Fails with [`AcmeError::NoHttp01Challenge`] when an authorization
    /// offers no HTTP-01 option.
    async fn http01_challenges(&self, order: &OrderHandle)
        -> Result<Vec<Http01Challenge>, AcmeError>;

    /// Tell the CA the challenge response is in place
    async fn verify_challenge(
        &self,
        order: &OrderHandle,
        challenge: &Http01Challenge,
    ) -> Result<(), AcmeError>;

    /// Poll until the order's authorizations are valid
    async fn wait_for_valid(&self, order: &OrderHandle, timeout: Duration)
        -> Result<(), AcmeError>;

    /// Submit the CSR and download the issued chain (PEM)
    async fn finalize(&self, order: &OrderHandle, csr_der: &[u8]) -> Result<String, AcmeError>;

    /// Revoke a certificate (PEM, leaf first)
    async fn revoke(&self, certificate_pem: &str) -> Result<(), AcmeError>;
}

// =============================================================================
// instant-acme implementation
// =============================================================================

/// Connector backed by `instant-acme`
#[derive(Debug, Default, Clone)]
pub struct InstantAcmeConnector;

impl InstantAcmeConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AcmeConnector for InstantAcmeConnector {
    async fn register_account(
        &self,
        directory_url: &str,
        email: &str,
    ) -> Result<AccountKey, AcmeError> {
        info!(
            email = %email,
            directory = %directory_url,
            "Creating new ACME account"
        );

        let contact = format!("mailto:{}", email);
        let (_account, credentials) = Account::builder()
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?
            .create(
                &NewAccount {
                    contact: &[contact.as_str()],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                directory_url.to_owned(),
                None,
            )
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        let json = serde_json::to_string(&credentials).map_err(|e| {
            AcmeError::AccountCreation(format!("Failed to serialize credentials: {}", e))
        })?;

        info!("ACME account created successfully");
        Ok(AccountKey::new(json))
    }

    async fn connect(
        &self,
        directory_url: &str,
        key: &AccountKey,
    ) -> Result<Arc<dyn AcmeSession>, AcmeError> {
        let credentials: AccountCredentials = serde_json::from_str(key.expose()).map_err(|e| {
            AcmeError::AccountCreation(format!("Failed to deserialize credentials: {}", e))
        })?;

        let account = Account::builder()
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?
            .from_credentials(credentials)
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        debug!(directory = %directory_url, "ACME session established");

        Ok(Arc::new(InstantAcmeSession {
            account,
            directory_url: directory_url.to_string(),
            orders: Mutex::new(HashMap::new()),
        }))
    }
}

/// Session over an `instant_acme::Account`
///
/// Orders are kept per handle behind their own async lock so concurrent
/// operations on different orders do not serialize on each other.
pub struct InstantAcmeSession {
    account: Account,
    directory_url: String,
    orders: Mutex<HashMap<OrderHandle, Arc<AsyncMutex<Order>>>>,
}

impl InstantAcmeSession {
    fn order(&self, handle: &OrderHandle) -> Result<Arc<AsyncMutex<Order>>, AcmeError> {
        self.orders
            .lock()
            .get(handle)
            .cloned()
            .ok_or_else(|| AcmeError::UnknownOrder(handle.to_string()))
    }

    fn forget(&self, handle: &OrderHandle) {
        self.orders.lock().remove(handle);
    }
}

#[async_trait]
impl AcmeSession for InstantAcmeSession {
    async fn new_order(&self, domain: &str) -> Result<OrderHandle, AcmeError> {
        info!(domain = %domain, "Creating certificate order");

        let identifiers = [Identifier::Dns(domain.to_string())];
        let order = self
            .account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        let handle = OrderHandle::new(uuid::Uuid::new_v4().to_string());
        self.orders
            .lock()
            .insert(handle.clone(), Arc::new(AsyncMutex::new(order)));
        Ok(handle)
    }

    async fn http01_challenges(
        &self,
        order: &OrderHandle,
    ) -> Result<Vec<Http01Challenge>, AcmeError> {
        let order = self.order(order)?;
        let mut order = order.lock().await;

        let mut authorizations = order.authorizations();
        let mut challenges = Vec::new();

        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| {
                AcmeError::OrderCreation(format!("Failed to get authorization: {}", e))
            })?;

            let identifier = authz.identifier();
            let domain = match &identifier.identifier {
                Identifier::Dns(domain) => domain.clone(),
                _ => continue,
            };

            debug!(domain = %domain, status = ?authz.status, "Processing authorization");

            if authz.status == AuthorizationStatus::Valid {
                debug!(domain = %domain, "Authorization already valid");
                continue;
            }

            let http01 = authz
                .challenge(ChallengeType::Http01)
                .ok_or_else(|| AcmeError::NoHttp01Challenge(domain.clone()))?;

            let key_authorization = http01.key_authorization();

            challenges.push(Http01Challenge {
                domain,
                token: http01.token.clone(),
                key_authorization: key_authorization.as_str().to_string(),
                url: http01.url.clone(),
            });
        }

        Ok(challenges)
    }

    async fn verify_challenge(
        &self,
        order: &OrderHandle,
        challenge: &Http01Challenge,
    ) -> Result<(), AcmeError> {
        debug!(domain = %challenge.domain, url = %challenge.url, "Setting challenge ready");

        let order = self.order(order)?;
        let mut order = order.lock().await;

        // Find the authorization holding this challenge URL
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| AcmeError::ChallengeValidation {
                domain: challenge.domain.clone(),
                message: format!("Failed to get authorization: {}", e),
            })?;

            let holds_challenge = authz.challenges.iter().any(|c| c.url == challenge.url);
            if !holds_challenge {
                continue;
            }

            if let Some(mut handle) = authz.challenge(ChallengeType::Http01) {
                handle
                    .set_ready()
                    .await
                    .map_err(|e| AcmeError::ChallengeValidation {
                        domain: challenge.domain.clone(),
                        message: e.to_string(),
                    })?;
                return Ok(());
            }
        }

        Err(AcmeError::ChallengeValidation {
            domain: challenge.domain.clone(),
            message: format!("Challenge not found for URL: {}", challenge.url),
        })
    }

    async fn wait_for_valid(&self, handle: &OrderHandle, timeout: Duration) -> Result<(), AcmeError> {
        let order = self.order(handle)?;
        let mut order = order.lock().await;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let state = order
                .refresh()
                .await
                .map_err(|e| AcmeError::OrderCreation(format!("Failed to refresh order: {}", e)))?;

            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => {
                    debug!(order = %handle, "Order authorizations are valid");
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    error!(order = %handle, "Order became invalid");
                    drop(order);
                    self.forget(handle);
                    return Err(AcmeError::OrderInvalid(handle.to_string()));
                }
                OrderStatus::Pending | OrderStatus::Processing => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::Timeout(
                            "Timed out waiting for challenge validation".to_string(),
                        ));
                    }
                    trace!(status = ?state.status, "Order not ready yet, waiting...");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn finalize(&self, handle: &OrderHandle, csr_der: &[u8]) -> Result<String, AcmeError> {
        info!(order = %handle, "Finalizing certificate order");

        let order = self.order(handle)?;
        let mut order = order.lock().await;

        order
            .finalize_csr(csr_der)
            .await
            .map_err(|e| AcmeError::Finalization(format!("Failed to finalize order: {}", e)))?;

        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        let chain = loop {
            let state = order
                .refresh()
                .await
                .map_err(|e| AcmeError::Finalization(format!("Failed to refresh order: {}", e)))?;

            match state.status {
                OrderStatus::Valid => {
                    let chain = order.certificate().await.map_err(|e| {
                        AcmeError::Finalization(format!("Failed to get certificate: {}", e))
                    })?;
                    break chain.ok_or_else(|| {
                        AcmeError::Finalization("No certificate in response".to_string())
                    })?;
                }
                OrderStatus::Invalid => {
                    return Err(AcmeError::Finalization("Order became invalid".to_string()));
                }
                _ => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::Timeout(
                            "Timed out waiting for certificate".to_string(),
                        ));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        };

        drop(order);
        self.forget(handle);
        Ok(chain)
    }

    async fn revoke(&self, certificate_pem: &str) -> Result<(), AcmeError> {
        let der = rustls_pemfile::certs(&mut certificate_pem.as_bytes())
            .next()
            .ok_or_else(|| AcmeError::CertificateParse("No certificate in PEM".to_string()))?
            .map_err(|e| AcmeError::CertificateParse(e.to_string()))?;

        match self
            .account
            .revoke(&RevocationRequest {
                certificate: &der,
                reason: None,
            })
            .await
        {
            Ok(()) => {
                info!("Certificate revoked");
                Ok(())
            }
            Err(e) if is_already_revoked(&e) => {
                warn!("CA reports certificate already revoked");
                Err(AcmeError::AlreadyRevoked)
            }
            Err(e) => Err(AcmeError::Revocation(e.to_string())),
        }
    }
}

/// Whether a CA error is the RFC 8555 `alreadyRevoked` problem
fn is_already_revoked(e: &instant_acme::Error) -> bool {
    let text = format!("{} {:?}", e, e).to_ascii_lowercase();
    text.contains("alreadyrevoked") || text.contains("already revoked")
}

impl fmt::Debug for InstantAcmeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantAcmeSession")
            .field("directory_url", &self.directory_url)
            .field("open_orders", &self.orders.lock().len())
            .finish()
    }
}
