//! HTTP-01 challenge bridge
//!
//! Persists challenge tokens and key authorizations so whatever process
//! answers `/.well-known/acme-challenge/<token>` on port 80 can serve them,
//! even when it is not the process running the order.

use std::sync::Arc;

use chrono::{Duration, Utc};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use tracing::{debug, error, trace};

use certkeeper_common::TenantId;

use crate::errors::StoreError;
use crate::models::{NewChallenge, TlsChallenge};
use crate::store::TlsStore;

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Default lifetime of a stored challenge
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 600;

/// Stores and serves pending HTTP-01 challenges
#[derive(Clone)]
pub struct ChallengeBridge {
    store: Arc<dyn TlsStore>,
    ttl: Duration,
}

impl ChallengeBridge {
    pub fn new(store: Arc<dyn TlsStore>) -> Self {
        Self {
            store,
            ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
        }
    }

    /// Override the TTL used by [`store_challenge`](Self::store_challenge)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a pending challenge with the bridge's TTL
    pub async fn store_challenge(
        &self,
        token: &str,
        key_authorization: &str,
        domain: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<TlsChallenge, StoreError> {
        self.store_challenge_with_ttl(token, key_authorization, domain, tenant_id, self.ttl)
            .await
    }

    /// Register a pending challenge expiring after `ttl`
    pub async fn store_challenge_with_ttl(
        &self,
        token: &str,
        key_authorization: &str,
        domain: &str,
        tenant_id: Option<&TenantId>,
        ttl: Duration,
    ) -> Result<TlsChallenge, StoreError> {
        debug!(token = %token, domain = %domain, "Registering ACME HTTP-01 challenge");
        self.store
            .create_challenge(NewChallenge {
                token: token.to_string(),
                key_authorization: key_authorization.to_string(),
                domain: domain.to_string(),
                tenant_id: tenant_id.cloned(),
                expires_at: Utc::now() + ttl,
            })
            .await
    }

    /// Key authorization for an unexpired token
    pub async fn get_key_authorization(&self, token: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .store
            .get_challenge_by_token(token, Utc::now())
            .await?
            .map(|c| c.key_authorization);
        if result.is_some() {
            trace!(token = %token, "ACME challenge token found");
        } else {
            trace!(token = %token, "ACME challenge token not found");
        }
        Ok(result)
    }

    /// Record that the CA validated the challenge
    pub async fn mark_complete(&self, token: &str) -> Result<(), StoreError> {
        self.store.complete_challenge(token).await
    }

    /// Delete every challenge past its expiry, completed or not
    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let removed = self.store.cleanup_expired_challenges(Utc::now()).await?;
        if removed > 0 {
            debug!(removed, "Swept expired ACME challenges");
        }
        Ok(removed)
    }

    /// Token from a challenge request path
    pub fn extract_token(path: &str) -> Option<&str> {
        path.strip_prefix(ACME_CHALLENGE_PREFIX)
            .filter(|token| !token.is_empty() && !token.contains('/'))
    }

    /// HTTP response for a challenge request path
    ///
    /// 200 with the key authorization as `text/plain`, 404 when the path or
    /// token is unknown.
    pub async fn respond(&self, path: &str) -> Response<String> {
        let Some(token) = Self::extract_token(path) else {
            return plain_response(StatusCode::NOT_FOUND, "Challenge not found");
        };

        match self.get_key_authorization(token).await {
            Ok(Some(key_authorization)) => plain_response(StatusCode::OK, key_authorization),
            Ok(None) => plain_response(StatusCode::NOT_FOUND, "Challenge not found"),
            Err(e) => {
                error!(token = %token, error = %e, "Failed to look up ACME challenge");
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}

fn plain_response(status: StatusCode, body: impl Into<String>) -> Response<String> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

impl std::fmt::Debug for ChallengeBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeBridge")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish()
    }
}
