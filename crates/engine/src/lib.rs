//! Certkeeper Engine
//!
//! TLS certificate lifecycle management over ACME HTTP-01.
//!
//! This library provides:
//!
//! - **Lifecycle**: request, renew, revoke and activate single-domain
//!   certificates, with an audit action for every step
//! - **Secret Vault**: AES-256-GCM encryption of private keys and account
//!   credentials at rest
//! - **Challenge Bridge**: persisted HTTP-01 tokens served from
//!   `/.well-known/acme-challenge/`
//! - **Renewal Scheduler**: background renewal of expiring certificates
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certkeeper_engine::{CertificateLifecycle, CertificateRequest, FileStore, SecretVault};
//! use certkeeper_engine::acme::InstantAcmeConnector;
//!
//! let lifecycle = CertificateLifecycle::new(
//!     Arc::new(FileStore::new(&config.storage.path)?),
//!     Arc::new(SecretVault::from_config(&config.vault)),
//!     Arc::new(InstantAcmeConnector::new()),
//!     config.acme.clone(),
//! );
//! let id = lifecycle.request_certificate(request).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod store;
pub mod vault;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Errors
pub use errors::{LifecycleError, LifecycleResult, StoreError, VaultError};

// Lifecycle
pub use lifecycle::{
    CertificateLifecycle, CertificateRequest, LifecycleOptions, OperationOutcome, RenewalFailure,
    RenewalReport,
};

// Data model
pub use models::{
    ActionDetails, ActionKind, ActionStatus, CertificateStatus, TlsCertificate,
    TlsCertificateAction, TlsChallenge, TlsSettings,
};

// Persistence
pub use store::{FileStore, MemoryStore, TlsStore};

// Secret vault
pub use vault::{EncryptedRecord, SecretVault};

// ACME
pub use acme::{ChallengeBridge, RenewalScheduler, SettingsManager};
