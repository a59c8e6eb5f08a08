//! Error types for the certificate engine.

use thiserror::Error;

use certkeeper_common::CertificateId;

use crate::acme::AcmeError;

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors raised by the secret vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// None of the configured master secret sources are set.
    #[error("vault master secret is not configured (checked: {variables})")]
    MissingMasterKey { variables: String },

    /// Authentication tag did not verify: tampered record or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Underlying cipher refused to encrypt.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Envelope could not be parsed.
    #[error("invalid encrypted envelope: {0}")]
    InvalidEnvelope(String),

    /// Envelope written by a newer format.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
}

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize/deserialize data
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Row referenced by an update does not exist
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Key cannot be used as a storage name
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Missing or unusable configuration such as an absent account key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The ACME server rejected a step or the protocol flow failed.
    #[error(transparent)]
    Protocol(#[from] AcmeError),

    /// Key material could not be decrypted or encrypted.
    #[error("cryptographic error: {0}")]
    Crypto(#[from] VaultError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Local key or CSR generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Domain is empty, a wildcard or lists several names.
    #[error("invalid domain '{0}': {1}")]
    InvalidDomain(String, &'static str),

    /// Another renew/revoke for the same certificate is in progress.
    #[error("certificate {0} has an operation in progress")]
    Busy(CertificateId),

    /// Certificate does not exist.
    #[error("certificate {0} not found")]
    NotFound(CertificateId),

    /// Operation is not allowed on a revoked certificate.
    #[error("certificate {0} is revoked")]
    Revoked(CertificateId),

    /// Operation requires a state the certificate is not in.
    #[error("certificate {id} cannot be {operation} while {status}")]
    InvalidState {
        id: CertificateId,
        operation: &'static str,
        status: String,
    },
}
