//! ACME error types

use thiserror::Error;

/// Errors that can occur during ACME operations
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Failed to create or load ACME account
    #[error("Failed to create ACME account: {0}")]
    AccountCreation(String),

    /// Failed to create certificate order
    #[error("Failed to create certificate order: {0}")]
    OrderCreation(String),

    /// Order handle is not known to this session
    #[error("Unknown ACME order '{0}'")]
    UnknownOrder(String),

    /// Challenge validation failed
    #[error("Challenge validation failed for domain '{domain}': {message}")]
    ChallengeValidation { domain: String, message: String },

    /// The CA marked the order invalid, usually after a failed challenge
    #[error("ACME order '{0}' became invalid")]
    OrderInvalid(String),

    /// No HTTP-01 challenge available for domain
    #[error("No HTTP-01 challenge available for domain '{0}'")]
    NoHttp01Challenge(String),

    /// Certificate finalization failed
    #[error("Failed to finalize certificate: {0}")]
    Finalization(String),

    /// Revocation was rejected
    #[error("Failed to revoke certificate: {0}")]
    Revocation(String),

    /// The CA reports the certificate as already revoked
    #[error("Certificate is already revoked")]
    AlreadyRevoked,

    /// Certificate parsing error
    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    /// ACME protocol error from instant-acme
    #[error("ACME protocol error: {0}")]
    Protocol(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<instant_acme::Error> for AcmeError {
    fn from(e: instant_acme::Error) -> Self {
        AcmeError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_invalid_names_order() {
        let e = AcmeError::OrderInvalid("https://ca.test/order/42".to_string());
        assert_eq!(
            e.to_string(),
            "ACME order 'https://ca.test/order/42' became invalid"
        );
    }
}
