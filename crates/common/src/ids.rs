//! Type-safe identifier newtypes.
//!
//! These types keep certificate, tenant and user identifiers from being
//! swapped by accident (e.g., passing a TenantId where a CertificateId is
//! expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a stored certificate.
///
/// Generated once when the certificate row is created and never reused,
/// so audit actions can reference it after the certificate is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    /// Create a new random certificate ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for CertificateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CertificateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CertificateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Tenant owning a challenge or certificate request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// User that triggered a lifecycle operation.
///
/// Recorded as `performed_by` on every audit action. Scheduled runs use
/// the configured system user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_id_uniqueness() {
        let id1 = CertificateId::new();
        let id2 = CertificateId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_certificate_id_display() {
        let id = CertificateId::from("cert-123");
        assert_eq!(id.to_string(), "cert-123");
        assert_eq!(id.as_str(), "cert-123");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = TenantId::new("tenant-a");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tenant-a\"");

        let user: UserId = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(user.as_str(), "admin");
    }
}
