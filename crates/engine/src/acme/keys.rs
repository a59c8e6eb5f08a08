//! Certificate key material: key generation, CSRs and expiry parsing.

use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::errors::LifecycleError;

/// Generate a fresh RSA-2048 key, PKCS#8 PEM encoded
pub fn generate_private_key() -> Result<Zeroizing<String>, LifecycleError> {
    let key = KeyPair::generate_rsa_for(&rcgen::PKCS_RSA_SHA256, rcgen::RsaKeySize::_2048)
        .map_err(|e| LifecycleError::KeyGeneration(format!("Failed to generate key: {}", e)))?;
    Ok(Zeroizing::new(key.serialize_pem()))
}

/// Build a DER-encoded CSR for a single domain
pub fn create_csr(domain: &str, private_key_pem: &str) -> Result<Vec<u8>, LifecycleError> {
    let key = KeyPair::from_pem(private_key_pem)
        .map_err(|e| LifecycleError::KeyGeneration(format!("Failed to load key: {}", e)))?;

    let mut params = CertificateParams::new(vec![domain.to_string()]).map_err(|e| {
        LifecycleError::KeyGeneration(format!("Failed to create CSR params: {}", e))
    })?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, domain);
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&key)
        .map_err(|e| LifecycleError::KeyGeneration(format!("Failed to serialize CSR: {}", e)))?;

    debug!(domain = %domain, "Created certificate signing request");
    Ok(csr.der().to_vec())
}

/// `notAfter` of the first certificate in a PEM chain
pub fn parse_not_after(chain_pem: &str) -> Option<DateTime<Utc>> {
    use x509_parser::prelude::*;

    let (_, pem) = match x509_parser::pem::parse_x509_pem(chain_pem.as_bytes()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Failed to parse certificate PEM");
            return None;
        }
    };

    let (_, cert) = match X509Certificate::from_der(&pem.contents) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Failed to parse X.509 certificate");
            return None;
        }
    };

    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}
