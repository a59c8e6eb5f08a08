//! Secret vault for at-rest encryption of key material
//!
//! Private keys and ACME account credentials are stored as a portable JSON
//! envelope:
//!
//! ```text
//! {"ciphertext":"<b64>","iv":"<b64>","authTag":"<b64>","version":1}
//! ```
//!
//! The cipher is AES-256-GCM with a 16-byte IV drawn fresh for every record
//! and a 16-byte authentication tag. The master key is derived once per
//! process from an operator secret with PBKDF2-HMAC-SHA512 over a fixed
//! application salt, so records survive restarts as long as the secret does.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use certkeeper_config::VaultConfig;

use crate::errors::VaultError;

/// AES-256-GCM with a 128-bit nonce
type VaultCipher = AesGcm<Aes256, U16>;

/// Envelope format version written by this vault
pub const ENVELOPE_VERSION: u32 = 1;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const SALT_LABEL: &[u8] = b"tls-key-vault-salt";

/// An encrypted value with everything needed to decrypt it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecord {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub version: u32,
}

/// Where the operator secret comes from
enum SecretSource {
    /// First set environment variable wins
    Env(Vec<String>),
    Inline(Zeroizing<String>),
}

/// Authenticated encryption for secrets stored at rest
///
/// Key derivation is lazy: a vault can be constructed before the master
/// secret is available, and the missing secret only surfaces as
/// [`VaultError::MissingMasterKey`] on the first encrypt or decrypt.
pub struct SecretVault {
    source: SecretSource,
    iterations: u32,
    key: OnceCell<Zeroizing<[u8; KEY_LEN]>>,
}

impl SecretVault {
    /// Vault reading its secret from the given environment variables
    pub fn from_env(vars: Vec<String>, iterations: u32) -> Self {
        Self {
            source: SecretSource::Env(vars),
            iterations,
            key: OnceCell::new(),
        }
    }

    /// Vault using an explicitly supplied secret
    pub fn from_secret(secret: impl Into<String>, iterations: u32) -> Self {
        Self {
            source: SecretSource::Inline(Zeroizing::new(secret.into())),
            iterations,
            key: OnceCell::new(),
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self::from_env(config.master_key_env.clone(), config.iterations)
    }

    fn master_key(&self) -> Result<&Zeroizing<[u8; KEY_LEN]>, VaultError> {
        self.key.get_or_try_init(|| {
            let secret = self.read_secret()?;
            let salt = Sha256::digest(SALT_LABEL);

            let mut key = Zeroizing::new([0u8; KEY_LEN]);
            pbkdf2::pbkdf2_hmac::<Sha512>(
                secret.as_bytes(),
                salt.as_slice(),
                self.iterations,
                &mut key[..],
            );

            debug!(iterations = self.iterations, "Derived vault master key");
            Ok(key)
        })
    }

    fn read_secret(&self) -> Result<Zeroizing<String>, VaultError> {
        match &self.source {
            SecretSource::Inline(secret) if !secret.is_empty() => Ok(secret.clone()),
            SecretSource::Inline(_) => Err(VaultError::MissingMasterKey {
                variables: "<inline>".to_string(),
            }),
            SecretSource::Env(vars) => vars
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
                .map(Zeroizing::new)
                .ok_or_else(|| VaultError::MissingMasterKey {
                    variables: vars.join(", "),
                }),
        }
    }

    fn cipher(&self) -> Result<VaultCipher, VaultError> {
        let key = self.master_key()?;
        Ok(VaultCipher::new(Key::<VaultCipher>::from_slice(key.as_slice())))
    }

    /// Encrypt a plaintext with a fresh random IV
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedRecord, VaultError> {
        let cipher = self.cipher()?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        // aead output is ciphertext || tag
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        trace!(plaintext_len = plaintext.len(), "Encrypted secret");

        Ok(EncryptedRecord {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(iv),
            auth_tag: BASE64.encode(tag),
            version: ENVELOPE_VERSION,
        })
    }

    /// Decrypt a record, failing hard when authentication does not verify
    pub fn decrypt(&self, record: &EncryptedRecord) -> Result<Zeroizing<String>, VaultError> {
        if record.version != ENVELOPE_VERSION {
            return Err(VaultError::UnsupportedVersion(record.version));
        }

        let iv = decode_field("iv", &record.iv)?;
        let tag = decode_field("authTag", &record.auth_tag)?;
        let ciphertext = decode_field("ciphertext", &record.ciphertext)?;

        if iv.len() != IV_LEN {
            return Err(VaultError::InvalidEnvelope(format!(
                "iv must be {} bytes, found {}",
                IV_LEN,
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::InvalidEnvelope(format!(
                "authTag must be {} bytes, found {}",
                TAG_LEN,
                tag.len()
            )));
        }

        let cipher = self.cipher()?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
                .map_err(|_| VaultError::Decryption)?,
        );

        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Decryption)
    }

    /// Encrypt into a single JSON string suitable for one text column
    pub fn encrypt_to_portable(&self, plaintext: &str) -> Result<String, VaultError> {
        let record = self.encrypt(plaintext)?;
        serde_json::to_string(&record).map_err(|e| VaultError::InvalidEnvelope(e.to_string()))
    }

    /// Parse and decrypt a portable envelope
    pub fn decrypt_from_portable(&self, value: &str) -> Result<Zeroizing<String>, VaultError> {
        let record: EncryptedRecord =
            serde_json::from_str(value).map_err(|e| VaultError::InvalidEnvelope(e.to_string()))?;
        self.decrypt(&record)
    }

    /// Whether `value` looks like a portable envelope
    ///
    /// Only the shape is checked; a value that passes may still fail to
    /// decrypt.
    pub fn is_portable_encrypted(value: &str) -> bool {
        match serde_json::from_str::<serde_json::Value>(value) {
            Ok(serde_json::Value::Object(map)) => {
                map.get("ciphertext").is_some_and(|v| v.is_string())
                    && map.get("iv").is_some_and(|v| v.is_string())
            }
            _ => false,
        }
    }

    /// Decrypt envelopes, pass legacy plaintext through unchanged
    pub fn read_transparent(&self, value: &str) -> Result<Zeroizing<String>, VaultError> {
        if Self::is_portable_encrypted(value) {
            self.decrypt_from_portable(value)
        } else {
            trace!("Reading legacy plaintext secret");
            Ok(Zeroizing::new(value.to_string()))
        }
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, VaultError> {
    BASE64
        .decode(value)
        .map_err(|e| VaultError::InvalidEnvelope(format!("{} is not valid base64: {}", field, e)))
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            SecretSource::Env(vars) => format!("env({})", vars.join(", ")),
            SecretSource::Inline(_) => "inline".to_string(),
        };
        f.debug_struct("SecretVault")
            .field("source", &source)
            .field("iterations", &self.iterations)
            .field("key_derived", &self.key.get().is_some())
            .finish()
    }
}
