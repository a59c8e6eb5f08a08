//! Filesystem store
//!
//! # Directory Structure
//!
//! ```text
//! storage/
//! ├── settings.json         # TLS settings singleton
//! ├── actions.json          # Audit log, oldest first
//! ├── certificates/
//! │   └── <id>.json         # One document per certificate
//! └── challenges/
//!     └── <token>.json      # Pending HTTP-01 challenges
//! ```
//!
//! Directories are created 0700 and files 0600 on Unix since certificate
//! documents carry (encrypted) private keys.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use certkeeper_common::CertificateId;

use crate::errors::StoreError;
use crate::models::{
    CertificateUpdate, NewAction, NewCertificate, NewChallenge, SettingsUpdate, TlsCertificate,
    TlsCertificateAction, TlsChallenge, TlsSettings,
};
use crate::store::TlsStore;

const SETTINGS_FILE: &str = "settings.json";
const ACTIONS_FILE: &str = "actions.json";
const CERTIFICATES_DIR: &str = "certificates";
const CHALLENGES_DIR: &str = "challenges";

/// JSON-document store rooted at a directory.
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store at `base_path`
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_path)?;

        let certificates = base_path.join(CERTIFICATES_DIR);
        let challenges = base_path.join(CHALLENGES_DIR);
        fs::create_dir_all(&certificates)?;
        fs::create_dir_all(&challenges)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_path, perms.clone())?;
            fs::set_permissions(&certificates, perms.clone())?;
            fs::set_permissions(&challenges, perms)?;
        }

        info!(
            storage_path = %base_path.display(),
            "Initialized certificate store"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // =========================================================================
    // File helpers
    // =========================================================================

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            trace!(path = %path.display(), "Document not found");
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");

        let mut file = create_private(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn certificate_path(&self, id: &CertificateId) -> Result<PathBuf, StoreError> {
        Ok(self
            .base_path
            .join(CERTIFICATES_DIR)
            .join(format!("{}.json", safe_name(id.as_str())?)))
    }

    fn challenge_path(&self, token: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .base_path
            .join(CHALLENGES_DIR)
            .join(format!("{}.json", safe_name(token)?)))
    }

    fn read_dir_documents<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>, StoreError> {
        let mut docs = Vec::new();
        for entry in fs::read_dir(self.base_path.join(dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_json(&path) {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                }
            }
        }
        Ok(docs)
    }

    fn load_actions(&self) -> Result<Vec<TlsCertificateAction>, StoreError> {
        Ok(self
            .read_json(&self.base_path.join(ACTIONS_FILE))?
            .unwrap_or_default())
    }

    fn save_actions(&self, actions: &[TlsCertificateAction]) -> Result<(), StoreError> {
        self.write_json(&self.base_path.join(ACTIONS_FILE), &actions)
    }
}

/// Open `path` for writing, readable by the owner only before any byte lands
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let file = options.open(path)?;

    // A leftover temp file keeps the mode it was created with
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    Ok(file)
}

/// Reject names that could escape the storage directory
fn safe_name(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidKey(name.to_string()))
    }
}

#[async_trait]
impl TlsStore for FileStore {
    // =========================================================================
    // Settings
    // =========================================================================

    async fn get_settings(&self) -> Result<Option<TlsSettings>, StoreError> {
        self.read_json(&self.base_path.join(SETTINGS_FILE))
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<TlsSettings, StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.base_path.join(SETTINGS_FILE);

        let mut settings: TlsSettings = self.read_json(&path)?.unwrap_or_default();
        update.apply(&mut settings, Utc::now());
        self.write_json(&path, &settings)?;

        debug!("Saved TLS settings");
        Ok(settings)
    }

    // =========================================================================
    // Certificates
    // =========================================================================

    async fn create_certificate(&self, new: NewCertificate) -> Result<TlsCertificate, StoreError> {
        let cert = new.into_certificate(CertificateId::new(), Utc::now());
        let _guard = self.write_lock.lock();
        self.write_json(&self.certificate_path(&cert.id)?, &cert)?;
        debug!(certificate_id = %cert.id, domain = %cert.domain, "Saved new certificate");
        Ok(cert)
    }

    async fn get_certificate(
        &self,
        id: &CertificateId,
    ) -> Result<Option<TlsCertificate>, StoreError> {
        match self.certificate_path(id) {
            Ok(path) => self.read_json(&path),
            Err(StoreError::InvalidKey(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_certificate(
        &self,
        id: &CertificateId,
        update: CertificateUpdate,
    ) -> Result<TlsCertificate, StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.certificate_path(id)?;

        let mut cert: TlsCertificate =
            self.read_json(&path)?.ok_or_else(|| StoreError::NotFound {
                entity: "certificate",
                id: id.to_string(),
            })?;
        update.apply(&mut cert, Utc::now());
        self.write_json(&path, &cert)?;
        Ok(cert)
    }

    async fn list_certificates(&self) -> Result<Vec<TlsCertificate>, StoreError> {
        let mut certs: Vec<TlsCertificate> = self.read_dir_documents(CERTIFICATES_DIR)?;
        certs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(certs)
    }

    async fn delete_certificate(&self, id: &CertificateId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.certificate_path(id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;

        let mut actions = self.load_actions()?;
        actions.retain(|a| &a.certificate_id != id);
        self.save_actions(&actions)?;

        info!(certificate_id = %id, "Deleted certificate and its audit actions");
        Ok(true)
    }

    // =========================================================================
    // Audit actions
    // =========================================================================

    async fn create_action(&self, new: NewAction) -> Result<TlsCertificateAction, StoreError> {
        let action = new.into_action(Utc::now());
        let _guard = self.write_lock.lock();
        let mut actions = self.load_actions()?;
        actions.push(action.clone());
        self.save_actions(&actions)?;
        Ok(action)
    }

    async fn list_actions(
        &self,
        certificate_id: Option<&CertificateId>,
        limit: usize,
    ) -> Result<Vec<TlsCertificateAction>, StoreError> {
        let actions = self.load_actions()?;
        Ok(actions
            .into_iter()
            .rev()
            .filter(|a| certificate_id.is_none_or(|id| &a.certificate_id == id))
            .take(limit)
            .collect())
    }

    // =========================================================================
    // Challenges
    // =========================================================================

    async fn create_challenge(&self, new: NewChallenge) -> Result<TlsChallenge, StoreError> {
        let challenge = new.into_challenge(Utc::now());
        let _guard = self.write_lock.lock();
        self.write_json(&self.challenge_path(&challenge.token)?, &challenge)?;
        Ok(challenge)
    }

    async fn get_challenge_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TlsChallenge>, StoreError> {
        let path = match self.challenge_path(token) {
            Ok(path) => path,
            Err(StoreError::InvalidKey(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let challenge: Option<TlsChallenge> = self.read_json(&path)?;
        Ok(challenge.filter(|c| !c.is_expired(now)))
    }

    async fn complete_challenge(&self, token: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.challenge_path(token)?;
        if let Some(mut challenge) = self.read_json::<TlsChallenge>(&path)? {
            challenge.completed = true;
            self.write_json(&path, &challenge)?;
        }
        Ok(())
    }

    async fn cleanup_expired_challenges(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let challenges: Vec<TlsChallenge> = self.read_dir_documents(CHALLENGES_DIR)?;

        let mut removed = 0;
        for challenge in challenges.iter().filter(|c| c.is_expired(now)) {
            fs::remove_file(self.challenge_path(&challenge.token)?)?;
            removed += 1;
        }

        if removed > 0 {
            debug!(removed, "Removed expired challenges");
        }
        Ok(removed)
    }
}
