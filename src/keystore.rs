//! Media Vault - Master Key Storage
//!
//! The master key is generated on first use, persisted once, and read back
//! on every later start. It is never rotated or replaced.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::crypto::{MasterKey, KEY_LEN, SCHEME};
use crate::error::{VaultError, VaultResult};

/// Key file format version
const KEY_FILE_VERSION: u8 = 1;

/// Somewhere the master key lives between runs
pub trait KeyStore: Send + Sync {
    /// Load the stored key, if one exists
    fn load(&self) -> VaultResult<Option<MasterKey>>;

    /// Persist a freshly generated key
    fn store(&self, key: &MasterKey) -> VaultResult<()>;

    /// Load the stored key or generate and persist a new one
    fn load_or_create(&self) -> VaultResult<MasterKey> {
        if let Some(key) = self.load()? {
            log::debug!("master key loaded ({})", key.fingerprint());
            return Ok(key);
        }

        let key = MasterKey::generate();
        if let Err(e) = self.store(&key) {
            // Another opener stored its key first
            if let Some(existing) = self.load()? {
                log::debug!("master key created concurrently ({})", existing.fingerprint());
                return Ok(existing);
            }
            return Err(e);
        }
        log::info!("generated new master key ({})", key.fingerprint());
        Ok(key)
    }
}

/// On-disk representation of the master key
#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u8,
    scheme: String,
    created_at: DateTime<Utc>,
    key: String,
}

/// Key store backed by a JSON file with owner-only permissions
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the complete file beside its final path, then link it in
    /// without replacing anything already there. Temp files are 0600 on unix.
    fn write_new(&self, contents: &[u8]) -> std::io::Result<()> {
        use std::io::Write;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents)?;
        temp.as_file().sync_all()?;
        temp.persist_noclobber(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> VaultResult<Option<MasterKey>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => Zeroizing::new(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: KeyFile = serde_json::from_slice(&raw).map_err(|e| {
            VaultError::KeyStore(format!("{}: {}", self.path.display(), e))
        })?;

        if file.version != KEY_FILE_VERSION {
            return Err(VaultError::KeyStore(format!(
                "unsupported key file version {}",
                file.version
            )));
        }
        if file.scheme != SCHEME {
            return Err(VaultError::KeyStore(format!(
                "unsupported scheme {}",
                file.scheme
            )));
        }

        let bytes = Zeroizing::new(
            STANDARD
                .decode(file.key.as_bytes())
                .map_err(|e| VaultError::KeyStore(format!("invalid key encoding: {}", e)))?,
        );

        Ok(Some(MasterKey::from_slice(&bytes)?))
    }

    fn store(&self, key: &MasterKey) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = KeyFile {
            version: KEY_FILE_VERSION,
            scheme: SCHEME.to_string(),
            created_at: Utc::now(),
            key: STANDARD.encode(key.expose()),
        };
        let json = Zeroizing::new(serde_json::to_vec_pretty(&file)?);

        self.write_new(&json).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => VaultError::KeyStore(format!(
                "refusing to overwrite existing key at {}",
                self.path.display()
            )),
            _ => VaultError::Io(e),
        })
    }
}

/// Key store that keeps the key in memory only
#[derive(Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<Zeroizing<[u8; KEY_LEN]>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with a known key
    pub fn with_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            slot: Mutex::new(Some(Zeroizing::new(key))),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> VaultResult<Option<MasterKey>> {
        Ok(self.slot.lock().as_ref().map(|bytes| MasterKey::new(**bytes)))
    }

    fn store(&self, key: &MasterKey) -> VaultResult<()> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(VaultError::KeyStore("key already stored".into()));
        }
        *slot = Some(Zeroizing::new(*key.expose()));
        Ok(())
    }
}
