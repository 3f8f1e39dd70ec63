//! Media Vault - Configuration
//!
//! Loaded from an optional JSON file, then overridden from the environment.
//!
//! ## Environment Variables
//!
//! - `MEDIA_VAULT_CONFIG`: config file path when none is given explicitly
//! - `MEDIA_VAULT_DATA_DIR`: override the data directory

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Environment variable naming the config file
pub const ENV_CONFIG_PATH: &str = "MEDIA_VAULT_CONFIG";

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "MEDIA_VAULT_DATA_DIR";

/// Default copy chunk for imports (4 KiB)
pub const DEFAULT_COPY_CHUNK: usize = 4 * 1024;

/// Vault configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root of everything the vault writes
    pub data_dir: PathBuf,
    /// Blob directory, relative to `data_dir`
    pub blob_dir: String,
    /// SQLite file, relative to `data_dir`
    pub database: String,
    /// Persisted master key, relative to `data_dir`
    pub key_file: String,
    /// Temporary plaintext files for playback, relative to `data_dir`
    pub cache_dir: String,
    /// Read size used when copying a source into the blob store
    pub copy_chunk_size: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("media-vault"))
            .unwrap_or_else(|| PathBuf::from("./media-vault"));

        Self {
            data_dir,
            blob_dir: "files".into(),
            database: "app_database.db".into(),
            key_file: "master_key.json".into(),
            cache_dir: "cache".into(),
            copy_chunk_size: DEFAULT_COPY_CHUNK,
        }
    }
}

impl VaultConfig {
    /// Default layout rooted at `data_dir`
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load config from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            VaultError::Config(format!("reading {}: {}", path.display(), e))
        })?;
        let mut config: VaultConfig = serde_json::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load with environment overrides.
    /// Priority: env vars > config file > defaults
    pub fn load_with_env(path: Option<&Path>) -> VaultResult<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));

        let mut config = match config_path {
            Some(ref p) if p.exists() => {
                log::info!("loading config from {}", p.display());
                let raw = fs::read_to_string(p).map_err(|e| {
                    VaultError::Config(format!("reading {}: {}", p.display(), e))
                })?;
                serde_json::from_str(&raw)?
            }
            Some(ref p) => {
                log::warn!("config file {} not found, using defaults", p.display());
                VaultConfig::default()
            }
            None => {
                log::debug!("using default configuration");
                VaultConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(ENV_DATA_DIR) {
            log::debug!("overriding data_dir from environment: {}", dir);
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Reject unusable settings
    pub fn validate(&self) -> VaultResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(VaultError::Config("data_dir cannot be empty".into()));
        }

        for (field, value) in [
            ("blob_dir", &self.blob_dir),
            ("database", &self.database),
            ("key_file", &self.key_file),
            ("cache_dir", &self.cache_dir),
        ] {
            if value.trim().is_empty() {
                return Err(VaultError::Config(format!("{} cannot be empty", field)));
            }
        }

        if self.blob_dir == self.cache_dir {
            return Err(VaultError::Config(
                "blob_dir and cache_dir must differ".into(),
            ));
        }

        if self.copy_chunk_size == 0 {
            return Err(VaultError::Config("copy_chunk_size must be positive".into()));
        }

        Ok(())
    }

    /// Save as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> VaultResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Directory of encrypted blobs
    pub fn blob_root(&self) -> PathBuf {
        self.data_dir.join(&self.blob_dir)
    }

    /// SQLite metadata file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }

    /// Persisted master key
    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(&self.key_file)
    }

    /// Directory of plaintext playback files
    pub fn cache_root(&self) -> PathBuf {
        self.data_dir.join(&self.cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_paths() {
        let config = VaultConfig::with_data_dir("/data/vault");
        assert_eq!(config.blob_root(), PathBuf::from("/data/vault/files"));
        assert_eq!(config.database_path(), PathBuf::from("/data/vault/app_database.db"));
        assert_eq!(config.key_path(), PathBuf::from("/data/vault/master_key.json"));
        assert_eq!(config.cache_root(), PathBuf::from("/data/vault/cache"));
        assert_eq!(config.copy_chunk_size, 4096);
    }

    #[test]
    fn test_validation() {
        let mut config = VaultConfig::with_data_dir("/tmp/v");
        assert!(config.validate().is_ok());

        config.copy_chunk_size = 0;
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));

        let mut config = VaultConfig::with_data_dir("/tmp/v");
        config.cache_dir = "files".into();
        assert!(config.validate().is_err());

        let mut config = VaultConfig::with_data_dir("/tmp/v");
        config.database = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let data_dir = dir.path().join("data");
        fs::write(
            &path,
            format!(r#"{{ "data_dir": {:?}, "copy_chunk_size": 1024 }}"#, data_dir),
        )
        .unwrap();

        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.copy_chunk_size, 1024);
        assert_eq!(config.blob_dir, "files");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let mut config = VaultConfig::with_data_dir(dir.path().join("data"));
        config.blob_dir = "blobs".into();
        config.save(&path).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded.blob_dir, "blobs");
    }
}
