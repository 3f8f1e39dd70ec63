//! Media Vault - Main Vault Implementation
//!
//! Builds every component once from a [`VaultConfig`] and wires them
//! together. Nothing here is global; callers hold the vault and pass it on.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::blob_store::BlobStore;
use crate::config::VaultConfig;
use crate::crypto::MasterKey;
use crate::error::{VaultError, VaultResult};
use crate::import::{ContentSource, FsContentSource, Importer};
use crate::keystore::{FileKeyStore, KeyStore};
use crate::metadata::{FileRecord, MetadataStore};
use crate::presenter::ListPresenter;
use crate::viewer::{Rendered, Viewer};
use crate::worker::{Pending, WorkQueue};

/// Name of the background import thread
const IMPORT_THREAD: &str = "media-import";

/// Vault statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaultStats {
    /// Metadata records
    pub files: u64,
    /// Encrypted blobs on disk
    pub blobs: u64,
    /// Bytes used by the blob directory
    pub blob_bytes: u64,
}

/// Media Vault - Main entry point
pub struct MediaVault {
    /// Background imports; dropped first so queued jobs finish
    queue: WorkQueue,
    config: VaultConfig,
    key: Arc<MasterKey>,
    blobs: Arc<BlobStore>,
    metadata: Arc<MetadataStore>,
    importer: Importer,
    viewer: Viewer,
}

impl MediaVault {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the vault described by `config`, creating it on first use
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let keys = FileKeyStore::new(config.key_path());
        Self::open_with_key_store(config, &keys)
    }

    /// Open with a caller-supplied key store
    pub fn open_with_key_store(config: VaultConfig, keys: &dyn KeyStore) -> VaultResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let key = Arc::new(keys.load_or_create()?);
        let blobs = Arc::new(BlobStore::new(
            config.blob_root(),
            key.clone(),
            config.copy_chunk_size,
        )?);
        let metadata = Arc::new(MetadataStore::open(config.database_path())?);
        let importer = Importer::new(blobs.clone(), metadata.clone());
        let viewer = Viewer::new(blobs.clone(), config.cache_root())?;
        let queue = WorkQueue::new(IMPORT_THREAD)?;

        log::info!(
            "vault opened at {} (key {})",
            config.data_dir.display(),
            key.fingerprint()
        );

        Ok(Self {
            queue,
            config,
            key,
            blobs,
            metadata,
            importer,
            viewer,
        })
    }

    /// Configuration the vault was opened with
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Public identifier of the master key
    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // IMPORT
    // ═══════════════════════════════════════════════════════════════════════

    /// Import a local file
    pub fn import_file<P: AsRef<Path>>(&self, path: P) -> VaultResult<FileRecord> {
        let uri = path.as_ref().to_string_lossy();
        self.importer.import(&FsContentSource, &uri)
    }

    /// Import from any content source
    pub fn import_from(&self, source: &dyn ContentSource, uri: &str) -> VaultResult<FileRecord> {
        self.importer.import(source, uri)
    }

    /// Import a local file on the background thread
    pub fn import_in_background<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Pending<VaultResult<FileRecord>> {
        let importer = self.importer.clone();
        let uri = path.as_ref().to_string_lossy().into_owned();
        self.queue.submit(move || importer.import(&FsContentSource, &uri))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LISTING
    // ═══════════════════════════════════════════════════════════════════════

    /// All records in insertion order
    pub fn files(&self) -> VaultResult<Vec<FileRecord>> {
        self.metadata.list()
    }

    /// Record by id
    pub fn file(&self, id: i64) -> VaultResult<FileRecord> {
        self.metadata.get(id)
    }

    /// Live list of records, re-sent after every change
    pub fn subscribe(&self) -> VaultResult<crossbeam_channel::Receiver<Vec<FileRecord>>> {
        self.metadata.subscribe()
    }

    /// Presenter subscribed to the file list
    pub fn presenter(&self) -> VaultResult<ListPresenter> {
        ListPresenter::new(&self.metadata)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // VIEWING
    // ═══════════════════════════════════════════════════════════════════════

    /// Render a record by id
    pub fn view(&self, id: i64) -> VaultResult<Rendered> {
        let record = self.metadata.get(id)?;
        Ok(self.viewer.display(&record))
    }

    /// Render a record already in hand
    pub fn view_record(&self, record: &FileRecord) -> Rendered {
        self.viewer.display(record)
    }

    /// Delete plaintext playback files
    pub fn clear_temp_files(&self) {
        self.viewer.clear_temp_files();
    }

    /// Write the decrypted content of a record to `out`
    pub fn export<W: Write + ?Sized>(&self, id: i64, out: &mut W) -> VaultResult<u64> {
        let record = self.metadata.get(id)?;
        self.blobs.copy_to(&record.stored_path, out)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DELETION
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete a record, and its blob once nothing else points at it.
    /// Returns whether the record existed.
    pub fn delete(&self, id: i64) -> VaultResult<bool> {
        // The reference check and unlink must not interleave with an import commit
        let _commits = self.importer.lock_commits();

        let record = match self.metadata.get(id) {
            Ok(r) => r,
            Err(VaultError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if !self.metadata.delete(id)? {
            return Ok(false);
        }

        if self.metadata.count_by_path(&record.stored_path)? == 0 {
            self.blobs.delete(&record.stored_path)?;
            log::info!("deleted record {} and blob {}", id, record.stored_path);
        } else {
            log::info!("deleted record {}; blob {} still referenced", id, record.stored_path);
        }

        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATS
    // ═══════════════════════════════════════════════════════════════════════

    /// Record and blob counts plus encrypted bytes on disk
    pub fn stats(&self) -> VaultResult<VaultStats> {
        Ok(VaultStats {
            files: self.metadata.count()?,
            blobs: self.blobs.list()?.len() as u64,
            blob_bytes: self.blobs.disk_usage()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::MemoryKeyStore;
    use std::time::Duration;
    use tempfile::tempdir;

    fn open(dir: &Path) -> MediaVault {
        MediaVault::open(VaultConfig::with_data_dir(dir)).unwrap()
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());

        assert!(dir.path().join("files").is_dir());
        assert!(dir.path().join("cache").is_dir());
        assert!(dir.path().join("app_database.db").is_file());
        assert!(dir.path().join("master_key.json").is_file());
        let fingerprint = vault.key_fingerprint();
        drop(vault);

        // Same key on reopen
        assert_eq!(open(dir.path()).key_fingerprint(), fingerprint);
    }

    #[test]
    fn test_import_export_delete() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let src = dir.path().join("note.gif");
        fs::write(&src, b"GIF89a data").unwrap();

        let record = vault.import_file(&src).unwrap();
        assert_eq!(record.extension, "gif");

        let mut out = Vec::new();
        vault.export(record.id, &mut out).unwrap();
        assert_eq!(out, b"GIF89a data");

        assert!(vault.delete(record.id).unwrap());
        assert!(!vault.delete(record.id).unwrap());
        assert_eq!(vault.stats().unwrap(), VaultStats { files: 0, blobs: 0, blob_bytes: 0 });
    }

    #[test]
    fn test_shared_blob_survives_first_delete() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let src = dir.path().join("a.png");
        fs::write(&src, b"one").unwrap();

        let first = vault.import_file(&src).unwrap();
        let second = vault.import_file(&src).unwrap();
        assert_eq!(vault.stats().unwrap().blobs, 1);

        vault.delete(first.id).unwrap();
        assert_eq!(vault.stats().unwrap().blobs, 1);
        vault.delete(second.id).unwrap();
        assert_eq!(vault.stats().unwrap().blobs, 0);
    }

    #[test]
    fn test_background_import() {
        let dir = tempdir().unwrap();
        let vault = MediaVault::open_with_key_store(
            VaultConfig::with_data_dir(dir.path().join("data")),
            &MemoryKeyStore::new(),
        )
        .unwrap();
        let src = dir.path().join("clip.mp4");
        fs::write(&src, vec![9u8; 12_000]).unwrap();

        let pending = vault.import_in_background(&src);
        let record = pending
            .wait_timeout(Duration::from_secs(10))
            .unwrap()
            .expect("import finished")
            .unwrap();
        assert_eq!(vault.file(record.id).unwrap(), record);
        assert!(!dir.path().join("data").join("master_key.json").exists());
    }

    #[test]
    fn test_delete_waits_for_import_commit() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let src = dir.path().join("a.png");
        fs::write(&src, b"old").unwrap();
        let old = vault.import_file(&src).unwrap();

        std::thread::scope(|s| {
            // Stand in for an import that is between blob commit and record insert
            let commits = vault.importer.lock_commits();
            let deleter = s.spawn(|| vault.delete(old.id).unwrap());

            std::thread::sleep(Duration::from_millis(50));
            assert!(!deleter.is_finished());
            assert!(vault.file(old.id).is_ok());

            vault.blobs.write("a.png", &mut &b"new"[..]).unwrap();
            let new = vault
                .metadata
                .insert(crate::metadata::NewFileRecord {
                    name: "a.png".into(),
                    stored_path: "a.png".into(),
                    extension: "png".into(),
                })
                .unwrap();
            drop(commits);

            assert!(deleter.join().unwrap());

            // The fresh record keeps its blob
            let mut out = Vec::new();
            vault.export(new.id, &mut out).unwrap();
            assert_eq!(out, b"new");
        });
    }

    #[test]
    fn test_background_import_and_delete_keep_records_readable() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        let src = dir.path().join("a.png");
        fs::write(&src, vec![3u8; 9_000]).unwrap();

        for _ in 0..20 {
            let existing = vault.import_file(&src).unwrap();
            let pending = vault.import_in_background(&src);
            vault.delete(existing.id).unwrap();
            let fresh = pending.wait().unwrap().unwrap();

            let mut out = Vec::new();
            vault.export(fresh.id, &mut out).unwrap();
            assert_eq!(out.len(), 9_000);
            vault.delete(fresh.id).unwrap();
        }
        assert_eq!(vault.stats().unwrap().blobs, 0);
    }

    #[test]
    fn test_view_unknown_id() {
        let dir = tempdir().unwrap();
        let vault = open(dir.path());
        assert!(matches!(vault.view(7), Err(VaultError::NotFound(_))));
    }
}
