//! Media Vault - Import Pipeline
//!
//! Copies a picked source into the blob store, then records it. Nothing is
//! recorded unless the encrypted copy committed.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::blob_store::BlobStore;
use crate::error::{VaultError, VaultResult};
use crate::metadata::{FileRecord, MetadataStore, NewFileRecord};
use crate::mime;

/// Bytes read from a file head for MIME sniffing
const SNIFF_LEN: usize = 32;

/// What a source can tell about an item before it is opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDetails {
    pub display_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Somewhere imports come from
pub trait ContentSource: Send + Sync {
    /// Name and type of the item at `uri`
    fn details(&self, uri: &str) -> VaultResult<SourceDetails>;

    /// Open the item for reading
    fn open(&self, uri: &str) -> VaultResult<Box<dyn Read + Send>>;
}

/// Local filesystem source; `uri` is a path
#[derive(Debug, Clone, Copy, Default)]
pub struct FsContentSource;

impl FsContentSource {
    fn sniff(path: &Path) -> Option<&'static str> {
        let mut head = [0u8; SNIFF_LEN];
        let mut file = File::open(path).ok()?;
        let mut filled = 0;
        while filled < head.len() {
            match file.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return None,
            }
        }
        mime::sniff_mime(&head[..filled])
    }
}

impl ContentSource for FsContentSource {
    fn details(&self, uri: &str) -> VaultResult<SourceDetails> {
        let path = Path::new(uri);
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime::mime_for_extension)
            .or_else(|| Self::sniff(path))
            .map(str::to_string);

        Ok(SourceDetails {
            display_name,
            mime_type,
        })
    }

    fn open(&self, uri: &str) -> VaultResult<Box<dyn Read + Send>> {
        match File::open(uri) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) => Err(source_error(uri, e)),
        }
    }
}

/// Map an error raised while opening a source
pub(crate) fn source_error(uri: &str, e: io::Error) -> VaultError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => VaultError::PermissionDenied(uri.to_string()),
        io::ErrorKind::NotFound => VaultError::NotFound(uri.to_string()),
        _ => VaultError::Io(e),
    }
}

/// Last non-empty `/`-separated segment of a uri
fn last_path_segment(uri: &str) -> Option<&str> {
    uri.rsplit('/').find(|s| !s.is_empty())
}

/// Import Pipeline
#[derive(Clone)]
pub struct Importer {
    blobs: Arc<BlobStore>,
    metadata: Arc<MetadataStore>,
    /// Held from blob commit until its record is inserted
    commits: Arc<Mutex<()>>,
}

impl Importer {
    /// Importer writing into `blobs` and recording into `metadata`
    pub fn new(blobs: Arc<BlobStore>, metadata: Arc<MetadataStore>) -> Self {
        Self {
            blobs,
            metadata,
            commits: Arc::new(Mutex::new(())),
        }
    }

    /// Block imports from publishing a blob and its record until the guard drops
    pub fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commits.lock()
    }

    /// Encrypt the item at `uri` into the vault and record it.
    ///
    /// An item whose display name matches an earlier import replaces that
    /// blob; both records then point at the new content.
    pub fn import(&self, source: &dyn ContentSource, uri: &str) -> VaultResult<FileRecord> {
        let details = source.details(uri)?;

        let name = details
            .display_name
            .filter(|n| !n.is_empty())
            .or_else(|| last_path_segment(uri).map(str::to_string))
            .ok_or_else(|| VaultError::InvalidName(uri.to_string()))?;

        let extension = details
            .mime_type
            .as_deref()
            .and_then(mime::extension_for_mime)
            .unwrap_or("")
            .to_string();

        let mut reader = source.open(uri)?;
        let mut blob = self.blobs.create(&name)?;
        self.blobs.fill(&mut blob, &mut reader).map_err(|e| {
            log::warn!("import of {} aborted: {}", uri, e);
            e
        })?;

        // A concurrent delete must not see the new blob without its record
        let _commit = self.commits.lock();
        let written = blob.commit()?;
        let record = self.metadata.insert(NewFileRecord {
            name: name.clone(),
            stored_path: name,
            extension,
        })?;

        log::info!(
            "imported {} as record {} ({} bytes)",
            record.name,
            record.id,
            written
        );
        Ok(record)
    }
}
