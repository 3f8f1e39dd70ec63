//! Media Vault - Encrypted Blob Store
//!
//! One encrypted file per stored name inside a private directory. Each write
//! goes to its own temp file in the same directory and is persisted over the
//! final name only once the last segment is sealed and synced.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{Builder, NamedTempFile};
use walkdir::WalkDir;

use crate::crypto::{is_authentication_error, DecryptingReader, EncryptingWriter, MasterKey};
use crate::error::{VaultError, VaultResult};

/// Prefix of in-progress writes; reserved, never a blob name
const TEMP_PREFIX: &str = ".tmp-";

/// Decrypting reader over one blob
pub type BlobReader = DecryptingReader<BufReader<File>>;

/// Encrypted Blob Store
pub struct BlobStore {
    /// Root directory
    root: PathBuf,
    /// Master key shared by every blob
    key: Arc<MasterKey>,
    /// Read size for copy loops
    copy_chunk: usize,
}

impl BlobStore {
    /// Open (and create if needed) a blob store rooted at `root`
    pub fn new<P: AsRef<Path>>(
        root: P,
        key: Arc<MasterKey>,
        copy_chunk: usize,
    ) -> VaultResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            key,
            copy_chunk: copy_chunk.max(1),
        })
    }

    /// Directory holding the blobs
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a blob name to its path, rejecting anything that is not a plain file name
    pub fn path_of(&self, name: &str) -> VaultResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITE
    // ═══════════════════════════════════════════════════════════════════════

    /// Start writing a blob; nothing is visible under `name` until [`BlobWriter::commit`]
    pub fn create(&self, name: &str) -> VaultResult<BlobWriter> {
        let final_path = self.path_of(name)?;

        // Same directory as the blob so the final persist is a rename
        let temp = Builder::new().prefix(TEMP_PREFIX).tempfile_in(&self.root)?;
        let writer = EncryptingWriter::new(BufWriter::new(temp), &self.key, name.as_bytes())?;

        Ok(BlobWriter {
            writer: Some(writer),
            final_path,
        })
    }

    /// Copy `source` into an encrypted blob named `name`, returning plaintext bytes written.
    ///
    /// An existing blob with the same name is replaced.
    pub fn write<R: Read + ?Sized>(&self, name: &str, source: &mut R) -> VaultResult<u64> {
        let mut blob = self.create(name)?;
        // On error `blob` is dropped here, removing its temp file
        self.fill(&mut blob, source)?;

        let written = blob.commit()?;
        log::debug!("blob {} written ({} bytes)", name, written);
        Ok(written)
    }

    /// Copy `source` into an uncommitted blob in `copy_chunk` reads
    pub fn fill<R: Read + ?Sized>(
        &self,
        blob: &mut BlobWriter,
        source: &mut R,
    ) -> VaultResult<()> {
        let mut buffer = vec![0u8; self.copy_chunk];

        loop {
            let n = match source.read(&mut buffer) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            blob.write_all(&buffer[..n])?;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // READ
    // ═══════════════════════════════════════════════════════════════════════

    /// Open a decrypting reader over a blob
    pub fn open(&self, name: &str) -> VaultResult<BlobReader> {
        let path = self.path_of(name)?;

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        DecryptingReader::new(BufReader::new(file), &self.key, name.as_bytes())
    }

    /// Read and decrypt a whole blob
    pub fn read(&self, name: &str) -> VaultResult<Vec<u8>> {
        let mut reader = self.open(name)?;
        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| read_error(name, e))?;
        Ok(plaintext)
    }

    /// Decrypt a blob into `out`, returning plaintext bytes copied
    pub fn copy_to<W: Write + ?Sized>(&self, name: &str, out: &mut W) -> VaultResult<u64> {
        let mut reader = self.open(name)?;
        let mut buffer = vec![0u8; self.copy_chunk];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_error(name, e)),
            };
            out.write_all(&buffer[..n])?;
            total += n as u64;
        }

        out.flush()?;
        Ok(total)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HOUSEKEEPING
    // ═══════════════════════════════════════════════════════════════════════

    /// Check if blob exists
    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Delete blob, returning whether it existed
    pub fn delete(&self, name: &str) -> VaultResult<bool> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of committed blobs, sorted
    pub fn list(&self) -> VaultResult<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(TEMP_PREFIX) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Total bytes on disk under the blob root
    pub fn disk_usage(&self) -> VaultResult<u64> {
        let mut size = 0;

        for entry in WalkDir::new(&self.root).into_iter() {
            let entry = entry.map_err(|e| VaultError::Io(e.into()))?;
            if entry.file_type().is_file() {
                size += entry.metadata().map_err(|e| VaultError::Io(e.into()))?.len();
            }
        }

        Ok(size)
    }
}

/// In-progress encrypted write. Dropping it without [`commit`](Self::commit)
/// discards its temp file and leaves any previous blob untouched.
pub struct BlobWriter {
    writer: Option<EncryptingWriter<BufWriter<NamedTempFile>>>,
    final_path: PathBuf,
}

impl BlobWriter {
    /// Seal the last segment, sync, and move the blob into place
    pub fn commit(mut self) -> VaultResult<u64> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| VaultError::EncryptionFailed("blob writer already closed".into()))?;

        let (buffered, written) = writer.finish()?;
        let temp = buffered.into_inner().map_err(|e| VaultError::Io(e.into_error()))?;
        temp.as_file().sync_all()?;
        temp.persist(&self.final_path).map_err(|e| VaultError::Io(e.error))?;
        Ok(written)
    }
}

impl Write for BlobWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(w) => w.write(data),
            None => Err(io::Error::new(io::ErrorKind::Other, "blob writer closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Map an I/O error raised while reading decrypted data
pub(crate) fn read_error(name: &str, e: io::Error) -> VaultError {
    if is_authentication_error(&e) {
        VaultError::DecryptionFailed(format!("{}: {}", name, e))
    } else {
        VaultError::Io(e)
    }
}

fn validate_name(name: &str) -> VaultResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(TEMP_PREFIX);

    if bad {
        Err(VaultError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
