//! Media Vault - Viewer
//!
//! Turns a file record into something displayable: a decoded image or a
//! plaintext temp file for a video player. Failures render as nothing.

use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};
use parking_lot::Mutex;
use tempfile::{Builder, NamedTempFile};

use crate::blob_store::BlobStore;
use crate::error::{VaultError, VaultResult};
use crate::metadata::FileRecord;

/// Temp file naming for video playback
const VIDEO_TEMP_PREFIX: &str = "temp_video";
const VIDEO_TEMP_SUFFIX: &str = ".mp4";

/// Largest zero buffer used when wiping a temp file
const WIPE_CHUNK: usize = 1024 * 1024;

/// Broad media class of an extension tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

impl MediaKind {
    /// Classify an extension, ignoring case
    pub fn classify(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" => MediaKind::Image,
            "mp4" | "avi" => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }
}

/// Why nothing was rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Blob is gone
    Missing,
    /// Blob failed authentication
    Undecryptable,
    /// Image bytes could not be decoded
    Undecodable,
    /// Neither image nor video
    Unsupported,
    /// Filesystem failure
    Io,
}

/// Viewer output
#[derive(Debug)]
pub enum Rendered {
    Image {
        width: u32,
        height: u32,
        format: Option<ImageFormat>,
        image: DynamicImage,
    },
    Video {
        path: PathBuf,
        len: u64,
    },
    Empty(EmptyReason),
}

impl Rendered {
    pub fn is_empty(&self) -> bool {
        matches!(self, Rendered::Empty(_))
    }
}

/// Viewer
pub struct Viewer {
    blobs: Arc<BlobStore>,
    cache_dir: PathBuf,
    /// Plaintext video copies, deleted on drop
    temp_files: Mutex<Vec<NamedTempFile>>,
}

impl Viewer {
    pub fn new<P: AsRef<Path>>(blobs: Arc<BlobStore>, cache_dir: P) -> VaultResult<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            blobs,
            cache_dir,
            temp_files: Mutex::new(Vec::new()),
        })
    }

    /// Render a record. Never fails; problems are logged and render as empty.
    pub fn display(&self, record: &FileRecord) -> Rendered {
        let result = match MediaKind::classify(&record.extension) {
            MediaKind::Image => self.render_image(&record.stored_path),
            MediaKind::Video => self.render_video(&record.stored_path),
            MediaKind::Unknown => {
                log::debug!(
                    "record {} has unsupported type {:?}",
                    record.id,
                    record.extension
                );
                return Rendered::Empty(EmptyReason::Unsupported);
            }
        };

        match result {
            Ok(rendered) => rendered,
            Err(e) => {
                log::warn!("cannot display record {} ({}): {}", record.id, record.name, e);
                Rendered::Empty(empty_reason(&e))
            }
        }
    }

    fn render_image(&self, name: &str) -> VaultResult<Rendered> {
        let bytes = self.blobs.read(name)?;
        let format = image::guess_format(&bytes).ok();
        let image = image::load_from_memory(&bytes)?;
        let (width, height) = image.dimensions();

        Ok(Rendered::Image {
            width,
            height,
            format,
            image,
        })
    }

    fn render_video(&self, name: &str) -> VaultResult<Rendered> {
        let mut temp = Builder::new()
            .prefix(VIDEO_TEMP_PREFIX)
            .suffix(VIDEO_TEMP_SUFFIX)
            .tempfile_in(&self.cache_dir)?;

        // On error `temp` is dropped and deleted
        let len = self.blobs.copy_to(name, temp.as_file_mut())?;
        let path = temp.path().to_path_buf();
        log::debug!("decrypted {} to {} for playback", name, path.display());

        self.temp_files.lock().push(temp);
        Ok(Rendered::Video { path, len })
    }

    /// Number of live temp files
    pub fn temp_file_count(&self) -> usize {
        self.temp_files.lock().len()
    }

    /// Delete every plaintext temp file created so far
    pub fn clear_temp_files(&self) {
        let files: Vec<_> = self.temp_files.lock().drain(..).collect();
        for mut file in files {
            let path = file.path().to_path_buf();
            if let Err(e) = wipe(file.as_file_mut()) {
                log::warn!("could not overwrite {}: {}", path.display(), e);
            }
            if let Err(e) = file.close() {
                log::warn!("could not remove {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.clear_temp_files();
    }
}

/// Overwrite the whole file with zeros
fn wipe(file: &mut fs::File) -> io::Result<()> {
    let mut remaining = file.metadata()?.len();
    if remaining == 0 {
        return Ok(());
    }

    let zeros = vec![0u8; (remaining as usize).min(WIPE_CHUNK)];
    file.seek(SeekFrom::Start(0))?;
    while remaining > 0 {
        let n = remaining.min(zeros.len() as u64) as usize;
        file.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()
}

fn empty_reason(e: &VaultError) -> EmptyReason {
    match e {
        VaultError::NotFound(_) => EmptyReason::Missing,
        VaultError::DecryptionFailed(_) => EmptyReason::Undecryptable,
        VaultError::ImageError(_) => EmptyReason::Undecodable,
        _ => EmptyReason::Io,
    }
}
