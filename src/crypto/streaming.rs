//! Media Vault - Segmented Streaming AEAD
//!
//! Blob format (`AES256_GCM_HKDF_4KB`):
//! ```text
//! [HEADER_LEN 1B][40]
//! [SALT 32B][random per blob]
//! [NONCE_PREFIX 7B][random per blob]
//! [SEGMENT 0][<= 4056B: ciphertext + 16B tag]
//! [SEGMENT i][<= 4096B: ciphertext + 16B tag]
//! ```
//!
//! Each blob gets its own AES-256-GCM key:
//! `HKDF-SHA256(ikm = master key, salt = SALT, info = blob name)`.
//!
//! Segment nonce is `NONCE_PREFIX || segment index (u32 BE) || last flag`.
//! The final segment is sealed with flag `1`, so a stream cut at any point,
//! including a segment boundary, fails to authenticate.

use std::io::{self, Read, Write};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use super::keys::{derive_key, random_bytes, MasterKey, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

/// Size of one ciphertext segment on disk
pub const SEGMENT_SIZE: usize = 4096;

/// HKDF salt length
pub const SALT_LEN: usize = 32;

/// Per-blob nonce prefix length
pub const NONCE_PREFIX_LEN: usize = 7;

/// Header length, including the length byte itself
pub const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_PREFIX_LEN;

/// Scheme identifier, recorded next to the persisted key
pub const SCHEME: &str = "AES256_GCM_HKDF_4KB";

/// Plaintext bytes carried by segment `index`
fn plaintext_segment_len(index: u32) -> usize {
    ciphertext_segment_len(index) - TAG_LEN
}

/// Ciphertext bytes occupied by segment `index` when it is full
fn ciphertext_segment_len(index: u32) -> usize {
    if index == 0 {
        SEGMENT_SIZE - HEADER_LEN
    } else {
        SEGMENT_SIZE
    }
}

fn segment_nonce(prefix: &[u8; NONCE_PREFIX_LEN], index: u32, last: bool) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..NONCE_LEN - 1].copy_from_slice(&index.to_be_bytes());
    nonce[NONCE_LEN - 1] = u8::from(last);
    nonce
}

fn segment_cipher(master: &MasterKey, salt: &[u8], aad: &[u8]) -> VaultResult<Aes256Gcm> {
    let key = derive_key(master.expose(), salt, aad)?;
    Aes256Gcm::new_from_slice(&*key).map_err(|e| VaultError::EncryptionFailed(e.to_string()))
}

/// Marker error carried inside `io::Error` when a segment fails to authenticate
#[derive(Debug)]
pub struct AuthenticationFailed {
    segment: u32,
}

impl std::fmt::Display for AuthenticationFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "segment {} failed authentication", self.segment)
    }
}

impl std::error::Error for AuthenticationFailed {}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// ENCRYPTION
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypting `Write` adapter.
///
/// Plaintext is buffered until a full segment is known not to be the last
/// one. Call [`EncryptingWriter::finish`] to seal the final segment; a writer
/// dropped without `finish` leaves a stream that will not decrypt.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    cipher: Aes256Gcm,
    nonce_prefix: [u8; NONCE_PREFIX_LEN],
    segment: u32,
    buffer: Vec<u8>,
    plaintext_len: u64,
}

impl<W: Write> EncryptingWriter<W> {
    /// Start a new stream bound to `aad` (the blob name)
    pub fn new(inner: W, master: &MasterKey, aad: &[u8]) -> VaultResult<Self> {
        Self::with_header(inner, master, aad, random_bytes(), random_bytes())
    }

    pub(crate) fn with_header(
        mut inner: W,
        master: &MasterKey,
        aad: &[u8],
        salt: [u8; SALT_LEN],
        nonce_prefix: [u8; NONCE_PREFIX_LEN],
    ) -> VaultResult<Self> {
        let cipher = segment_cipher(master, &salt, aad)?;

        inner.write_all(&[HEADER_LEN as u8])?;
        inner.write_all(&salt)?;
        inner.write_all(&nonce_prefix)?;

        Ok(Self {
            inner,
            cipher,
            nonce_prefix,
            segment: 0,
            buffer: Vec::with_capacity(plaintext_segment_len(0)),
            plaintext_len: 0,
        })
    }

    fn seal_segment(&mut self, last: bool) -> io::Result<()> {
        let nonce = segment_nonce(&self.nonce_prefix, self.segment, last);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), self.buffer.as_slice())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "segment encryption failed"))?;

        self.inner.write_all(&sealed)?;
        self.buffer.clear();

        if !last {
            self.segment = self
                .segment
                .checked_add(1)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "too many segments"))?;
        }
        Ok(())
    }

    /// Seal the final segment, flush, and hand back the inner writer
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        self.seal_segment(true)?;
        self.inner.flush()?;
        Ok((self.inner, self.plaintext_len))
    }

    /// Plaintext bytes accepted so far
    pub fn plaintext_len(&self) -> u64 {
        self.plaintext_len
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut rest = data;

        while !rest.is_empty() {
            let capacity = plaintext_segment_len(self.segment);

            // More data is coming, so a full buffer is not the last segment
            if self.buffer.len() == capacity {
                self.seal_segment(false)?;
                continue;
            }

            let take = (capacity - self.buffer.len()).min(rest.len());
            self.buffer.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
        }

        self.plaintext_len += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DECRYPTION
// ═══════════════════════════════════════════════════════════════════════════

/// Decrypting `Read` adapter.
///
/// Authentication failures surface as `io::ErrorKind::InvalidData`; see
/// [`is_authentication_error`].
pub struct DecryptingReader<R: Read> {
    inner: R,
    cipher: Aes256Gcm,
    nonce_prefix: [u8; NONCE_PREFIX_LEN],
    segment: u32,
    lookahead: Option<u8>,
    plaintext: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> DecryptingReader<R> {
    /// Read the header and prepare to decrypt a stream bound to `aad`
    pub fn new(mut inner: R, master: &MasterKey, aad: &[u8]) -> VaultResult<Self> {
        let mut header = [0u8; HEADER_LEN];
        inner.read_exact(&mut header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => VaultError::DecryptionFailed("stream too short".into()),
            _ => VaultError::Io(e),
        })?;

        if header[0] as usize != HEADER_LEN {
            return Err(VaultError::DecryptionFailed(format!(
                "unexpected header length {}",
                header[0]
            )));
        }

        let salt = &header[1..1 + SALT_LEN];
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        nonce_prefix.copy_from_slice(&header[1 + SALT_LEN..]);

        Ok(Self {
            inner,
            cipher: segment_cipher(master, salt, aad)?,
            nonce_prefix,
            segment: 0,
            lookahead: None,
            plaintext: Vec::new(),
            pos: 0,
            finished: false,
        })
    }

    /// Read until `buf` holds `target` bytes or the source is exhausted
    fn fill(&mut self, buf: &mut Vec<u8>, target: usize) -> io::Result<()> {
        let mut chunk = [0u8; 1024];
        while buf.len() < target {
            let want = (target - buf.len()).min(chunk.len());
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn peek_next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut next = [0u8; 1];
        loop {
            match self.inner.read(&mut next) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(next[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn open_next_segment(&mut self) -> io::Result<()> {
        let target = ciphertext_segment_len(self.segment);
        let mut sealed = Vec::with_capacity(target);
        if let Some(b) = self.lookahead.take() {
            sealed.push(b);
        }
        self.fill(&mut sealed, target)?;

        // A short segment ends the stream; a full one is last only at EOF
        let last = if sealed.len() < target {
            true
        } else {
            match self.peek_next_byte()? {
                None => true,
                Some(b) => {
                    self.lookahead = Some(b);
                    false
                }
            }
        };

        if sealed.len() < TAG_LEN {
            return Err(invalid_data("truncated segment"));
        }

        let nonce = segment_nonce(&self.nonce_prefix, self.segment, last);
        let opened = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    AuthenticationFailed { segment: self.segment },
                )
            })?;

        self.plaintext = opened;
        self.pos = 0;
        self.finished = last;
        if !last {
            self.segment = self
                .segment
                .checked_add(1)
                .ok_or_else(|| invalid_data("too many segments"))?;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.pos == self.plaintext.len() {
            if self.finished {
                return Ok(0);
            }
            self.open_next_segment()?;
        }

        let n = (self.plaintext.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.plaintext[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Whether an I/O error from [`DecryptingReader`] means the data did not authenticate
pub fn is_authentication_error(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::InvalidData
}

/// Encrypt a whole buffer (small payloads and tests)
pub fn seal_bytes(master: &MasterKey, aad: &[u8], plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let mut writer = EncryptingWriter::new(Vec::new(), master, aad)?;
    writer.write_all(plaintext)?;
    let (sealed, _) = writer.finish()?;
    Ok(sealed)
}

/// Decrypt a whole buffer produced by [`seal_bytes`] or [`EncryptingWriter`]
pub fn open_bytes(master: &MasterKey, aad: &[u8], sealed: &[u8]) -> VaultResult<Vec<u8>> {
    let mut reader = DecryptingReader::new(sealed, master, aad)?;
    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext).map_err(|e| {
        if is_authentication_error(&e) {
            VaultError::DecryptionFailed(e.to_string())
        } else {
            VaultError::Io(e)
        }
    })?;
    Ok(plaintext)
}
