//! Media Vault - Cryptographic Core
//!
//! One master key, HKDF-derived per-blob keys, AES-256-GCM segments.

pub mod keys;
pub mod streaming;

pub use keys::*;
pub use streaming::{
    is_authentication_error, open_bytes, seal_bytes, DecryptingReader, EncryptingWriter, SCHEME,
    SEGMENT_SIZE,
};
