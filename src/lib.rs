//! # Media Vault
//!
//! Private, encrypted gallery for photos and videos.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        MEDIA VAULT                        │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────┐  │
//! │  │  IMPORT     │  │  VIEWER     │  │  LIST PRESENTER  │  │
//! │  │  + MIME     │  │  image/video│  │  (subscription)  │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬─────────┘  │
//! │         │                │                   │            │
//! │  ┌──────┴────────────────┴──┐  ┌─────────────┴─────────┐ │
//! │  │      BLOB STORE          │  │    METADATA STORE     │ │
//! │  │  AES256_GCM_HKDF_4KB     │  │    SQLite `files`     │ │
//! │  └────────────┬─────────────┘  └───────────────────────┘ │
//! │        ┌──────┴──────┐                                    │
//! │        │  KEY STORE  │  one master key, never rotated     │
//! │        └─────────────┘                                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Every blob encrypted with AES-256-GCM in 4 KiB authenticated segments
//! - Per-blob keys derived via HKDF from one master key, bound to the blob name
//! - Truncation and reordering detected by segment nonces
//! - Blobs replaced atomically; a failed import leaves nothing behind
//! - Metadata (names, types) stored in plaintext SQLite
//! - Videos decrypted to a cache file for playback, removed when the viewer drops

pub mod blob_store;
pub mod config;
pub mod crypto;
pub mod error;
pub mod import;
pub mod keystore;
pub mod metadata;
pub mod mime;
pub mod presenter;
pub mod vault;
pub mod viewer;
pub mod worker;

#[cfg(feature = "android")]
pub mod android;

pub use blob_store::BlobStore;
pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use import::{ContentSource, FsContentSource, Importer, SourceDetails};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use metadata::{FileRecord, MetadataStore, NewFileRecord};
pub use presenter::{ListPresenter, ListView};
pub use vault::{MediaVault, VaultStats};
pub use viewer::{EmptyReason, MediaKind, Rendered, Viewer};

/// Media Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
