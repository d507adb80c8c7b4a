//! cvault-crypto: client-side E2E encryption for CloudVault metadata.
//!
//! Three keyspaces cover every metadata blob the server ever sees:
//!
//! ```text
//! Master key ring (per account, newest last, grows on password change)
//!   └── metadata blobs the owner reads back (file metadata, folder names,
//!       wrapped public-link keys)
//! Recipient keypair (X25519)
//!   └── blobs pushed to sharing recipients (ECDH + AES-KW sealed box)
//! Public-link key (random 32-char string, wrapped under the master ring)
//!   └── blobs readable by anyone holding the link
//! ```
//!
//! The [`provider::CryptoProvider`] trait is the seam to the platform's
//! native crypto; [`provider::SoftwareCrypto`] is the in-process
//! implementation. [`metadata::MetadataCodec`] layers caching and the
//! multi-key decryption rules on top.

pub mod keyring;
pub mod metadata;
pub mod provider;

pub use keyring::MasterKeyRing;
pub use metadata::MetadataCodec;
pub use provider::{CryptoProvider, SoftwareCrypto};

/// Symmetric key size in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size.
pub const NONCE_SIZE: usize = 24;

/// Version tag prefixed to symmetric metadata ciphertext.
pub const METADATA_VERSION: &str = "003";

/// Length of a freshly generated public-link key.
pub const LINK_KEY_LEN: usize = 32;

/// Minimum plausible length for an unwrapped public-link key; anything
/// shorter is treated as a failed decryption.
pub const MIN_LINK_KEY_LEN: usize = 16;
