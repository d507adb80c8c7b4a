//! Crypto provider seam and the in-process software implementation.
//!
//! Mobile builds hand metadata crypto to a native module running off
//! the main context; the core only ever awaits results. Everything
//! downstream (codec, propagation engine) is written against
//! [`CryptoProvider`] so tests can substitute counting or failing
//! providers.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use cvault_core::{CvaultError, CvaultResult};

use crate::{KEY_SIZE, METADATA_VERSION, NONCE_SIZE};

/// Size of an AES-KW-wrapped 256-bit key (32 + 8 padding bytes).
const WRAPPED_KEY_SIZE: usize = KEY_SIZE + 8;

#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Symmetric metadata encryption under a string key.
    async fn encrypt_metadata(&self, plaintext: &str, key: &str) -> CvaultResult<String>;

    /// Inverse of [`encrypt_metadata`](Self::encrypt_metadata). Fails on
    /// wrong key or corrupted ciphertext.
    async fn decrypt_metadata(&self, ciphertext: &str, key: &str) -> CvaultResult<String>;

    /// Seal metadata for a recipient identified by their public key.
    async fn encrypt_metadata_public_key(
        &self,
        plaintext: &str,
        public_key: &str,
    ) -> CvaultResult<String>;

    /// Open a sealed blob with the recipient's private key.
    async fn decrypt_metadata_private_key(
        &self,
        ciphertext: &str,
        private_key: &str,
    ) -> CvaultResult<String>;

    /// Hex digest used for hashed names and request checksums.
    async fn hash(&self, input: &str) -> CvaultResult<String>;

    /// Password-based key derivation (hex output).
    async fn derive_key_from_password(&self, password: &str, salt: &str) -> CvaultResult<String>;

    async fn generate_uuid(&self) -> String;

    /// Random alphanumeric string, used for link keys and salts.
    async fn generate_random_string(&self, len: usize) -> String;
}

/// A generated X25519 keypair, both halves base64-encoded.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

/// Pure-Rust provider. Formats:
///
/// - symmetric: `"003" + base64(nonce[24] || xchacha20poly1305_ct)`,
///   key material derived from the string key via HKDF-SHA256;
/// - sealed box: `base64(ephemeral_pub[32] || aeskw_wrapped_mk[40] ||
///   nonce[24] || ct)` — ECDH against the recipient key, AES-KW wraps a
///   fresh message key, the message key encrypts the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCrypto;

impl SoftwareCrypto {
    pub fn new() -> Self {
        SoftwareCrypto
    }

    /// Generate a fresh X25519 keypair for a new account/device.
    pub fn generate_keypair() -> Keypair {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Keypair {
            public_key: BASE64.encode(public.as_bytes()),
            private_key: BASE64.encode(secret.to_bytes()),
        }
    }

    /// HKDF-SHA256 a UTF-8 string key down to 256 bits of key material.
    fn derive_symmetric_key(key: &str) -> CvaultResult<[u8; KEY_SIZE]> {
        let hkdf = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut okm = [0u8; KEY_SIZE];
        hkdf.expand(b"cvault-metadata", &mut okm)
            .map_err(|e| CvaultError::Crypto(format!("HKDF expand failed: {e}")))?;
        Ok(okm)
    }

    fn seal_symmetric(plaintext: &[u8], key_bytes: &[u8; KEY_SIZE]) -> CvaultResult<String> {
        let cipher = XChaCha20Poly1305::new(key_bytes.into());
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ct = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CvaultError::Crypto(format!("metadata encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ct.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ct);
        Ok(format!("{METADATA_VERSION}{}", BASE64.encode(out)))
    }

    fn open_symmetric(ciphertext: &str, key_bytes: &[u8; KEY_SIZE]) -> CvaultResult<Vec<u8>> {
        let raw = ciphertext
            .strip_prefix(METADATA_VERSION)
            .ok_or_else(|| CvaultError::Crypto("unknown metadata version".into()))?;
        let raw = BASE64
            .decode(raw)
            .map_err(|e| CvaultError::Crypto(format!("base64 decode failed: {e}")))?;
        if raw.len() <= NONCE_SIZE {
            return Err(CvaultError::Crypto("ciphertext too short".into()));
        }

        let (nonce_bytes, ct) = raw.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new(key_bytes.into());
        cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ct)
            .map_err(|_| CvaultError::Crypto("metadata decryption failed: wrong key or corrupted data".into()))
    }

    fn decode_key32(encoded: &str, what: &str) -> CvaultResult<[u8; KEY_SIZE]> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CvaultError::Crypto(format!("{what} decode failed: {e}")))?;
        if bytes.len() != KEY_SIZE {
            return Err(CvaultError::Crypto(format!(
                "{what} has wrong size: {} bytes (expected {KEY_SIZE})",
                bytes.len()
            )));
        }
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}

#[async_trait]
impl CryptoProvider for SoftwareCrypto {
    async fn encrypt_metadata(&self, plaintext: &str, key: &str) -> CvaultResult<String> {
        let mut key_bytes = Self::derive_symmetric_key(key)?;
        let result = Self::seal_symmetric(plaintext.as_bytes(), &key_bytes);
        key_bytes.zeroize();
        result
    }

    async fn decrypt_metadata(&self, ciphertext: &str, key: &str) -> CvaultResult<String> {
        let mut key_bytes = Self::derive_symmetric_key(key)?;
        let result = Self::open_symmetric(ciphertext, &key_bytes);
        key_bytes.zeroize();
        let plaintext = result?;
        String::from_utf8(plaintext)
            .map_err(|e| CvaultError::Crypto(format!("decrypted metadata is not UTF-8: {e}")))
    }

    async fn encrypt_metadata_public_key(
        &self,
        plaintext: &str,
        public_key: &str,
    ) -> CvaultResult<String> {
        let recipient = PublicKey::from(Self::decode_key32(public_key, "public key")?);

        // Ephemeral ECDH; the ephemeral secret never leaves this scope.
        let ephemeral = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let ephemeral_pub = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient);

        // Fresh message key, wrapped under the shared secret.
        let mut message_key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut message_key);

        let kek = aes_kw::KekAes256::from(*shared.as_bytes());
        let wrapped = kek
            .wrap_vec(&message_key)
            .map_err(|_| CvaultError::Crypto("AES-KW wrap failed".into()))?;

        let cipher = XChaCha20Poly1305::new((&message_key).into());
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ct = cipher
            .encrypt(XNonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CvaultError::Crypto(format!("sealed-box encryption failed: {e}")))?;
        message_key.zeroize();

        let mut out = Vec::with_capacity(KEY_SIZE + wrapped.len() + NONCE_SIZE + ct.len());
        out.extend_from_slice(ephemeral_pub.as_bytes());
        out.extend_from_slice(&wrapped);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ct);
        Ok(BASE64.encode(out))
    }

    async fn decrypt_metadata_private_key(
        &self,
        ciphertext: &str,
        private_key: &str,
    ) -> CvaultResult<String> {
        let secret = StaticSecret::from(Self::decode_key32(private_key, "private key")?);

        let raw = BASE64
            .decode(ciphertext)
            .map_err(|e| CvaultError::Crypto(format!("base64 decode failed: {e}")))?;
        if raw.len() <= KEY_SIZE + WRAPPED_KEY_SIZE + NONCE_SIZE {
            return Err(CvaultError::Crypto("sealed box too short".into()));
        }

        let (eph_bytes, rest) = raw.split_at(KEY_SIZE);
        let (wrapped, rest) = rest.split_at(WRAPPED_KEY_SIZE);
        let (nonce_bytes, ct) = rest.split_at(NONCE_SIZE);

        let mut eph = [0u8; KEY_SIZE];
        eph.copy_from_slice(eph_bytes);
        let shared = secret.diffie_hellman(&PublicKey::from(eph));

        let kek = aes_kw::KekAes256::from(*shared.as_bytes());
        let mut message_key_vec = kek
            .unwrap_vec(wrapped)
            .map_err(|_| CvaultError::Crypto("AES-KW unwrap failed: wrong key or corrupted data".into()))?;
        if message_key_vec.len() != KEY_SIZE {
            message_key_vec.zeroize();
            return Err(CvaultError::Crypto("unwrapped message key has wrong size".into()));
        }
        let mut message_key = [0u8; KEY_SIZE];
        message_key.copy_from_slice(&message_key_vec);
        message_key_vec.zeroize();

        let cipher = XChaCha20Poly1305::new((&message_key).into());
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ct)
            .map_err(|_| CvaultError::Crypto("sealed-box decryption failed".into()));
        message_key.zeroize();

        String::from_utf8(plaintext?)
            .map_err(|e| CvaultError::Crypto(format!("decrypted metadata is not UTF-8: {e}")))
    }

    async fn hash(&self, input: &str) -> CvaultResult<String> {
        let mut hasher = Sha512::new();
        hasher.update(input.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    async fn derive_key_from_password(&self, password: &str, salt: &str) -> CvaultResult<String> {
        // Argon2id with a digest of the textual salt; 512-bit hex output
        // matches what the auth flow stores server-side.
        let salt_bytes = Sha256::digest(salt.as_bytes());
        let mut out = [0u8; 64];
        argon2::Argon2::default()
            .hash_password_into(password.as_bytes(), &salt_bytes, &mut out)
            .map_err(|e| CvaultError::Crypto(format!("password KDF failed: {e}")))?;
        let encoded = hex::encode(out);
        out.zeroize();
        Ok(encoded)
    }

    async fn generate_uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn generate_random_string(&self, len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}
