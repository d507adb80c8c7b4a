//! Metadata codec: encrypt/decrypt file and folder metadata across the
//! three keyspaces, with per-entity caching.
//!
//! Decryption is fail-soft throughout: a blob that no key can open
//! resolves to an empty-name object, never an error. Callers must treat
//! an empty `name` as "undecryptable", not as valid data.
//!
//! Cache keys always include the ciphertext itself, not just the uuid:
//! after a key rotation the same item carries a different blob, and a
//! uuid-only key would silently serve stale plaintext.

use std::sync::Arc;

use tracing::debug;

use cvault_core::cache::KeyValueCache;
use cvault_core::time::{convert_timestamp_to_ms, unix_timestamp_ms};
use cvault_core::types::{
    FileMetadata, FolderMetadata, DEFAULT_FOLDER_CIPHERTEXT, DEFAULT_FOLDER_NAME,
};
use cvault_core::CvaultResult;

use crate::keyring::MasterKeyRing;
use crate::provider::CryptoProvider;
use crate::MIN_LINK_KEY_LEN;

pub struct MetadataCodec {
    provider: Arc<dyn CryptoProvider>,
    cache: Arc<dyn KeyValueCache>,
}

impl MetadataCodec {
    pub fn new(provider: Arc<dyn CryptoProvider>, cache: Arc<dyn KeyValueCache>) -> Self {
        MetadataCodec { provider, cache }
    }

    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Symmetric metadata encryption; always uses the key the caller
    /// hands in (the newest master key, a link key, or a file key).
    pub async fn encrypt_metadata(&self, plaintext: &str, key: &str) -> CvaultResult<String> {
        self.provider.encrypt_metadata(plaintext, key).await
    }

    /// Decrypt owner-readable file metadata by trying the master key
    /// ring newest-first; the first key that yields valid metadata wins.
    pub async fn decrypt_file_metadata(
        &self,
        keys: &MasterKeyRing,
        ciphertext: &str,
        uuid: &str,
    ) -> FileMetadata {
        let cache_key = file_cache_key(uuid, ciphertext);
        if let Some(cached) = self.cached_file(&cache_key) {
            return cached;
        }

        for key in keys.iter_newest_first() {
            if let Ok(plaintext) = self.provider.decrypt_metadata(ciphertext, key).await {
                if let Some(meta) = parse_file_metadata(&plaintext) {
                    self.store_file(&cache_key, &meta);
                    return meta;
                }
            }
        }

        debug!(uuid, "file metadata undecryptable with current key ring");
        undecryptable_file()
    }

    /// Decrypt recipient-readable file metadata (shared-in items).
    pub async fn decrypt_file_metadata_private_key(
        &self,
        ciphertext: &str,
        private_key: &str,
        uuid: &str,
    ) -> FileMetadata {
        let cache_key = file_cache_key(uuid, ciphertext);
        if let Some(cached) = self.cached_file(&cache_key) {
            return cached;
        }

        if let Ok(plaintext) = self
            .provider
            .decrypt_metadata_private_key(ciphertext, private_key)
            .await
        {
            if let Some(meta) = parse_file_metadata(&plaintext) {
                self.store_file(&cache_key, &meta);
                return meta;
            }
        }

        debug!(uuid, "shared-in file metadata undecryptable");
        undecryptable_file()
    }

    /// Decrypt link-readable file metadata (public link listings).
    pub async fn decrypt_file_metadata_link(&self, ciphertext: &str, link_key: &str) -> FileMetadata {
        let cache_key = file_link_cache_key(ciphertext);
        if let Some(cached) = self.cached_file(&cache_key) {
            return cached;
        }

        if let Ok(plaintext) = self.provider.decrypt_metadata(ciphertext, link_key).await {
            if let Some(meta) = parse_file_metadata(&plaintext) {
                self.store_file(&cache_key, &meta);
                return meta;
            }
        }

        undecryptable_file()
    }

    /// Decrypt an owner-readable folder name. The literal `"default"`
    /// is the base folder sentinel and never touches the provider.
    pub async fn decrypt_folder_name(
        &self,
        keys: &MasterKeyRing,
        ciphertext: &str,
        uuid: &str,
    ) -> String {
        if is_default_sentinel(ciphertext) {
            return DEFAULT_FOLDER_NAME.to_string();
        }

        let cache_key = folder_cache_key(uuid, ciphertext);
        if let Some(name) = self.cached_folder(&cache_key) {
            return name;
        }

        for key in keys.iter_newest_first() {
            if let Ok(plaintext) = self.provider.decrypt_metadata(ciphertext, key).await {
                if let Some(name) = parse_folder_name(&plaintext) {
                    self.store_folder(&cache_key, &name);
                    return name;
                }
            }
        }

        debug!(uuid, "folder name undecryptable with current key ring");
        String::new()
    }

    pub async fn decrypt_folder_name_private_key(
        &self,
        private_key: &str,
        ciphertext: &str,
        uuid: &str,
    ) -> String {
        if is_default_sentinel(ciphertext) {
            return DEFAULT_FOLDER_NAME.to_string();
        }

        let cache_key = folder_cache_key(uuid, ciphertext);
        if let Some(name) = self.cached_folder(&cache_key) {
            return name;
        }

        if let Ok(plaintext) = self
            .provider
            .decrypt_metadata_private_key(ciphertext, private_key)
            .await
        {
            if let Some(name) = parse_folder_name(&plaintext) {
                self.store_folder(&cache_key, &name);
                return name;
            }
        }

        String::new()
    }

    pub async fn decrypt_folder_name_link(&self, ciphertext: &str, link_key: &str) -> String {
        if is_default_sentinel(ciphertext) {
            return DEFAULT_FOLDER_NAME.to_string();
        }

        let cache_key = folder_link_cache_key(ciphertext);
        if let Some(name) = self.cached_folder(&cache_key) {
            return name;
        }

        if let Ok(plaintext) = self.provider.decrypt_metadata(ciphertext, link_key).await {
            if let Some(name) = parse_folder_name(&plaintext) {
                self.store_folder(&cache_key, &name);
                return name;
            }
        }

        String::new()
    }

    /// Unwrap a public link's symmetric key from its master-key-wrapped
    /// form. Returns an empty string if no ring key opens it.
    pub async fn decrypt_folder_link_key(&self, keys: &MasterKeyRing, wrapped: &str) -> String {
        for key in keys.iter_newest_first() {
            if let Ok(link_key) = self.provider.decrypt_metadata(wrapped, key).await {
                if link_key.len() > MIN_LINK_KEY_LEN {
                    return link_key;
                }
            }
        }

        debug!("public link key undecryptable with current key ring");
        String::new()
    }

    fn cached_file(&self, cache_key: &str) -> Option<FileMetadata> {
        let raw = self.cache.get(cache_key)?;
        let meta: FileMetadata = serde_json::from_str(&raw).ok()?;
        if meta.name.is_empty() {
            return None;
        }
        Some(meta)
    }

    fn store_file(&self, cache_key: &str, meta: &FileMetadata) {
        if meta.name.is_empty() {
            return;
        }
        if let Ok(json) = serde_json::to_string(meta) {
            self.cache.set(cache_key, &json);
        }
    }

    fn cached_folder(&self, cache_key: &str) -> Option<String> {
        let raw = self.cache.get(cache_key)?;
        let meta: FolderMetadata = serde_json::from_str(&raw).ok()?;
        if meta.name.is_empty() {
            return None;
        }
        Some(meta.name)
    }

    fn store_folder(&self, cache_key: &str, name: &str) {
        if name.is_empty() {
            return;
        }
        if let Ok(json) = serde_json::to_string(&FolderMetadata { name: name.to_string() }) {
            self.cache.set(cache_key, &json);
        }
    }
}

fn is_default_sentinel(ciphertext: &str) -> bool {
    ciphertext.eq_ignore_ascii_case(DEFAULT_FOLDER_CIPHERTEXT)
}

fn file_cache_key(uuid: &str, ciphertext: &str) -> String {
    format!("metadataCache:file:{uuid}:{ciphertext}")
}

fn folder_cache_key(uuid: &str, ciphertext: &str) -> String {
    format!("metadataCache:folder:{uuid}:{ciphertext}")
}

fn file_link_cache_key(ciphertext: &str) -> String {
    format!("metadataCache:fileLink:{ciphertext}")
}

fn folder_link_cache_key(ciphertext: &str) -> String {
    format!("metadataCache:folderLink:{ciphertext}")
}

/// Parse decrypted file metadata; `None` unless it is valid JSON with a
/// non-empty name. Timestamps are normalized to milliseconds here so
/// every consumer (and the cache) sees one unit.
fn parse_file_metadata(plaintext: &str) -> Option<FileMetadata> {
    let mut meta: FileMetadata = serde_json::from_str(plaintext).ok()?;
    if meta.name.is_empty() {
        return None;
    }
    meta.last_modified = if meta.last_modified == 0 {
        unix_timestamp_ms()
    } else {
        convert_timestamp_to_ms(meta.last_modified)
    };
    Some(meta)
}

fn parse_folder_name(plaintext: &str) -> Option<String> {
    let meta: FolderMetadata = serde_json::from_str(plaintext).ok()?;
    if meta.name.is_empty() {
        return None;
    }
    Some(meta.name)
}

/// The fail-soft result: empty name, current timestamp.
fn undecryptable_file() -> FileMetadata {
    FileMetadata {
        last_modified: unix_timestamp_ms(),
        ..FileMetadata::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cvault_core::cache::MemoryCache;
    use cvault_core::CvaultResult;

    use crate::provider::SoftwareCrypto;

    /// Delegating provider that counts decryption calls, for cache-hit
    /// assertions.
    struct CountingProvider {
        inner: SoftwareCrypto,
        decrypt_calls: AtomicUsize,
        decrypt_private_calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            CountingProvider {
                inner: SoftwareCrypto::new(),
                decrypt_calls: AtomicUsize::new(0),
                decrypt_private_calls: AtomicUsize::new(0),
            }
        }

        fn decrypts(&self) -> usize {
            self.decrypt_calls.load(Ordering::SeqCst)
                + self.decrypt_private_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CryptoProvider for CountingProvider {
        async fn encrypt_metadata(&self, plaintext: &str, key: &str) -> CvaultResult<String> {
            self.inner.encrypt_metadata(plaintext, key).await
        }

        async fn decrypt_metadata(&self, ciphertext: &str, key: &str) -> CvaultResult<String> {
            self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.decrypt_metadata(ciphertext, key).await
        }

        async fn encrypt_metadata_public_key(
            &self,
            plaintext: &str,
            public_key: &str,
        ) -> CvaultResult<String> {
            self.inner.encrypt_metadata_public_key(plaintext, public_key).await
        }

        async fn decrypt_metadata_private_key(
            &self,
            ciphertext: &str,
            private_key: &str,
        ) -> CvaultResult<String> {
            self.decrypt_private_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.decrypt_metadata_private_key(ciphertext, private_key).await
        }

        async fn hash(&self, input: &str) -> CvaultResult<String> {
            self.inner.hash(input).await
        }

        async fn derive_key_from_password(&self, password: &str, salt: &str) -> CvaultResult<String> {
            self.inner.derive_key_from_password(password, salt).await
        }

        async fn generate_uuid(&self) -> String {
            self.inner.generate_uuid().await
        }

        async fn generate_random_string(&self, len: usize) -> String {
            self.inner.generate_random_string(len).await
        }
    }

    fn codec_with_counting() -> (MetadataCodec, Arc<CountingProvider>, Arc<MemoryCache>) {
        let provider = Arc::new(CountingProvider::new());
        let cache = Arc::new(MemoryCache::new());
        let codec = MetadataCodec::new(provider.clone(), cache.clone());
        (codec, provider, cache)
    }

    fn sample_file_json(name: &str) -> String {
        serde_json::to_string(&FileMetadata {
            name: name.into(),
            size: 4096,
            mime: "text/plain".into(),
            key: "filekey-0123456789abcdef".into(),
            last_modified: 1_700_000_000, // seconds; codec normalizes
            hash: String::new(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn second_decrypt_is_served_from_cache() {
        let (codec, provider, _) = codec_with_counting();
        let ring = MasterKeyRing::new(vec!["mk-1".into()]);
        let ct = codec
            .encrypt_metadata(&sample_file_json("notes.txt"), "mk-1")
            .await
            .unwrap();

        let first = codec.decrypt_file_metadata(&ring, &ct, "f1").await;
        assert_eq!(first.name, "notes.txt");
        let calls_after_first = provider.decrypts();
        assert!(calls_after_first >= 1);

        let second = codec.decrypt_file_metadata(&ring, &ct, "f1").await;
        assert_eq!(second, first);
        assert_eq!(
            provider.decrypts(),
            calls_after_first,
            "cache hit must not re-invoke the provider"
        );
    }

    #[tokio::test]
    async fn rotated_ciphertexts_get_independent_cache_entries() {
        let (codec, _, cache) = codec_with_counting();
        let json = sample_file_json("rotated.bin");

        // Same logical item encrypted under two generations of keys.
        let ct_old = codec.encrypt_metadata(&json, "mk-old").await.unwrap();
        let ct_new = codec.encrypt_metadata(&json, "mk-new").await.unwrap();
        assert_ne!(ct_old, ct_new);

        let ring = MasterKeyRing::new(vec!["mk-old".into(), "mk-new".into()]);
        let a = codec.decrypt_file_metadata(&ring, &ct_old, "f1").await;
        let b = codec.decrypt_file_metadata(&ring, &ct_new, "f1").await;

        assert_eq!(a.name, "rotated.bin");
        assert_eq!(b.name, "rotated.bin");
        assert_eq!(cache.len(), 2, "ciphertext must be part of the cache key");
    }

    #[tokio::test]
    async fn default_sentinel_never_calls_provider() {
        let (codec, provider, _) = codec_with_counting();
        let ring = MasterKeyRing::new(vec!["mk-1".into()]);

        let name = codec.decrypt_folder_name(&ring, "default", "any-uuid").await;
        assert_eq!(name, "Default");
        let name = codec.decrypt_folder_name_link("Default", "linkkey").await;
        assert_eq!(name, "Default");
        assert_eq!(provider.decrypts(), 0);
    }

    #[tokio::test]
    async fn older_ring_keys_still_decrypt() {
        let (codec, _, _) = codec_with_counting();
        let json = serde_json::to_string(&FolderMetadata { name: "Archive".into() }).unwrap();

        // Encrypted before two rotations.
        let ct = codec.encrypt_metadata(&json, "mk-1").await.unwrap();
        let ring = MasterKeyRing::new(vec!["mk-1".into(), "mk-2".into(), "mk-3".into()]);

        let name = codec.decrypt_folder_name(&ring, &ct, "d1").await;
        assert_eq!(name, "Archive");
    }

    #[tokio::test]
    async fn undecryptable_blob_fails_soft() {
        let (codec, _, cache) = codec_with_counting();
        let ring = MasterKeyRing::new(vec!["mk-1".into()]);

        let meta = codec.decrypt_file_metadata(&ring, "garbage-blob", "f1").await;
        assert!(meta.name.is_empty());
        assert!(meta.last_modified > 0);

        let name = codec.decrypt_folder_name(&ring, "garbage-blob", "d1").await;
        assert!(name.is_empty());

        // Failures are never cached.
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn timestamps_are_normalized_to_ms() {
        let (codec, _, _) = codec_with_counting();
        let ring = MasterKeyRing::new(vec!["mk-1".into()]);
        let ct = codec
            .encrypt_metadata(&sample_file_json("ts.txt"), "mk-1")
            .await
            .unwrap();

        let meta = codec.decrypt_file_metadata(&ring, &ct, "f1").await;
        assert_eq!(meta.last_modified, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn private_key_variant_roundtrip_and_cache() {
        let (codec, provider, _) = codec_with_counting();
        let keypair = SoftwareCrypto::generate_keypair();

        let sealed = codec
            .provider()
            .encrypt_metadata_public_key(&sample_file_json("shared.doc"), &keypair.public_key)
            .await
            .unwrap();

        let first = codec
            .decrypt_file_metadata_private_key(&sealed, &keypair.private_key, "s1")
            .await;
        assert_eq!(first.name, "shared.doc");

        let calls = provider.decrypts();
        let second = codec
            .decrypt_file_metadata_private_key(&sealed, &keypair.private_key, "s1")
            .await;
        assert_eq!(second, first);
        assert_eq!(provider.decrypts(), calls);
    }

    #[tokio::test]
    async fn link_variants_roundtrip() {
        let (codec, _, _) = codec_with_counting();
        let link_key = "0123456789abcdefghijklmnopqrstuv";

        let folder_ct = codec
            .encrypt_metadata(r#"{"name":"Public"}"#, link_key)
            .await
            .unwrap();
        assert_eq!(codec.decrypt_folder_name_link(&folder_ct, link_key).await, "Public");

        let file_ct = codec
            .encrypt_metadata(&sample_file_json("linked.png"), link_key)
            .await
            .unwrap();
        let meta = codec.decrypt_file_metadata_link(&file_ct, link_key).await;
        assert_eq!(meta.name, "linked.png");
    }

    #[tokio::test]
    async fn link_key_unwrap_tries_whole_ring() {
        let (codec, _, _) = codec_with_counting();
        let link_key = "0123456789abcdefghijklmnopqrstuv";

        let wrapped = codec.encrypt_metadata(link_key, "mk-old").await.unwrap();
        let ring = MasterKeyRing::new(vec!["mk-old".into(), "mk-new".into()]);

        assert_eq!(codec.decrypt_folder_link_key(&ring, &wrapped).await, link_key);

        // A ring without the wrapping key fails soft.
        let wrong = MasterKeyRing::new(vec!["mk-other".into()]);
        assert_eq!(codec.decrypt_folder_link_key(&wrong, &wrapped).await, "");
    }
}
