//! The drive client: shared state every operation hangs off.

use std::sync::{Arc, RwLock};

use cvault_api::RequestGateway;
use cvault_core::config::ClientConfig;
use cvault_core::lock::KeyedLocks;
use cvault_core::semaphore::Semaphore;
use cvault_crypto::{MasterKeyRing, MetadataCodec};

use crate::error::{DriveError, DriveResult};

pub struct DriveClient {
    gateway: Arc<RequestGateway>,
    codec: Arc<MetadataCodec>,
    keyring: RwLock<MasterKeyRing>,
    /// X25519 private key for opening metadata shared to this account.
    private_key: RwLock<String>,
    config: ClientConfig,
    /// Bounds concurrent pushes while propagating metadata to share
    /// recipients.
    pub(crate) share_semaphore: Arc<Semaphore>,
    /// Bounds concurrent pushes while populating a public link.
    pub(crate) link_semaphore: Arc<Semaphore>,
    /// Serializes folder-size requests per folder uuid.
    pub(crate) dir_size_locks: KeyedLocks,
}

impl DriveClient {
    pub fn new(gateway: Arc<RequestGateway>, codec: Arc<MetadataCodec>, config: ClientConfig) -> Self {
        let share_semaphore = Arc::new(Semaphore::new(config.fanout.share_concurrency));
        let link_semaphore = Arc::new(Semaphore::new(config.fanout.link_concurrency));
        DriveClient {
            gateway,
            codec,
            keyring: RwLock::new(MasterKeyRing::default()),
            private_key: RwLock::new(String::new()),
            config,
            share_semaphore,
            link_semaphore,
            dir_size_locks: KeyedLocks::new(),
        }
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    pub fn codec(&self) -> &Arc<MetadataCodec> {
        &self.codec
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the master key ring (login, key rotation).
    pub fn set_master_keys(&self, keys: MasterKeyRing) {
        if let Ok(mut guard) = self.keyring.write() {
            *guard = keys;
        }
    }

    pub fn set_private_key(&self, key: impl Into<String>) {
        if let Ok(mut guard) = self.private_key.write() {
            *guard = key.into();
        }
    }

    /// Snapshot of the ring; operations decrypt against a stable view
    /// even if a rotation lands mid-flight.
    pub(crate) fn keyring(&self) -> MasterKeyRing {
        self.keyring
            .read()
            .map(|k| k.clone())
            .unwrap_or_default()
    }

    pub(crate) fn private_key(&self) -> String {
        self.private_key
            .read()
            .map(|k| k.clone())
            .unwrap_or_default()
    }

    /// The key all new encryptions use.
    pub(crate) fn newest_key(&self) -> DriveResult<String> {
        self.keyring()
            .newest()
            .map(str::to_string)
            .ok_or(DriveError::NoMasterKey)
    }

    /// Server-side lookups match on a digest of the lowercased name so
    /// the cleartext never leaves the device.
    pub(crate) async fn name_hashed(&self, name: &str) -> DriveResult<String> {
        Ok(self.codec.provider().hash(&name.to_lowercase()).await?)
    }

    /// Reject queued fan-out work during logout. In-flight requests
    /// finish on their own; nothing new starts.
    pub fn teardown(&self) -> usize {
        self.share_semaphore.purge() + self.link_semaphore.purge() + self.dir_size_locks.purge_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvault_api::{AlwaysOnline, ReqwestTransport};
    use cvault_core::cache::MemoryCache;
    use cvault_crypto::SoftwareCrypto;
    use std::time::Duration;

    fn client() -> DriveClient {
        let config = ClientConfig::default();
        let transport =
            Arc::new(ReqwestTransport::new(Duration::from_secs(1)).expect("client build"));
        let cache = Arc::new(MemoryCache::new());
        let gateway = Arc::new(RequestGateway::new(
            transport,
            Arc::new(AlwaysOnline),
            cache.clone(),
            config.api.clone(),
        ));
        let codec = Arc::new(MetadataCodec::new(Arc::new(SoftwareCrypto::new()), cache));
        DriveClient::new(gateway, codec, config)
    }

    #[tokio::test]
    async fn name_hash_is_case_insensitive() {
        let c = client();
        let a = c.name_hashed("Quarterly Report.PDF").await.unwrap();
        let b = c.name_hashed("quarterly report.pdf").await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn newest_key_requires_a_ring() {
        let c = client();
        assert!(matches!(c.newest_key(), Err(DriveError::NoMasterKey)));

        c.set_master_keys(MasterKeyRing::new(vec!["mk-1".into(), "mk-2".into()]));
        assert_eq!(c.newest_key().unwrap(), "mk-2");
    }

    #[test]
    fn fanout_semaphores_follow_config() {
        let c = client();
        assert_eq!(c.config().fanout.share_concurrency, 4);
        assert_eq!(c.config().fanout.link_concurrency, 8);
        assert_eq!(c.teardown(), 0);
    }
}
