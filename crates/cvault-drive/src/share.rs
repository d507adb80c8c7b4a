//! Share and link propagation.
//!
//! After any metadata-changing operation the server only holds blobs
//! the owner can read. If the affected item sits inside a shared
//! folder or a public link, the client must re-encrypt the metadata
//! for every other audience and push it, or recipients see nothing.
//!
//! Pushes fan out concurrently, bounded by the share semaphore, and
//! individual failures are logged and swallowed: one unreachable
//! recipient must not fail the rename that triggered the propagation.
//! The same holds for the status queries and the subtree fetch that
//! feed the fan-out; by the time propagation starts, the primary
//! mutation has already succeeded, so nothing here may fail it.
//! The operation resolves once every push has settled.

use futures::future::join_all;
use tracing::{debug, warn};

use cvault_api::endpoints::{paths, ItemLinkTarget, ItemLinkedResponse, ItemSharedResponse};
use cvault_core::types::{Item, ItemKind, ShareRecipient};
use serde_json::json;

use crate::client::DriveClient;
use crate::error::DriveResult;

impl DriveClient {
    /// Who can currently see this item through shares.
    pub async fn item_shared(&self, uuid: &str) -> DriveResult<ItemSharedResponse> {
        Ok(self
            .gateway()
            .request_typed(paths::ITEM_SHARED, json!({ "uuid": uuid }))
            .await?)
    }

    /// Which public links currently cover this item.
    pub async fn item_linked(&self, uuid: &str) -> DriveResult<ItemLinkedResponse> {
        Ok(self
            .gateway()
            .request_typed(paths::ITEM_LINKED, json!({ "uuid": uuid }))
            .await?)
    }

    /// After creating or moving `item` under its parent: if the parent
    /// is shared or linked, push the item's metadata (and, for folders,
    /// the whole subtree's) to every audience.
    pub async fn check_if_item_parent_is_shared(&self, item: &Item) -> DriveResult<()> {
        let (shared, linked) = futures::join!(
            self.item_shared(&item.parent),
            self.item_linked(&item.parent)
        );
        let (shared, linked) = match (shared, linked) {
            (Ok(shared), Ok(linked)) => (shared, linked),
            (shared, linked) => {
                for error in [shared.err(), linked.err()].into_iter().flatten() {
                    warn!(uuid = %item.uuid, %error, "share status query failed, skipping propagation");
                }
                return Ok(());
            }
        };
        if !shared.sharing && !linked.link {
            return Ok(());
        }

        // A moved folder brings its whole subtree into the audience's
        // view; children keep their real parents.
        let mut items = vec![item.clone()];
        if item.kind == ItemKind::Folder {
            match self.get_directory_tree(&item.uuid).await {
                Ok(entries) => items.extend(entries.into_iter().map(|e| e.item)),
                Err(error) => {
                    warn!(uuid = %item.uuid, %error, "subtree fetch failed, skipping propagation");
                    return Ok(());
                }
            }
        }

        let recipients: Vec<ShareRecipient> = shared
            .users
            .into_iter()
            .map(|u| ShareRecipient {
                id: u.id,
                email: u.email,
                public_key: u.public_key,
            })
            .collect();

        debug!(
            uuid = %item.uuid,
            recipients = recipients.len(),
            links = linked.links.len(),
            subtree = items.len(),
            "propagating metadata to parent's audiences"
        );

        let mut pushes = Vec::new();
        for it in &items {
            for recipient in &recipients {
                pushes.push(self.push_share_swallowing(it, recipient));
            }
        }
        join_all(pushes).await;

        for link in &linked.links {
            self.push_items_to_link(&items, link).await;
        }

        Ok(())
    }

    /// After renaming `item`: re-push its (new) metadata to everyone
    /// already seeing it, recipients and public links alike.
    pub async fn check_if_item_is_shared_for_rename(&self, item: &Item) -> DriveResult<()> {
        let (shared, linked) =
            futures::join!(self.item_shared(&item.uuid), self.item_linked(&item.uuid));
        let (shared, linked) = match (shared, linked) {
            (Ok(shared), Ok(linked)) => (shared, linked),
            (shared, linked) => {
                for error in [shared.err(), linked.err()].into_iter().flatten() {
                    warn!(uuid = %item.uuid, %error, "share status query failed, skipping rename propagation");
                }
                return Ok(());
            }
        };
        if !shared.sharing && !linked.link {
            return Ok(());
        }

        let metadata = match item.metadata_json() {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(uuid = %item.uuid, %error, "cannot serialize metadata, skipping rename propagation");
                return Ok(());
            }
        };

        let share_pushes = shared.users.iter().map(|user| {
            let metadata = metadata.clone();
            async move {
                let result = self
                    .bounded_share(async {
                        let sealed = self
                            .codec()
                            .provider()
                            .encrypt_metadata_public_key(&metadata, &user.public_key)
                            .await?;
                        self.gateway()
                            .request_unit(
                                paths::ITEM_SHARED_RENAME,
                                json!({
                                    "uuid": item.uuid,
                                    "receiverId": user.id,
                                    "metadata": sealed,
                                }),
                            )
                            .await?;
                        Ok(())
                    })
                    .await;
                if let Err(error) = result {
                    warn!(uuid = %item.uuid, email = %user.email, %error, "rename push to recipient failed");
                }
            }
        });
        join_all(share_pushes).await;

        let ring = self.keyring();
        let link_pushes = linked.links.iter().map(|link| {
            let metadata = metadata.clone();
            let ring = ring.clone();
            async move {
                let link_key = self.codec().decrypt_folder_link_key(&ring, &link.link_key).await;
                if link_key.is_empty() {
                    warn!(link = %link.link_uuid, "cannot unwrap link key, skipping rename push");
                    return;
                }
                let result = self
                    .bounded_share(async {
                        let ct = self.codec().encrypt_metadata(&metadata, &link_key).await?;
                        self.gateway()
                            .request_unit(
                                paths::ITEM_LINKED_RENAME,
                                json!({
                                    "uuid": item.uuid,
                                    "linkUUID": link.link_uuid,
                                    "metadata": ct,
                                }),
                            )
                            .await?;
                        Ok(())
                    })
                    .await;
                if let Err(error) = result {
                    warn!(uuid = %item.uuid, link = %link.link_uuid, %error, "rename push to link failed");
                }
            }
        });
        join_all(link_pushes).await;

        Ok(())
    }

    /// Seal one item's metadata to one recipient and push it.
    pub(crate) async fn push_share(&self, item: &Item, recipient: &ShareRecipient) -> DriveResult<()> {
        let metadata = item.metadata_json()?;
        self.bounded_share(async {
            let sealed = self
                .codec()
                .provider()
                .encrypt_metadata_public_key(&metadata, &recipient.public_key)
                .await?;
            self.gateway()
                .request_unit(
                    paths::ITEM_SHARE,
                    json!({
                        "uuid": item.uuid,
                        "parent": item.parent,
                        "email": recipient.email,
                        "type": item.kind.to_string(),
                        "metadata": sealed,
                    }),
                )
                .await?;
            Ok(())
        })
        .await
    }

    async fn push_share_swallowing(&self, item: &Item, recipient: &ShareRecipient) {
        if let Err(error) = self.push_share(item, recipient).await {
            warn!(uuid = %item.uuid, email = %recipient.email, %error, "share push failed");
        }
    }

    /// Push a batch of items into one public link, bounded by the link
    /// semaphore. The link key is unwrapped once for the batch.
    pub(crate) async fn push_items_to_link(&self, items: &[Item], link: &ItemLinkTarget) {
        let ring = self.keyring();
        let link_key = self.codec().decrypt_folder_link_key(&ring, &link.link_key).await;
        if link_key.is_empty() {
            warn!(link = %link.link_uuid, "cannot unwrap link key, skipping link push");
            return;
        }

        let pushes = items.iter().map(|item| {
            let link_key = link_key.clone();
            async move {
                let result: DriveResult<()> = async {
                    self.link_semaphore.acquire().await?;
                    let out = async {
                        let metadata = item.metadata_json()?;
                        let ct = self.codec().encrypt_metadata(&metadata, &link_key).await?;
                        self.gateway()
                            .request_unit(
                                paths::DIR_LINK_ADD,
                                json!({
                                    "uuid": item.uuid,
                                    "parent": item.parent,
                                    "linkUUID": link.link_uuid,
                                    "type": item.kind.to_string(),
                                    "metadata": ct,
                                    "key": link.link_key,
                                    "expiration": "never",
                                }),
                            )
                            .await?;
                        Ok(())
                    }
                    .await;
                    self.link_semaphore.release();
                    out
                }
                .await;
                if let Err(error) = result {
                    warn!(uuid = %item.uuid, link = %link.link_uuid, %error, "link push failed");
                }
            }
        });
        join_all(pushes).await;
    }

    /// Run a push under the share-concurrency bound.
    async fn bounded_share<T>(
        &self,
        fut: impl std::future::Future<Output = DriveResult<T>>,
    ) -> DriveResult<T> {
        self.share_semaphore.acquire().await?;
        let out = fut.await;
        self.share_semaphore.release();
        out
    }
}
