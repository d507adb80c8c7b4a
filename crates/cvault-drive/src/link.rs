//! Public links.
//!
//! A folder link owns a single symmetric link key; every item under
//! the folder gets its metadata re-encrypted under that key and pushed
//! into the link. The key itself is stored server-side wrapped under
//! the owner's master keys, so only the owner can extend the link
//! later.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tracing::{debug, warn};

use cvault_api::endpoints::{paths, LinkStatusResponse};
use cvault_core::types::{Item, ItemKind, PublicLink, PARENT_NONE};
use cvault_crypto::LINK_KEY_LEN;

use crate::client::DriveClient;
use crate::error::DriveResult;

/// Progress callback for link creation: `(items_done, items_total)`.
pub type LinkProgress = Arc<dyn Fn(usize, usize) + Send + Sync>;

impl DriveClient {
    pub async fn file_link_status(&self, uuid: &str) -> DriveResult<LinkStatusResponse> {
        Ok(self
            .gateway()
            .request_typed(paths::FILE_LINK_STATUS, json!({ "uuid": uuid }))
            .await?)
    }

    pub async fn folder_link_status(&self, uuid: &str) -> DriveResult<LinkStatusResponse> {
        Ok(self
            .gateway()
            .request_typed(paths::DIR_LINK_STATUS, json!({ "uuid": uuid }))
            .await?)
    }

    /// Link status for any item, dispatched on kind.
    pub async fn item_public_link_info(&self, item: &Item) -> DriveResult<LinkStatusResponse> {
        match item.kind {
            ItemKind::File => self.file_link_status(&item.uuid).await,
            ItemKind::Folder => self.folder_link_status(&item.uuid).await,
        }
    }

    /// Enable a public link on any item. File links carry no
    /// client-side key (content keys travel inside the metadata), so
    /// `link_key` is empty for files.
    pub async fn enable_item_public_link(&self, item: &Item) -> DriveResult<PublicLink> {
        match item.kind {
            ItemKind::Folder => self.create_folder_public_link(item, None).await,
            ItemKind::File => {
                let link_uuid = self.enable_file_link(item).await?;
                Ok(PublicLink {
                    link_uuid,
                    link_key: String::new(),
                })
            }
        }
    }

    pub async fn disable_item_public_link(&self, item: &Item, link_uuid: &str) -> DriveResult<()> {
        match item.kind {
            ItemKind::Folder => self.disable_folder_link(&item.uuid).await,
            ItemKind::File => self.disable_file_link(link_uuid, &item.uuid).await,
        }
    }

    /// Enable a public link on a single file. Returns the link uuid.
    pub async fn enable_file_link(&self, file: &Item) -> DriveResult<String> {
        let link_uuid = self.codec().provider().generate_uuid().await;
        self.edit_file_link(&link_uuid, &file.uuid, "enable", None).await?;
        Ok(link_uuid)
    }

    pub async fn disable_file_link(&self, link_uuid: &str, file_uuid: &str) -> DriveResult<()> {
        self.edit_file_link(link_uuid, file_uuid, "disable", None).await
    }

    /// Set or change a file link's password. The server only ever sees
    /// a salted derivation.
    pub async fn set_file_link_password(
        &self,
        link_uuid: &str,
        file_uuid: &str,
        password: &str,
    ) -> DriveResult<()> {
        self.edit_file_link(link_uuid, file_uuid, "enable", Some(password)).await
    }

    async fn edit_file_link(
        &self,
        link_uuid: &str,
        file_uuid: &str,
        action: &str,
        password: Option<&str>,
    ) -> DriveResult<()> {
        let provider = self.codec().provider();
        let salt = provider.generate_random_string(32).await;
        let password_hashed = match password {
            Some(pw) => provider.derive_key_from_password(pw, &salt).await?,
            None => provider.hash("empty").await?,
        };

        Ok(self
            .gateway()
            .request_unit(
                paths::FILE_LINK_EDIT,
                json!({
                    "uuid": link_uuid,
                    "fileUUID": file_uuid,
                    "expiration": "never",
                    "password": if password.is_some() { "notempty" } else { "empty" },
                    "passwordHashed": password_hashed,
                    "salt": salt,
                    "downloadBtn": "enable",
                    "type": action,
                }),
            )
            .await?)
    }

    /// Create a public link covering `folder` and everything below it.
    ///
    /// Items are pushed deepest-first, bounded by the link semaphore;
    /// the folder itself goes last so the link surfaces only once its
    /// children are in place. Per-item push failures are logged and
    /// skipped. `progress` is invoked after each settled push.
    pub async fn create_folder_public_link(
        &self,
        folder: &Item,
        progress: Option<LinkProgress>,
    ) -> DriveResult<PublicLink> {
        let master = self.newest_key()?;
        let provider = self.codec().provider();
        let link_uuid = provider.generate_uuid().await;
        let link_key = provider.generate_random_string(LINK_KEY_LEN).await;
        let wrapped_key = self.codec().encrypt_metadata(&link_key, &master).await?;

        // The folder mounts at the link root; children keep real parents.
        let mut root = folder.clone();
        root.parent = PARENT_NONE.to_string();

        let tree = self.get_directory_tree(&folder.uuid).await?;
        let mut batch: Vec<(usize, Item)> = tree
            .iter()
            .map(|entry| (depth(&entry.path), entry.item.clone()))
            .collect();
        batch.sort_by(|a, b| b.0.cmp(&a.0));
        batch.push((0, root));

        let total = batch.len();
        let done = AtomicUsize::new(0);
        debug!(folder = %folder.uuid, link = %link_uuid, items = total, "creating folder public link");

        let pushes = batch.iter().map(|(_, item)| {
            let link_key = link_key.clone();
            let wrapped_key = wrapped_key.clone();
            let link_uuid = link_uuid.clone();
            let done = &done;
            let progress = progress.clone();
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
                                    "linkUUID": link_uuid,
                                    "type": item.kind.to_string(),
                                    "metadata": ct,
                                    "key": wrapped_key,
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
                    warn!(uuid = %item.uuid, %error, "link push failed, item not in link");
                }
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(progress) = progress {
                    progress(finished, total);
                }
            }
        });
        join_all(pushes).await;

        Ok(PublicLink {
            link_uuid,
            link_key,
        })
    }

    pub async fn disable_folder_link(&self, folder_uuid: &str) -> DriveResult<()> {
        Ok(self
            .gateway()
            .request_unit(paths::DIR_LINK_REMOVE, json!({ "uuid": folder_uuid }))
            .await?)
    }

    /// Edit an existing folder link's expiration and download-button
    /// setting.
    pub async fn edit_folder_link(
        &self,
        folder_uuid: &str,
        expiration: &str,
        download_button: bool,
    ) -> DriveResult<()> {
        Ok(self
            .gateway()
            .request_unit(
                paths::DIR_LINK_EDIT,
                json!({
                    "uuid": folder_uuid,
                    "expiration": expiration,
                    "downloadBtn": if download_button { "enable" } else { "disable" },
                }),
            )
            .await?)
    }
}

fn depth(path: &str) -> usize {
    path.matches('/').count() + 1
}
