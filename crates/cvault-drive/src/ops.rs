//! Single-item and bulk drive operations.
//!
//! Every mutation follows the same shape: re-encrypt whatever metadata
//! the operation changes, tell the server, then propagate to any other
//! audience that must keep reading the item. Bulk variants run
//! sequentially and skip (with a log line) items that fail, so one bad
//! item never aborts a multi-select action.

use serde_json::json;
use tracing::warn;

use cvault_api::endpoints::{paths, BaseFolderResponse, DirSizeResponse, ExistsResponse, PublicKeyResponse};
use cvault_core::types::{Item, ItemKind, ShareRecipient, PARENT_BASE, PARENT_NONE};

use crate::client::DriveClient;
use crate::error::{DriveError, DriveResult};

impl DriveClient {
    /// Rename a file: new metadata under the newest master key, the
    /// bare name under the file's own content key, and a hashed name
    /// for server-side lookups. Afterwards the new metadata is pushed
    /// to every share and link already covering the file.
    pub async fn rename_file(&self, file: &Item, new_name: &str) -> DriveResult<()> {
        if file.key.is_empty() {
            return Err(DriveError::MissingKey(format!("file {} has no content key", file.uuid)));
        }
        let master = self.newest_key()?;

        let mut renamed = file.clone();
        renamed.name = new_name.to_string();

        let metadata_ct = self
            .codec()
            .encrypt_metadata(&renamed.metadata_json()?, &master)
            .await?;
        let name_ct = self.codec().encrypt_metadata(new_name, &file.key).await?;
        let name_hashed = self.name_hashed(new_name).await?;

        self.gateway()
            .request_unit(
                paths::FILE_RENAME,
                json!({
                    "uuid": file.uuid,
                    "name": name_ct,
                    "nameHashed": name_hashed,
                    "metadata": metadata_ct,
                }),
            )
            .await?;

        self.check_if_item_is_shared_for_rename(&renamed).await
    }

    pub async fn rename_folder(&self, folder: &Item, new_name: &str) -> DriveResult<()> {
        let master = self.newest_key()?;

        let mut renamed = folder.clone();
        renamed.name = new_name.to_string();

        let name_ct = self
            .codec()
            .encrypt_metadata(&renamed.metadata_json()?, &master)
            .await?;
        let name_hashed = self.name_hashed(new_name).await?;

        self.gateway()
            .request_unit(
                paths::DIR_RENAME,
                json!({
                    "uuid": folder.uuid,
                    "name": name_ct,
                    "nameHashed": name_hashed,
                }),
            )
            .await?;

        self.check_if_item_is_shared_for_rename(&renamed).await
    }

    /// Create a folder under `parent` and return its uuid. Creation
    /// under the account root skips share propagation; the root is
    /// never shared or linked.
    pub async fn create_folder(&self, name: &str, parent: &str) -> DriveResult<String> {
        let master = self.newest_key()?;
        let uuid = self.codec().provider().generate_uuid().await;

        let folder = Item::folder(uuid.clone(), name, parent);
        let name_ct = self
            .codec()
            .encrypt_metadata(&folder.metadata_json()?, &master)
            .await?;
        let name_hashed = self.name_hashed(name).await?;

        let data = self
            .gateway()
            .request(
                paths::DIR_CREATE,
                json!({
                    "uuid": uuid,
                    "name": name_ct,
                    "nameHashed": name_hashed,
                    "parent": parent,
                }),
            )
            .await?;
        // The server may dedupe and answer with an existing uuid.
        let uuid = data["uuid"].as_str().unwrap_or(&uuid).to_string();

        if parent != PARENT_BASE {
            let created = Item::folder(uuid.clone(), name, parent);
            self.check_if_item_parent_is_shared(&created).await?;
        }
        Ok(uuid)
    }

    pub async fn move_file(&self, file: &Item, new_parent: &str) -> DriveResult<()> {
        self.gateway()
            .request_unit(paths::FILE_MOVE, json!({ "uuid": file.uuid, "to": new_parent }))
            .await?;

        let mut moved = file.clone();
        moved.parent = new_parent.to_string();
        self.check_if_item_parent_is_shared(&moved).await
    }

    pub async fn move_folder(&self, folder: &Item, new_parent: &str) -> DriveResult<()> {
        self.gateway()
            .request_unit(paths::DIR_MOVE, json!({ "uuid": folder.uuid, "to": new_parent }))
            .await?;

        let mut moved = folder.clone();
        moved.parent = new_parent.to_string();
        self.check_if_item_parent_is_shared(&moved).await
    }

    pub async fn trash_item(&self, item: &Item) -> DriveResult<()> {
        let path = match item.kind {
            ItemKind::File => paths::FILE_TRASH,
            ItemKind::Folder => paths::DIR_TRASH,
        };
        Ok(self.gateway().request_unit(path, json!({ "uuid": item.uuid })).await?)
    }

    pub async fn restore_item(&self, item: &Item) -> DriveResult<()> {
        let path = match item.kind {
            ItemKind::File => paths::FILE_RESTORE,
            ItemKind::Folder => paths::DIR_RESTORE,
        };
        Ok(self.gateway().request_unit(path, json!({ "uuid": item.uuid })).await?)
    }

    pub async fn delete_item_permanently(&self, item: &Item) -> DriveResult<()> {
        let path = match item.kind {
            ItemKind::File => paths::FILE_DELETE_PERMANENT,
            ItemKind::Folder => paths::DIR_DELETE_PERMANENT,
        };
        Ok(self.gateway().request_unit(path, json!({ "uuid": item.uuid })).await?)
    }

    pub async fn favorite_item(&self, item: &Item, favorite: bool) -> DriveResult<()> {
        Ok(self
            .gateway()
            .request_unit(
                paths::ITEM_FAVORITE,
                json!({
                    "uuid": item.uuid,
                    "type": item.kind.to_string(),
                    "value": if favorite { 1 } else { 0 },
                }),
            )
            .await?)
    }

    /// Does a file with this (cleartext) name exist under `parent`?
    /// Matching happens server-side on the hashed name.
    pub async fn file_exists(&self, name: &str, parent: &str) -> DriveResult<ExistsResponse> {
        let name_hashed = self.name_hashed(name).await?;
        Ok(self
            .gateway()
            .request_typed(paths::FILE_EXISTS, json!({ "parent": parent, "nameHashed": name_hashed }))
            .await?)
    }

    pub async fn folder_exists(&self, name: &str, parent: &str) -> DriveResult<ExistsResponse> {
        let name_hashed = self.name_hashed(name).await?;
        Ok(self
            .gateway()
            .request_typed(paths::DIR_EXISTS, json!({ "parent": parent, "nameHashed": name_hashed }))
            .await?)
    }

    /// Recursive folder size in bytes. Requests for the same uuid are
    /// serialized so a refresh storm never duplicates work in flight.
    pub async fn folder_size(&self, uuid: &str) -> DriveResult<u64> {
        let lock = self.dir_size_locks.get(uuid);
        lock.acquire().await?;
        let result: DriveResult<DirSizeResponse> = self
            .gateway()
            .request_typed(paths::DIR_SIZE, json!({ "uuid": uuid }))
            .await
            .map_err(DriveError::from);
        lock.release();
        Ok(result?.size)
    }

    pub async fn base_folder_uuid(&self) -> DriveResult<String> {
        let resp: BaseFolderResponse = self
            .gateway()
            .request_typed(paths::USER_BASE_FOLDER, json!({}))
            .await?;
        Ok(resp.uuid)
    }

    /// Look up the X25519 public key for a sharing target.
    pub async fn get_public_key_from_email(&self, email: &str) -> DriveResult<String> {
        let resp: PublicKeyResponse = self
            .gateway()
            .request_typed(paths::USER_PUBLIC_KEY, json!({ "email": email }))
            .await?;
        Ok(resp.public_key)
    }

    /// Share one item with a user by email. The item mounts at the
    /// recipient's own root; a folder's subtree follows with its real
    /// parents.
    pub async fn share_item_to_user(&self, item: &Item, email: &str) -> DriveResult<()> {
        let public_key = self.get_public_key_from_email(email).await?;
        self.share_item_with_key(item, email, &public_key).await
    }

    /// Share a batch of items with one user. The public key is looked
    /// up once; items that fail are logged and skipped. Returns how
    /// many items were shared.
    pub async fn bulk_share(&self, items: &[Item], email: &str) -> DriveResult<usize> {
        let public_key = self.get_public_key_from_email(email).await?;

        let mut shared = 0;
        for item in items {
            match self.share_item_with_key(item, email, &public_key).await {
                Ok(()) => shared += 1,
                Err(error) => warn!(uuid = %item.uuid, %error, "share failed, skipping item"),
            }
        }
        Ok(shared)
    }

    async fn share_item_with_key(&self, item: &Item, email: &str, public_key: &str) -> DriveResult<()> {
        let recipient = ShareRecipient {
            id: 0,
            email: email.to_string(),
            public_key: public_key.to_string(),
        };

        let mut root = item.clone();
        root.parent = PARENT_NONE.to_string();
        self.push_share(&root, &recipient).await?;

        if item.kind == ItemKind::Folder {
            // Subtree pushes are best-effort; the root share stands
            // even if a descendant fails.
            for entry in self.get_directory_tree(&item.uuid).await? {
                if let Err(error) = self.push_share(&entry.item, &recipient).await {
                    warn!(uuid = %entry.item.uuid, %error, "subtree share failed, skipping item");
                }
            }
        }
        Ok(())
    }

    pub async fn bulk_move(&self, items: &[Item], new_parent: &str) -> usize {
        let mut moved = 0;
        for item in items {
            let result = match item.kind {
                ItemKind::File => self.move_file(item, new_parent).await,
                ItemKind::Folder => self.move_folder(item, new_parent).await,
            };
            match result {
                Ok(()) => moved += 1,
                Err(error) => warn!(uuid = %item.uuid, %error, "move failed, skipping item"),
            }
        }
        moved
    }

    pub async fn bulk_trash(&self, items: &[Item]) -> usize {
        self.bulk(items, |item| self.trash_item(item), "trash").await
    }

    pub async fn bulk_restore(&self, items: &[Item]) -> usize {
        self.bulk(items, |item| self.restore_item(item), "restore").await
    }

    pub async fn bulk_delete_permanently(&self, items: &[Item]) -> usize {
        self.bulk(items, |item| self.delete_item_permanently(item), "delete").await
    }

    pub async fn bulk_favorite(&self, items: &[Item], favorite: bool) -> usize {
        self.bulk(items, |item| self.favorite_item(item, favorite), "favorite").await
    }

    async fn bulk<'a, F, Fut>(&self, items: &'a [Item], op: F, what: &str) -> usize
    where
        F: Fn(&'a Item) -> Fut,
        Fut: std::future::Future<Output = DriveResult<()>>,
    {
        let mut done = 0;
        for item in items {
            match op(item).await {
                Ok(()) => done += 1,
                Err(error) => warn!(uuid = %item.uuid, %error, "{what} failed, skipping item"),
            }
        }
        done
    }
}
