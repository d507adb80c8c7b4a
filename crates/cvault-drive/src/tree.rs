//! Directory tree assembly: fetch a whole subtree, decrypt every name,
//! and resolve `/`-joined paths relative to the requested root.

use std::collections::{HashMap, HashSet};

use serde_json::json;
use tracing::warn;

use cvault_api::endpoints::{paths, DirTreeResponse};
use cvault_core::time::convert_timestamp_to_ms;
use cvault_core::types::{Item, ItemKind};

use crate::client::DriveClient;
use crate::error::DriveResult;

/// One decrypted item plus its path relative to the tree root, e.g.
/// `"Projects/2026/budget.xlsx"`. The root folder itself is not an
/// entry; callers already hold it.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub item: Item,
}

/// Ancestor chains longer than this are treated as corrupt.
const MAX_TREE_DEPTH: usize = 1024;

/// Which keyspace a listing decrypts under: the owner's master keys,
/// the account keypair (shared-in view), or a public link's key.
#[derive(Debug, Clone)]
pub enum TreeScope {
    Owner,
    SharedIn,
    Link { link_key: String },
}

impl TreeScope {
    fn wire_type(&self) -> &'static str {
        match self {
            TreeScope::Owner => "normal",
            TreeScope::SharedIn => "shared",
            TreeScope::Link { .. } => "linked",
        }
    }
}

impl DriveClient {
    /// Fetch and decrypt everything below `folder_uuid`, owner view.
    pub async fn get_directory_tree(&self, folder_uuid: &str) -> DriveResult<Vec<TreeEntry>> {
        self.get_directory_tree_scoped(folder_uuid, &TreeScope::Owner).await
    }

    /// Fetch and decrypt everything below `folder_uuid` in the given
    /// keyspace.
    ///
    /// Undecryptable items are skipped, and siblings that decrypt to
    /// the same name keep only the first occurrence, so one corrupt
    /// blob never poisons a whole listing.
    pub async fn get_directory_tree_scoped(
        &self,
        folder_uuid: &str,
        scope: &TreeScope,
    ) -> DriveResult<Vec<TreeEntry>> {
        let resp: DirTreeResponse = self
            .gateway()
            .request_typed(
                paths::DIR_DOWNLOAD,
                json!({ "uuid": folder_uuid, "type": scope.wire_type() }),
            )
            .await?;

        let ring = self.keyring();
        let private_key = self.private_key();

        let mut folders = Vec::with_capacity(resp.folders.len());
        for f in &resp.folders {
            if f.uuid == folder_uuid {
                continue;
            }
            let name = match scope {
                TreeScope::Owner => self.codec().decrypt_folder_name(&ring, &f.name, &f.uuid).await,
                TreeScope::SharedIn => {
                    self.codec()
                        .decrypt_folder_name_private_key(&private_key, &f.name, &f.uuid)
                        .await
                }
                TreeScope::Link { link_key } => {
                    self.codec().decrypt_folder_name_link(&f.name, link_key).await
                }
            };
            if name.is_empty() {
                warn!(uuid = %f.uuid, "skipping undecryptable folder");
                continue;
            }
            let mut item = Item::folder(&f.uuid, name, &f.parent);
            item.favorited = f.favorited == 1;
            item.last_modified = convert_timestamp_to_ms(f.timestamp);
            folders.push(item);
        }

        let mut files = Vec::with_capacity(resp.files.len());
        for f in &resp.files {
            let meta = match scope {
                TreeScope::Owner => {
                    self.codec().decrypt_file_metadata(&ring, &f.metadata, &f.uuid).await
                }
                TreeScope::SharedIn => {
                    self.codec()
                        .decrypt_file_metadata_private_key(&f.metadata, &private_key, &f.uuid)
                        .await
                }
                TreeScope::Link { link_key } => {
                    self.codec().decrypt_file_metadata_link(&f.metadata, link_key).await
                }
            };
            if meta.name.is_empty() {
                warn!(uuid = %f.uuid, "skipping undecryptable file");
                continue;
            }
            files.push(Item {
                uuid: f.uuid.clone(),
                kind: ItemKind::File,
                name: meta.name,
                parent: f.parent.clone(),
                size: if meta.size > 0 { meta.size } else { f.size },
                mime: meta.mime,
                key: meta.key,
                last_modified: meta.last_modified,
                favorited: f.favorited == 1,
                region: f.region.clone(),
                bucket: f.bucket.clone(),
                chunks: f.chunks,
                version: f.version,
            });
        }

        Ok(build_tree(folder_uuid, folders, files))
    }
}

/// Assemble path-resolved entries from decrypted folders and files.
///
/// Dedupe is first-seen-wins on `(parent, lowercased name)`; orphans
/// (parent chain never reaching the root) are dropped.
pub(crate) fn build_tree(root_uuid: &str, folders: Vec<Item>, files: Vec<Item>) -> Vec<TreeEntry> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut kept_folders = Vec::with_capacity(folders.len());
    for f in folders {
        if seen.insert((f.parent.clone(), f.name.to_lowercase())) {
            kept_folders.push(f);
        }
    }

    let by_uuid: HashMap<&str, &Item> = kept_folders.iter().map(|f| (f.uuid.as_str(), f)).collect();

    // uuid -> path for every folder whose ancestry reaches the root.
    let mut folder_paths: HashMap<String, String> = HashMap::new();
    for folder in &kept_folders {
        if let Some(path) = resolve_path(folder, root_uuid, &by_uuid) {
            folder_paths.insert(folder.uuid.clone(), path);
        } else {
            warn!(uuid = %folder.uuid, "dropping folder with broken ancestry");
        }
    }

    let mut entries = Vec::new();
    for folder in &kept_folders {
        if let Some(path) = folder_paths.get(&folder.uuid) {
            entries.push(TreeEntry {
                path: path.clone(),
                item: folder.clone(),
            });
        }
    }

    let mut seen_files: HashSet<(String, String)> = HashSet::new();
    for file in files {
        if !seen_files.insert((file.parent.clone(), file.name.to_lowercase())) {
            continue;
        }
        let path = if file.parent == root_uuid {
            Some(file.name.clone())
        } else {
            folder_paths
                .get(&file.parent)
                .map(|p| format!("{p}/{}", file.name))
        };
        match path {
            Some(path) => entries.push(TreeEntry { path, item: file }),
            None => warn!(uuid = %file.uuid, "dropping file with broken ancestry"),
        }
    }

    entries
}

fn resolve_path(folder: &Item, root_uuid: &str, by_uuid: &HashMap<&str, &Item>) -> Option<String> {
    let mut components = vec![folder.name.as_str()];
    let mut current = folder;
    while current.parent != root_uuid {
        if components.len() > MAX_TREE_DEPTH {
            return None;
        }
        current = by_uuid.get(current.parent.as_str())?;
        components.push(current.name.as_str());
    }
    components.reverse();
    Some(components.join("/"))
}
