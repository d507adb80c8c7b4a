//! Endpoint paths and the wire shapes of their `data` payloads.
//!
//! Only fields the client actually consumes are modeled; unknown
//! fields are ignored on decode. Booleans the server encodes as 0/1
//! stay numeric here and are interpreted at the drive layer.

use serde::Deserialize;

pub mod paths {
    pub const DIR_CONTENT: &str = "/v3/dir/content";
    /// Whole-subtree fetch: every file and folder below a directory in
    /// one response, metadata still encrypted.
    pub const DIR_DOWNLOAD: &str = "/v3/dir/download";
    pub const DIR_CREATE: &str = "/v3/dir/create";
    pub const DIR_RENAME: &str = "/v3/dir/rename";
    pub const DIR_MOVE: &str = "/v3/dir/move";
    pub const DIR_TRASH: &str = "/v3/dir/trash";
    pub const DIR_RESTORE: &str = "/v3/dir/restore";
    pub const DIR_DELETE_PERMANENT: &str = "/v3/dir/delete/permanent";
    pub const DIR_EXISTS: &str = "/v3/dir/exists";
    pub const DIR_SIZE: &str = "/v3/dir/size";
    pub const DIR_SIZE_LINK: &str = "/v3/dir/size/link";

    pub const FILE_RENAME: &str = "/v3/file/rename";
    pub const FILE_MOVE: &str = "/v3/file/move";
    pub const FILE_TRASH: &str = "/v3/file/trash";
    pub const FILE_RESTORE: &str = "/v3/file/restore";
    pub const FILE_DELETE_PERMANENT: &str = "/v3/file/delete/permanent";
    pub const FILE_EXISTS: &str = "/v3/file/exists";

    pub const ITEM_FAVORITE: &str = "/v3/item/favorite";
    /// Share-status probe: who can see this item.
    pub const ITEM_SHARED: &str = "/v3/item/shared";
    /// Link-status probe: which public links cover this item.
    pub const ITEM_LINKED: &str = "/v3/item/linked";
    /// Push one item's sealed metadata to one recipient.
    pub const ITEM_SHARE: &str = "/v3/item/share";
    /// Re-push renamed metadata to an existing recipient.
    pub const ITEM_SHARED_RENAME: &str = "/v3/item/shared/rename";
    /// Re-push renamed metadata into an existing public link.
    pub const ITEM_LINKED_RENAME: &str = "/v3/item/linked/rename";

    /// Add one item to a folder public link.
    pub const DIR_LINK_ADD: &str = "/v3/dir/link/add";
    pub const DIR_LINK_STATUS: &str = "/v3/dir/link/status";
    pub const DIR_LINK_EDIT: &str = "/v3/dir/link/edit";
    pub const DIR_LINK_REMOVE: &str = "/v3/dir/link/remove";
    pub const FILE_LINK_STATUS: &str = "/v3/file/link/status";
    pub const FILE_LINK_EDIT: &str = "/v3/file/link/edit";

    pub const USER_BASE_FOLDER: &str = "/v3/user/baseFolder";
    pub const USER_PUBLIC_KEY: &str = "/v3/user/publicKey";
}

/// `dir/content`: one directory level, metadata still encrypted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirContentResponse {
    #[serde(default)]
    pub uploads: Vec<RemoteFile>,
    #[serde(default)]
    pub folders: Vec<RemoteFolder>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub uuid: String,
    /// Encrypted file metadata blob.
    pub metadata: String,
    pub parent: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub chunks: u64,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub favorited: u8,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFolder {
    pub uuid: String,
    /// Encrypted folder-name blob, or the literal `default` sentinel.
    pub name: String,
    pub parent: String,
    #[serde(default)]
    pub favorited: u8,
    #[serde(default)]
    pub timestamp: u64,
    // The wire stays snake_case for this one field.
    #[serde(default, rename = "is_default")]
    pub is_default: u8,
}

/// `dir/download`: flat lists covering an entire subtree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirTreeResponse {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub folders: Vec<RemoteFolder>,
}

/// `item/shared`: sharing flag plus the recipients to propagate to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemSharedResponse {
    #[serde(default)]
    pub sharing: bool,
    #[serde(default)]
    pub users: Vec<SharedWithUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedWithUser {
    pub id: u64,
    pub email: String,
    pub public_key: String,
}

/// `item/linked`: link flag plus every covering public link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemLinkedResponse {
    #[serde(default)]
    pub link: bool,
    #[serde(default)]
    pub links: Vec<ItemLinkTarget>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemLinkTarget {
    #[serde(rename = "linkUUID")]
    pub link_uuid: String,
    /// Link key wrapped under the owner's master keys.
    pub link_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
    /// uuid of the conflicting item when `exists` is true.
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirSizeResponse {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub folders: u64,
}

/// `dir/link/status` / `file/link/status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatusResponse {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Wrapped link key; only present when enabled.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub expiration: Option<u64>,
    #[serde(default)]
    pub expiration_text: Option<String>,
    #[serde(default)]
    pub download_btn: u8,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseFolderResponse {
    pub uuid: String,
}
