use serde::{Deserialize, Deserializer, Serialize};

/// Sentinel parent uuid for items living in the account root.
pub const PARENT_BASE: &str = "base";

/// Sentinel parent used when pushing a subtree root to a recipient:
/// the receiver mounts it at their own root.
pub const PARENT_NONE: &str = "none";

/// Folder-name ciphertext sentinel for the default/base folder.
/// It is never actually encrypted server-side.
pub const DEFAULT_FOLDER_CIPHERTEXT: &str = "default";

/// Cleartext name the `default` sentinel decrypts to.
pub const DEFAULT_FOLDER_NAME: &str = "Default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::File => f.write_str("file"),
            ItemKind::Folder => f.write_str("folder"),
        }
    }
}

/// Cleartext file metadata as carried inside encrypted metadata blobs.
///
/// This is the only place file names, content keys and sizes exist in
/// cleartext; it is always encrypted under one of the three keyspaces
/// before leaving the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime: String,
    /// Per-file symmetric content key.
    #[serde(default)]
    pub key: String,
    /// Milliseconds since epoch after normalization; raw blobs may carry
    /// seconds (see [`crate::time::convert_timestamp_to_ms`]).
    #[serde(default, deserialize_with = "de_timestamp")]
    pub last_modified: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

/// Cleartext folder metadata; folders only encrypt their name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderMetadata {
    pub name: String,
}

/// A file or folder as the drive layer sees it after decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub uuid: String,
    pub kind: ItemKind,
    pub name: String,
    pub parent: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub last_modified: u64,
    #[serde(default)]
    pub favorited: bool,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub chunks: u64,
    #[serde(default)]
    pub version: u32,
}

impl Item {
    /// Folder with only identity and name; file-only fields zeroed.
    pub fn folder(uuid: impl Into<String>, name: impl Into<String>, parent: impl Into<String>) -> Self {
        Item {
            uuid: uuid.into(),
            kind: ItemKind::Folder,
            name: name.into(),
            parent: parent.into(),
            size: 0,
            mime: String::new(),
            key: String::new(),
            last_modified: 0,
            favorited: false,
            region: String::new(),
            bucket: String::new(),
            chunks: 0,
            version: 0,
        }
    }

    /// The metadata blob payload for this item: full file metadata for
    /// files, name-only for folders.
    pub fn metadata_json(&self) -> serde_json::Result<String> {
        match self.kind {
            ItemKind::File => serde_json::to_string(&FileMetadata {
                name: self.name.clone(),
                size: self.size,
                mime: self.mime.clone(),
                key: self.key.clone(),
                last_modified: self.last_modified,
                hash: String::new(),
            }),
            ItemKind::Folder => serde_json::to_string(&FolderMetadata {
                name: self.name.clone(),
            }),
        }
    }
}

/// A user an item (or an ancestor folder) is shared with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecipient {
    pub id: u64,
    pub email: String,
    pub public_key: String,
}

/// A public link on a folder (or file). `link_key` is wrapped under the
/// owner's master keys and must be unwrapped before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLink {
    pub link_uuid: String,
    pub link_key: String,
}

/// Timestamps arrive as integers or floats depending on the writing
/// client; floor floats like every other client does.
fn de_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_finite() && raw > 0.0 {
        Ok(raw.floor() as u64)
    } else {
        Ok(0)
    }
}
