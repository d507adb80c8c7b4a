//! Durable key-value cache abstraction.
//!
//! Two concerns share this store: the offline/request-fallback cache
//! (keyed by `method:endpoint:json(body)`) and the decrypted-metadata
//! cache (keyed by kind + uuid + ciphertext). The platform normally
//! supplies its own store; `MemoryCache` and `FileCache` cover tests
//! and headless use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;

pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Best-effort write: implementations log and swallow storage
    /// failures, callers never depend on a write having landed.
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Plain in-memory cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().expect("cache lock poisoned").remove(key);
    }
}

/// JSON-file-backed cache: loads entirely into memory at open, each
/// mutation is flushed atomically via temp file + rename.
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileCache {
    /// Load or create a cache at the given path. A missing file starts
    /// empty; a corrupt file is an error rather than silent data loss.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading cache file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing cache file: {}", path.display()))?
        } else {
            HashMap::new()
        };

        Ok(FileCache {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string(entries).context("serializing cache")?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("writing cache temp file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming cache file into place: {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&entries) {
            warn!(key, error = %e, "cache flush failed");
        }
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if entries.remove(key).is_some() {
            if let Err(e) = self.flush(&entries) {
                warn!(key, error = %e, "cache flush failed");
            }
        }
    }
}
