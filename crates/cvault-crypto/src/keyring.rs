//! Master key ring: the account's ordered list of symmetric keys.
//!
//! Keys are strings, oldest first, newest last. The ring only ever
//! grows: every password change appends a fresh key so metadata
//! written under any historical key stays readable. Encryption always
//! uses the newest key; decryption tries the ring newest-first.
//!
//! Readers take a cheap snapshot (`Clone`) at call time; a rotation
//! racing an in-flight decryption is benign because decryption is
//! keyed by ciphertext content, not by ring version.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterKeyRing {
    keys: Vec<String>,
}

impl MasterKeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        MasterKeyRing { keys }
    }

    /// The key every new encryption uses.
    pub fn newest(&self) -> Option<&str> {
        self.keys.last().map(String::as_str)
    }

    /// Decryption order: newest key first. Metadata is normally
    /// encrypted under the newest key, so this both terminates early in
    /// the common case and makes "the newest key that decrypts wins"
    /// deterministic.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().rev().map(String::as_str)
    }

    /// Append a freshly derived key after a password change.
    pub fn rotate(&mut self, key: String) {
        self.keys.push(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<Vec<String>> for MasterKeyRing {
    fn from(keys: Vec<String>) -> Self {
        MasterKeyRing::new(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_is_last() {
        let mut ring = MasterKeyRing::new(vec!["old".into(), "mid".into()]);
        assert_eq!(ring.newest(), Some("mid"));

        ring.rotate("new".into());
        assert_eq!(ring.newest(), Some("new"));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn iteration_is_newest_first() {
        let ring = MasterKeyRing::new(vec!["a".into(), "b".into(), "c".into()]);
        let order: Vec<&str> = ring.iter_newest_first().collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn empty_ring() {
        let ring = MasterKeyRing::default();
        assert!(ring.is_empty());
        assert_eq!(ring.newest(), None);
    }

    #[test]
    fn serde_is_transparent() {
        let ring = MasterKeyRing::new(vec!["k1".into(), "k2".into()]);
        let json = serde_json::to_string(&ring).unwrap();
        assert_eq!(json, r#"["k1","k2"]"#);
        let back: MasterKeyRing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ring);
    }
}
