use crate::model::hash::ObjectHash;
use crate::types::{Dtype, InodeId};
use serde::{Deserialize, Serialize};

/// A single entry of an overlay directory listing.
///
/// `hash` points at the immutable backing-store object the entry's content
/// still equals; a materialized entry has diverged and carries no hash.
/// `ino` is assigned lazily (first load or first materialization), so
/// entries that have never needed one store `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub mode: u32,
    pub ino: Option<InodeId>,
    pub hash: Option<ObjectHash>,
}

impl DirEntry {
    pub fn new(mode: u32, ino: Option<InodeId>, hash: Option<ObjectHash>) -> Self {
        Self { mode, ino, hash }
    }

    pub fn materialized(mode: u32, ino: InodeId) -> Self {
        Self {
            mode,
            ino: Some(ino),
            hash: None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.hash.is_none()
    }

    pub fn dtype(&self) -> Dtype {
        Dtype::from_mode(self.mode)
    }
}

/// An insertion-ordered directory listing with unique entry names.
///
/// Serialization preserves order, so a listing round-trips through the
/// overlay byte-for-byte equal: entry set, names, modes, identifiers and
/// the materialization bit all survive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirContents {
    entries: Vec<(String, DirEntry)>,
}

impl DirContents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any previous entry with the same name
    /// in place (its position in the listing is kept).
    pub fn insert(&mut self, name: impl Into<String>, entry: DirEntry) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = entry;
        } else {
            self.entries.push((name, entry));
        }
    }

    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    pub fn remove(&mut self, name: &str) -> Option<DirEntry> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DirEntry)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers referenced by this listing, in listing order.
    pub fn referenced_inodes(&self) -> impl Iterator<Item = InodeId> + '_ {
        self.entries.iter().filter_map(|(_, e)| e.ino)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{S_IFDIR, S_IFREG};

    #[test]
    fn test_insertion_order_preserved() {
        let mut dir = DirContents::new();
        dir.insert("zebra", DirEntry::materialized(S_IFREG | 0o644, 7));
        dir.insert("apple", DirEntry::materialized(S_IFREG | 0o644, 8));
        dir.insert("mango", DirEntry::materialized(S_IFDIR | 0o755, 9));

        let names: Vec<&str> = dir.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut dir = DirContents::new();
        dir.insert("a", DirEntry::materialized(S_IFREG | 0o644, 2));
        dir.insert("b", DirEntry::materialized(S_IFREG | 0o644, 3));
        dir.insert("a", DirEntry::materialized(S_IFREG | 0o600, 4));

        assert_eq!(dir.len(), 2);
        let names: Vec<&str> = dir.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(dir.get("a").unwrap().ino, Some(4));
    }

    #[test]
    fn test_remove() {
        let mut dir = DirContents::new();
        dir.insert("a", DirEntry::materialized(S_IFREG | 0o644, 2));
        assert!(dir.remove("a").is_some());
        assert!(dir.remove("a").is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_bincode_round_trip() {
        let hash = ObjectHash::sha1_of(b"content");
        let mut dir = DirContents::new();
        dir.insert(
            "one",
            DirEntry::new(S_IFREG | 0o644, Some(2), Some(hash)),
        );
        dir.insert("two", DirEntry::materialized(S_IFDIR | 0o755, 3));

        let bytes = bincode::serialize(&dir).unwrap();
        let back: DirContents = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, dir);
        assert!(!back.get("one").unwrap().is_materialized());
        assert!(back.get("two").unwrap().is_materialized());
    }

    #[test]
    fn test_referenced_inodes() {
        let mut dir = DirContents::new();
        dir.insert("a", DirEntry::materialized(S_IFREG | 0o644, 5));
        dir.insert(
            "b",
            DirEntry::new(S_IFREG | 0o644, None, Some(ObjectHash::sha1_of(b"b"))),
        );
        dir.insert("c", DirEntry::materialized(S_IFDIR | 0o755, 9));

        let referenced: Vec<_> = dir.referenced_inodes().collect();
        assert_eq!(referenced, vec![5, 9]);
    }
}
