use crate::model::hash::ObjectHash;
use crate::types::{Dtype, S_IFDIR, S_IFLNK, S_IFREG};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEntryKind {
    Tree,
    RegularFile,
    ExecutableFile,
    Symlink,
}

impl TreeEntryKind {
    pub fn dtype(&self) -> Dtype {
        match self {
            TreeEntryKind::Tree => Dtype::Directory,
            TreeEntryKind::RegularFile | TreeEntryKind::ExecutableFile => Dtype::Regular,
            TreeEntryKind::Symlink => Dtype::Symlink,
        }
    }

    /// Mode bits an entry of this kind carries before any local override.
    pub fn initial_mode(&self) -> u32 {
        match self {
            TreeEntryKind::Tree => S_IFDIR | 0o755,
            TreeEntryKind::RegularFile => S_IFREG | 0o644,
            TreeEntryKind::ExecutableFile => S_IFREG | 0o755,
            TreeEntryKind::Symlink => S_IFLNK | 0o777,
        }
    }
}

/// A named member of an immutable backing-store tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub hash: ObjectHash,
    pub kind: TreeEntryKind,
}

impl TreeEntry {
    pub fn new(hash: ObjectHash, kind: TreeEntryKind) -> Self {
        Self { hash, kind }
    }

    pub fn is_tree(&self) -> bool {
        self.kind == TreeEntryKind::Tree
    }
}

/// An immutable, content-addressed directory object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    hash: ObjectHash,
    entries: Vec<(String, TreeEntry)>,
}

impl Tree {
    pub fn new(hash: ObjectHash, entries: Vec<(String, TreeEntry)>) -> Self {
        Self { hash, entries }
    }

    pub fn hash(&self) -> &ObjectHash {
        &self.hash
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeEntry)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_modes() {
        assert_eq!(TreeEntryKind::Tree.initial_mode(), S_IFDIR | 0o755);
        assert_eq!(TreeEntryKind::RegularFile.initial_mode(), S_IFREG | 0o644);
        assert_eq!(TreeEntryKind::ExecutableFile.initial_mode(), S_IFREG | 0o755);
    }

    #[test]
    fn test_tree_lookup() {
        let blob = ObjectHash::sha1_of(b"data");
        let tree = Tree::new(
            ObjectHash::sha1_of(b"tree"),
            vec![(
                "a.txt".to_string(),
                TreeEntry::new(blob, TreeEntryKind::RegularFile),
            )],
        );
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("a.txt").unwrap().hash, blob);
        assert!(tree.get("missing").is_none());
    }
}
