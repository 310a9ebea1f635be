pub mod file;
pub mod tree;

pub use file::{FileInode, FileState};
pub use tree::{EntryState, TreeInode, TreeState};

use crate::types::{Dtype, InodeId};
use dashmap::DashMap;
use std::sync::Arc;

/// Shared reference to a live in-memory inode.
#[derive(Clone)]
pub enum InodeRef {
    Tree(Arc<TreeInode>),
    File(Arc<FileInode>),
}

impl InodeRef {
    pub fn ino(&self) -> InodeId {
        match self {
            InodeRef::Tree(t) => t.ino(),
            InodeRef::File(f) => f.ino(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, InodeRef::Tree(_))
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            InodeRef::Tree(_) => Dtype::Directory,
            InodeRef::File(f) => f.dtype(),
        }
    }

    pub fn as_tree(&self) -> Option<&Arc<TreeInode>> {
        match self {
            InodeRef::Tree(t) => Some(t),
            InodeRef::File(_) => None,
        }
    }
}

/// Registry of loaded inodes, keyed by identifier. The mount registers
/// inodes as they load and deregisters them on unlink; eviction policy
/// (if any) lives above this crate.
#[derive(Default)]
pub struct InodeTable {
    inodes: DashMap<InodeId, InodeRef>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, inode: InodeRef) {
        self.inodes.insert(inode.ino(), inode);
    }

    pub fn get(&self, ino: InodeId) -> Option<InodeRef> {
        self.inodes.get(&ino).map(|r| r.value().clone())
    }

    pub fn remove(&self, ino: InodeId) {
        self.inodes.remove(&ino);
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}
