use crate::dir::{DirContents, DirEntry};
use crate::inode::InodeRef;
use crate::model::hash::ObjectHash;
use crate::model::tree::Tree;
use crate::types::{Dtype, InodeId, S_IFDIR};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Runtime state of one entry in a loaded directory.
///
/// `hash` still naming a backing-store object means the entry's content has
/// not diverged; a materialized entry has `hash == None`. `ino` is assigned
/// lazily, and `loaded` holds the live child once one exists.
#[derive(Clone)]
pub struct EntryState {
    pub mode: u32,
    pub hash: Option<ObjectHash>,
    pub ino: Option<InodeId>,
    pub loaded: Option<InodeRef>,
}

impl EntryState {
    pub fn dtype(&self) -> Dtype {
        Dtype::from_mode(self.mode)
    }

    pub fn is_materialized(&self) -> bool {
        self.hash.is_none()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn from_dir_entry(entry: &DirEntry) -> Self {
        Self {
            mode: entry.mode,
            hash: entry.hash,
            ino: entry.ino,
            loaded: None,
        }
    }

    fn to_dir_entry(&self) -> DirEntry {
        DirEntry::new(self.mode, self.ino, self.hash)
    }
}

/// Contents of a loaded directory, guarded by the owning inode's lock.
pub struct TreeState {
    source_hash: Option<ObjectHash>,
    entries: Vec<(String, EntryState)>,
}

impl TreeState {
    /// Entries mirroring an immutable backing-store tree.
    pub fn from_tree(tree: &Tree) -> Self {
        let entries = tree
            .iter()
            .map(|(name, entry)| {
                (
                    name.to_string(),
                    EntryState {
                        mode: entry.kind.initial_mode(),
                        hash: Some(entry.hash),
                        ino: None,
                        loaded: None,
                    },
                )
            })
            .collect();
        Self {
            source_hash: Some(*tree.hash()),
            entries,
        }
    }

    /// Entries recovered from a persisted overlay listing. The directory is
    /// materialized by definition: only diverged directories have records.
    pub fn from_listing(dir: &DirContents) -> Self {
        let entries = dir
            .iter()
            .map(|(name, entry)| (name.to_string(), EntryState::from_dir_entry(entry)))
            .collect();
        Self {
            source_hash: None,
            entries,
        }
    }

    /// The "unsaved" state: a materialized directory whose record has not
    /// been flushed (or did not survive). Recoverable, not an error.
    pub fn empty_materialized() -> Self {
        Self {
            source_hash: None,
            entries: Vec::new(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.source_hash.is_none()
    }

    pub fn set_materialized(&mut self) {
        self.source_hash = None;
    }

    pub fn get(&self, name: &str) -> Option<&EntryState> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EntryState> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    pub fn remove(&mut self, name: &str) -> Option<EntryState> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntryState)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The persistable form of this directory.
    pub fn to_dir_contents(&self) -> DirContents {
        let mut dir = DirContents::new();
        for (name, entry) in &self.entries {
            dir.insert(name.clone(), entry.to_dir_entry());
        }
        dir
    }
}

/// A loaded directory inode. The parent link is weak: parents own children
/// through their entry table, and the back-reference exists only for
/// upward materialization walks.
pub struct TreeInode {
    ino: InodeId,
    mode: u32,
    name: String,
    parent: Option<Weak<TreeInode>>,
    pub(crate) contents: RwLock<TreeState>,
}

impl TreeInode {
    pub fn new_root(state: TreeState) -> Arc<Self> {
        Arc::new(Self {
            ino: crate::types::ROOT_INODE,
            mode: S_IFDIR | 0o755,
            name: String::new(),
            parent: None,
            contents: RwLock::new(state),
        })
    }

    pub fn new_child(
        ino: InodeId,
        mode: u32,
        name: String,
        parent: &Arc<TreeInode>,
        state: TreeState,
    ) -> Arc<Self> {
        Arc::new(Self {
            ino,
            mode,
            name,
            parent: Some(Arc::downgrade(parent)),
            contents: RwLock::new(state),
        })
    }

    pub fn ino(&self) -> InodeId {
        self.ino
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<TreeInode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub async fn is_materialized(&self) -> bool {
        self.contents.read().await.is_materialized()
    }
}
