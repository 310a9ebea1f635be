use crate::inode::tree::TreeInode;
use crate::model::hash::ObjectHash;
use crate::types::{Dtype, InodeId, Timestamp};
use bytes::Bytes;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

pub struct FileState {
    /// Backing-store object this file still equals; `None` once the
    /// content has diverged locally.
    pub hash: Option<ObjectHash>,
    /// Local content, populated when the file is materialized.
    pub content: Option<Bytes>,
    pub mtime: Timestamp,
}

impl FileState {
    pub fn is_materialized(&self) -> bool {
        self.hash.is_none()
    }
}

/// A loaded file inode.
pub struct FileInode {
    ino: InodeId,
    mode: u32,
    name: String,
    parent: Weak<TreeInode>,
    pub(crate) state: RwLock<FileState>,
}

impl FileInode {
    pub fn new(
        ino: InodeId,
        mode: u32,
        name: String,
        parent: &Arc<TreeInode>,
        state: FileState,
    ) -> Arc<Self> {
        Arc::new(Self {
            ino,
            mode,
            name,
            parent: Arc::downgrade(parent),
            state: RwLock::new(state),
        })
    }

    pub fn ino(&self) -> InodeId {
        self.ino
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn dtype(&self) -> Dtype {
        Dtype::from_mode(self.mode)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<TreeInode>> {
        self.parent.upgrade()
    }

    pub async fn is_materialized(&self) -> bool {
        self.state.read().await.is_materialized()
    }
}
