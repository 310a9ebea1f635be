use crate::error::{OverlayError, Result};
use crate::inode::InodeRef;
use crate::model::hash::ObjectHash;
use crate::model::store::{FetchContext, ObjectStore};
use crate::model::tree::{Tree, TreeEntry, TreeEntryKind};
use crate::types::{Dtype, InodeId, Stat, Timestamp, S_IFDIR};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The shape a path resolved to. Exposed for diagnostics and tests; the
/// operations below behave uniformly across shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Inode,
    Tree,
    TreeEntry,
    DirEntry,
}

/// An unloaded leaf reached through an unloaded backing-store tree.
#[derive(Clone)]
pub struct TreeEntryView {
    pub name: String,
    pub entry: TreeEntry,
}

/// A child of a loaded directory whose own object is not loaded.
#[derive(Clone)]
pub struct DirEntryView {
    pub name: String,
    pub mode: u32,
    pub hash: Option<ObjectHash>,
    pub ino: Option<InodeId>,
}

/// Per-field attribute results. A directory answers `kind` but fails
/// `sha1`/`size`; one failed fetch fails only the fields derived from it.
pub struct EntryAttributes {
    pub sha1: Result<ObjectHash>,
    pub size: Result<u64>,
    pub kind: Result<TreeEntryKind>,
}

/// Unified answer to "what is at this path".
///
/// A closed sum over the four shapes a filesystem object can take: a live
/// in-memory inode, an unloaded backing-store tree, an unloaded leaf under
/// such a tree, or an unloaded child of a loaded parent. Values are
/// ephemeral, recomputed per query, never persisted. Every operation here
/// is a read: none of them changes loaded/materialized state, on disk or
/// in memory.
#[derive(Clone)]
pub enum NodeView {
    Inode(InodeRef),
    Tree(Arc<Tree>),
    TreeEntry(TreeEntryView),
    DirEntry(DirEntryView),
}

fn kind_from_mode(mode: u32) -> TreeEntryKind {
    match Dtype::from_mode(mode) {
        Dtype::Directory => TreeEntryKind::Tree,
        Dtype::Symlink => TreeEntryKind::Symlink,
        _ if mode & 0o111 != 0 => TreeEntryKind::ExecutableFile,
        _ => TreeEntryKind::RegularFile,
    }
}

impl NodeView {
    pub fn kind(&self) -> ViewKind {
        match self {
            NodeView::Inode(_) => ViewKind::Inode,
            NodeView::Tree(_) => ViewKind::Tree,
            NodeView::TreeEntry(_) => ViewKind::TreeEntry,
            NodeView::DirEntry(_) => ViewKind::DirEntry,
        }
    }

    /// Answerable without loading anything.
    pub fn dtype(&self) -> Dtype {
        match self {
            NodeView::Inode(inode) => inode.dtype(),
            NodeView::Tree(_) => Dtype::Directory,
            NodeView::TreeEntry(v) => v.entry.kind.dtype(),
            NodeView::DirEntry(v) => Dtype::from_mode(v.mode),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.dtype() == Dtype::Directory
    }

    /// Stats the object. Unmaterialized entries have no local mtime, so
    /// callers supply the reference time reported for them (conventionally
    /// the last checkout time).
    pub async fn stat(
        &self,
        reference_time: Timestamp,
        store: &dyn ObjectStore,
        ctx: &FetchContext,
    ) -> Result<Stat> {
        match self {
            NodeView::Inode(InodeRef::Tree(tree)) => Ok(Stat {
                mode: tree.mode(),
                size: 0,
                mtime: reference_time,
            }),
            NodeView::Inode(InodeRef::File(file)) => {
                let (hash, content_len, mtime) = {
                    let st = file.state.read().await;
                    (
                        st.hash,
                        st.content.as_ref().map(|c| c.len() as u64),
                        st.mtime,
                    )
                };
                match hash {
                    // Unmaterialized: size comes from blob metadata, with
                    // no lock held across the fetch.
                    Some(hash) => {
                        let meta = store.fetch_blob_metadata(&hash, ctx).await?;
                        Ok(Stat {
                            mode: file.mode(),
                            size: meta.size,
                            mtime: reference_time,
                        })
                    }
                    None => Ok(Stat {
                        mode: file.mode(),
                        size: content_len.unwrap_or(0),
                        mtime,
                    }),
                }
            }
            NodeView::Tree(_) => Ok(Stat {
                mode: S_IFDIR | 0o755,
                size: 0,
                mtime: reference_time,
            }),
            NodeView::TreeEntry(v) => {
                let size = match v.entry.kind {
                    TreeEntryKind::Tree => 0,
                    _ => store.fetch_blob_metadata(&v.entry.hash, ctx).await?.size,
                };
                Ok(Stat {
                    mode: v.entry.kind.initial_mode(),
                    size,
                    mtime: reference_time,
                })
            }
            NodeView::DirEntry(v) => {
                if Dtype::from_mode(v.mode) == Dtype::Directory {
                    return Ok(Stat {
                        mode: v.mode,
                        size: 0,
                        mtime: reference_time,
                    });
                }
                match v.hash {
                    Some(hash) => {
                        let meta = store.fetch_blob_metadata(&hash, ctx).await?;
                        Ok(Stat {
                            mode: v.mode,
                            size: meta.size,
                            mtime: reference_time,
                        })
                    }
                    // Materialized but unloaded: the content lives in the
                    // overlay and answering requires a load.
                    None => Err(OverlayError::NotFound(v.ino.unwrap_or(0))),
                }
            }
        }
    }

    /// Content hash of a regular file. Materialized content is hashed
    /// locally; unmaterialized content answers from blob metadata without
    /// any load.
    pub async fn sha1(&self, store: &dyn ObjectStore, ctx: &FetchContext) -> Result<ObjectHash> {
        match self.dtype() {
            Dtype::Directory => return Err(OverlayError::IsADirectory),
            Dtype::Regular => {}
            _ => return Err(OverlayError::NotARegularFile),
        }

        match self {
            NodeView::Inode(InodeRef::File(file)) => {
                let (hash, content) = {
                    let st = file.state.read().await;
                    (st.hash, st.content.clone())
                };
                match hash {
                    Some(hash) => Ok(store.fetch_blob_metadata(&hash, ctx).await?.sha1),
                    None => Ok(ObjectHash::sha1_of(
                        content.as_deref().unwrap_or_default(),
                    )),
                }
            }
            NodeView::TreeEntry(v) => {
                Ok(store.fetch_blob_metadata(&v.entry.hash, ctx).await?.sha1)
            }
            NodeView::DirEntry(v) => match v.hash {
                Some(hash) => Ok(store.fetch_blob_metadata(&hash, ctx).await?.sha1),
                None => Err(OverlayError::NotFound(v.ino.unwrap_or(0))),
            },
            _ => Err(OverlayError::IsADirectory),
        }
    }

    /// Per-field attributes. Directory `sha1`/`size` fail while `kind`
    /// succeeds; for files one metadata fetch feeds both content fields, so
    /// a failed fetch fails exactly those two.
    pub async fn entry_attributes(
        &self,
        store: &dyn ObjectStore,
        ctx: &FetchContext,
    ) -> EntryAttributes {
        if self.is_directory() {
            return EntryAttributes {
                sha1: Err(OverlayError::IsADirectory),
                size: Err(OverlayError::IsADirectory),
                kind: Ok(TreeEntryKind::Tree),
            };
        }

        let kind = match self {
            NodeView::TreeEntry(v) => v.entry.kind,
            NodeView::Inode(InodeRef::File(file)) => kind_from_mode(file.mode()),
            NodeView::DirEntry(v) => kind_from_mode(v.mode),
            // Directories were handled above.
            _ => TreeEntryKind::Tree,
        };

        let facts = self.content_facts(store, ctx).await;
        let (sha1, size) = match facts {
            Ok((sha1, size)) => (Ok(sha1), Ok(size)),
            Err(e) => {
                let twin = e.duplicate();
                (Err(e), Err(twin))
            }
        };

        EntryAttributes {
            sha1,
            size,
            kind: Ok(kind),
        }
    }

    /// `(sha1, size)` for a non-directory, from one source.
    async fn content_facts(
        &self,
        store: &dyn ObjectStore,
        ctx: &FetchContext,
    ) -> Result<(ObjectHash, u64)> {
        let backing = match self {
            NodeView::Inode(InodeRef::File(file)) => {
                let (hash, content) = {
                    let st = file.state.read().await;
                    (st.hash, st.content.clone())
                };
                match hash {
                    Some(hash) => hash,
                    None => {
                        let content = content.unwrap_or_default();
                        return Ok((ObjectHash::sha1_of(&content), content.len() as u64));
                    }
                }
            }
            NodeView::TreeEntry(v) => v.entry.hash,
            NodeView::DirEntry(v) => match v.hash {
                Some(hash) => hash,
                None => return Err(OverlayError::NotFound(v.ino.unwrap_or(0))),
            },
            NodeView::Inode(InodeRef::Tree(_)) | NodeView::Tree(_) => {
                return Err(OverlayError::IsADirectory)
            }
        };
        let meta = store.fetch_blob_metadata(&backing, ctx).await?;
        Ok((meta.sha1, meta.size))
    }

    /// Enumerates children without creating any child inode. A loaded
    /// parent always yields directory-entry-shaped children for whatever is
    /// not loaded; an unloaded tree yields tree shapes.
    pub async fn children(
        &self,
        store: &dyn ObjectStore,
        ctx: &FetchContext,
    ) -> Result<BTreeMap<String, NodeView>> {
        match self {
            NodeView::Inode(InodeRef::Tree(tree)) => {
                let st = tree.contents.read().await;
                let mut children = BTreeMap::new();
                for (name, entry) in st.iter() {
                    let view = match &entry.loaded {
                        Some(child) => NodeView::Inode(child.clone()),
                        None => NodeView::DirEntry(DirEntryView {
                            name: name.to_string(),
                            mode: entry.mode,
                            hash: entry.hash,
                            ino: entry.ino,
                        }),
                    };
                    children.insert(name.to_string(), view);
                }
                Ok(children)
            }
            NodeView::Tree(tree) => {
                let mut children = BTreeMap::new();
                for (name, entry) in tree.iter() {
                    let view = if entry.is_tree() {
                        NodeView::Tree(store.fetch_tree(&entry.hash, ctx).await?)
                    } else {
                        NodeView::TreeEntry(TreeEntryView {
                            name: name.to_string(),
                            entry: entry.clone(),
                        })
                    };
                    children.insert(name.to_string(), view);
                }
                Ok(children)
            }
            NodeView::Inode(InodeRef::File(_))
            | NodeView::TreeEntry(_)
            | NodeView::DirEntry(_) => Err(OverlayError::NotADirectory),
        }
    }

    /// Batched `entry_attributes` over all children. Each child's result is
    /// independent; one bad child never fails the batch.
    pub async fn children_attributes(
        &self,
        store: &dyn ObjectStore,
        ctx: &FetchContext,
    ) -> Result<BTreeMap<String, EntryAttributes>> {
        let children = self.children(store, ctx).await?;
        let attrs = join_all(children.into_iter().map(|(name, view)| async move {
            let attrs = view.entry_attributes(store, ctx).await;
            (name, attrs)
        }))
        .await;
        Ok(attrs.into_iter().collect())
    }
}
