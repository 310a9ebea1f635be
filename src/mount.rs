use crate::clock::Clock;
use crate::config::MountConfig;
use crate::error::{OverlayError, Result};
use crate::inode::{FileInode, FileState, InodeRef, InodeTable, TreeInode, TreeState};
use crate::model::hash::ObjectHash;
use crate::model::store::{FetchContext, ObjectStore};
use crate::overlay::Overlay;
use crate::types::{Dtype, InodeId, Timestamp, ROOT_INODE};
use crate::view::{DirEntryView, NodeView, TreeEntryView};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// What a directory child needs before it can become a live inode.
enum Prefetched {
    Tree(Arc<crate::model::tree::Tree>),
    Listing(Option<crate::dir::DirContents>),
    Content(Option<Bytes>),
}

/// One checked-out working copy: the backing store, the overlay engine, the
/// table of live inodes, and the always-loaded root directory.
///
/// Reads (`resolve` and everything on `NodeView`) never change load or
/// materialization state. `load` pulls a node and its ancestors into
/// memory; `overwrite_file` and `unlink` mutate, propagating
/// materialization upward and persisting every affected listing.
pub struct Mount {
    store: Arc<dyn ObjectStore>,
    overlay: Overlay,
    table: InodeTable,
    root: Arc<TreeInode>,
    clock: Arc<dyn Clock>,
    last_checkout: Timestamp,
}

impl Mount {
    pub async fn initialize(
        config: MountConfig,
        store: Arc<dyn ObjectStore>,
        root_hash: ObjectHash,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let overlay = Overlay::initialize(&config.overlay_root).await?;

        let ctx = FetchContext::new();
        let root_tree = store.fetch_tree(&root_hash, &ctx).await?;
        let mut state = TreeState::from_tree(&root_tree);
        // The checkout owns its root listing from the start.
        state.set_materialized();
        let root = TreeInode::new_root(state);
        {
            let st = root.contents.read().await;
            overlay
                .save_overlay_dir(ROOT_INODE, &st.to_dir_contents())
                .await?;
        }

        let table = InodeTable::new();
        table.insert(InodeRef::Tree(root.clone()));

        let last_checkout = clock.now();
        Ok(Self {
            store,
            overlay,
            table,
            root,
            clock,
            last_checkout,
        })
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn inode_table(&self) -> &InodeTable {
        &self.table
    }

    pub fn root(&self) -> &Arc<TreeInode> {
        &self.root
    }

    pub fn last_checkout_time(&self) -> Timestamp {
        self.last_checkout
    }

    pub async fn close(&self) -> Result<()> {
        self.overlay.close().await
    }

    /// Resolves a path to a view, without loading or materializing
    /// anything. Unloaded directories are answered straight from the
    /// backing store.
    pub async fn resolve(&self, path: &str, ctx: &FetchContext) -> Result<NodeView> {
        let mut view = NodeView::Inode(InodeRef::Tree(self.root.clone()));
        for name in components(path) {
            view = self.resolve_child(view, name, path, ctx).await?;
        }
        Ok(view)
    }

    async fn resolve_child(
        &self,
        view: NodeView,
        name: &str,
        full_path: &str,
        ctx: &FetchContext,
    ) -> Result<NodeView> {
        match view {
            NodeView::Inode(InodeRef::Tree(tree)) => {
                let snapshot = {
                    let st = tree.contents.read().await;
                    st.get(name)
                        .map(|e| (e.loaded.clone(), e.mode, e.hash, e.ino))
                };
                let Some((loaded, mode, hash, ino)) = snapshot else {
                    return Err(OverlayError::PathNotFound(full_path.to_string()));
                };
                if let Some(child) = loaded {
                    return Ok(NodeView::Inode(child));
                }
                if Dtype::from_mode(mode) == Dtype::Directory {
                    if let Some(hash) = hash {
                        let tree = self.store.fetch_tree(&hash, ctx).await?;
                        return Ok(NodeView::Tree(tree));
                    }
                }
                Ok(NodeView::DirEntry(DirEntryView {
                    name: name.to_string(),
                    mode,
                    hash,
                    ino,
                }))
            }
            NodeView::Tree(tree) => {
                let Some(entry) = tree.get(name) else {
                    return Err(OverlayError::PathNotFound(full_path.to_string()));
                };
                if entry.is_tree() {
                    Ok(NodeView::Tree(self.store.fetch_tree(&entry.hash, ctx).await?))
                } else {
                    Ok(NodeView::TreeEntry(TreeEntryView {
                        name: name.to_string(),
                        entry: entry.clone(),
                    }))
                }
            }
            NodeView::Inode(InodeRef::File(_))
            | NodeView::TreeEntry(_)
            | NodeView::DirEntry(_) => Err(OverlayError::NotADirectory),
        }
    }

    /// Loads the node at `path`, loading every ancestor along the way.
    /// Identifiers are assigned lazily on first load.
    pub async fn load(&self, path: &str, ctx: &FetchContext) -> Result<InodeRef> {
        let mut result = InodeRef::Tree(self.root.clone());
        for name in components(path) {
            let parent = match result {
                InodeRef::Tree(tree) => tree,
                InodeRef::File(_) => return Err(OverlayError::NotADirectory),
            };
            result = self.load_child(&parent, name, path, ctx).await?;
        }
        Ok(result)
    }

    async fn load_child(
        &self,
        parent: &Arc<TreeInode>,
        name: &str,
        full_path: &str,
        ctx: &FetchContext,
    ) -> Result<InodeRef> {
        let (mode, hash, ino_hint) = {
            let st = parent.contents.read().await;
            let Some(entry) = st.get(name) else {
                return Err(OverlayError::PathNotFound(full_path.to_string()));
            };
            if let Some(child) = &entry.loaded {
                return Ok(child.clone());
            }
            (entry.mode, entry.hash, entry.ino)
        };

        // Everything the child needs is fetched before the parent's write
        // lock is taken, so readers and other loaders are never blocked on
        // a backing-store round trip.
        let prefetched = match (Dtype::from_mode(mode), hash) {
            (Dtype::Directory, Some(hash)) => {
                Prefetched::Tree(self.store.fetch_tree(&hash, ctx).await?)
            }
            (Dtype::Directory, None) => {
                let listing = match ino_hint {
                    Some(ino) => match self.overlay.load_overlay_dir(ino).await {
                        Ok(listing) => listing,
                        Err(e) if e.is_recoverable() => {
                            warn!(ino, "treating unreadable overlay listing as unsaved: {e}");
                            None
                        }
                        Err(e) => return Err(e),
                    },
                    None => None,
                };
                Prefetched::Listing(listing)
            }
            (_, None) => {
                // Materialized file: its content lives in the overlay. A
                // missing record is the unsaved state and reads as empty.
                let content = match ino_hint {
                    Some(ino) => match self.overlay.open_file(ino).await {
                        Ok(mut handle) => Some(handle.read_content().await?),
                        Err(e) if e.is_recoverable() => {
                            warn!(ino, "treating unreadable overlay file as unsaved: {e}");
                            None
                        }
                        Err(e) => return Err(e),
                    },
                    None => None,
                };
                Prefetched::Content(content)
            }
            (_, Some(_)) => Prefetched::Content(None),
        };

        let mut st = parent.contents.write().await;
        let Some(entry) = st.get_mut(name) else {
            return Err(OverlayError::PathNotFound(full_path.to_string()));
        };
        if let Some(child) = &entry.loaded {
            // Another loader won the race; its inode is the one.
            return Ok(child.clone());
        }
        let ino = match entry.ino {
            Some(ino) => ino,
            None => {
                let ino = self.overlay.allocate_inode_number();
                entry.ino = Some(ino);
                ino
            }
        };

        debug!(ino, path = full_path, "loading inode");
        let child = match prefetched {
            Prefetched::Tree(tree) => InodeRef::Tree(TreeInode::new_child(
                ino,
                entry.mode,
                name.to_string(),
                parent,
                TreeState::from_tree(&tree),
            )),
            Prefetched::Listing(listing) => {
                let state = match listing {
                    Some(listing) => TreeState::from_listing(&listing),
                    None => TreeState::empty_materialized(),
                };
                InodeRef::Tree(TreeInode::new_child(
                    ino,
                    entry.mode,
                    name.to_string(),
                    parent,
                    state,
                ))
            }
            Prefetched::Content(content) => InodeRef::File(FileInode::new(
                ino,
                entry.mode,
                name.to_string(),
                parent,
                FileState {
                    hash: entry.hash,
                    content,
                    mtime: self.last_checkout,
                },
            )),
        };
        entry.loaded = Some(child.clone());
        drop(st);

        self.table.insert(child.clone());
        Ok(child)
    }

    /// Replaces a file's content, materializing it and every ancestor.
    pub async fn overwrite_file(
        &self,
        path: &str,
        content: &[u8],
        ctx: &FetchContext,
    ) -> Result<()> {
        let file = match self.load(path, ctx).await? {
            InodeRef::File(file) => file,
            InodeRef::Tree(_) => return Err(OverlayError::IsADirectory),
        };

        // Leaf first: the durable record, then the in-memory state.
        self.overlay.create_overlay_file(file.ino(), content).await?;
        {
            let mut st = file.state.write().await;
            st.hash = None;
            st.content = Some(Bytes::copy_from_slice(content));
            st.mtime = self.clock.now();
        }

        match file.parent() {
            Some(parent) => {
                self.materialize_ancestors(parent, Some((file.name().to_string(), file.ino())))
                    .await
            }
            None => Ok(()),
        }
    }

    /// Removes a non-directory entry. The parent becomes loaded and
    /// materialized; the child's overlay record is deleted.
    pub async fn unlink(&self, path: &str, ctx: &FetchContext) -> Result<()> {
        let comps: Vec<&str> = components(path).collect();
        let Some((&name, parent_comps)) = comps.split_last() else {
            return Err(OverlayError::IsADirectory);
        };
        let parent_path = parent_comps.join("/");
        let parent = match self.load(&parent_path, ctx).await? {
            InodeRef::Tree(tree) => tree,
            InodeRef::File(_) => return Err(OverlayError::NotADirectory),
        };

        let (was_materialized, removed) = {
            let mut st = parent.contents.write().await;
            let Some(entry) = st.get(name) else {
                return Err(OverlayError::PathNotFound(path.to_string()));
            };
            if entry.dtype() == Dtype::Directory {
                return Err(OverlayError::IsADirectory);
            }
            let was_materialized = st.is_materialized();
            let removed = st.remove(name);
            st.set_materialized();
            let listing = st.to_dir_contents();
            self.overlay.save_overlay_dir(parent.ino(), &listing).await?;
            (was_materialized, removed)
        };

        if let Some(ino) = removed.and_then(|e| e.ino) {
            self.table.remove(ino);
            self.overlay.remove_overlay_data(ino).await?;
        }

        if !was_materialized {
            if let Some(grandparent) = parent.parent() {
                self.materialize_ancestors(
                    grandparent,
                    Some((parent.name().to_string(), parent.ino())),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Walks from `start` toward the root, marking each directory
    /// materialized and persisting its listing. The walk stops at the first
    /// directory that was already materialized: its own listing still needs
    /// saving (a child entry changed), but everything above is unchanged.
    async fn materialize_ancestors(
        &self,
        start: Arc<TreeInode>,
        update: Option<(String, InodeId)>,
    ) -> Result<()> {
        let mut dir = start;
        let mut update = update;
        loop {
            let was_materialized = {
                let mut st = dir.contents.write().await;
                if let Some((name, ino)) = &update {
                    if let Some(entry) = st.get_mut(name) {
                        entry.hash = None;
                        entry.ino = Some(*ino);
                    }
                }
                let was_materialized = st.is_materialized();
                st.set_materialized();
                let listing = st.to_dir_contents();
                self.overlay.save_overlay_dir(dir.ino(), &listing).await?;
                was_materialized
            };
            if was_materialized {
                return Ok(());
            }
            let Some(parent) = dir.parent() else {
                return Ok(());
            };
            update = Some((dir.name().to_string(), dir.ino()));
            dir = parent;
        }
    }

    /// Read-only probe of a path's in-memory `(loaded, materialized)`
    /// flags. Walks only already-loaded structures; never fetches, loads,
    /// or allocates. `None` when the path does not exist in the loaded
    /// portion of the tree.
    pub async fn node_flags(&self, path: &str) -> Option<(bool, bool)> {
        let comps: Vec<&str> = components(path).collect();
        let Some((&name, parents)) = comps.split_last() else {
            let materialized = self.root.is_materialized().await;
            return Some((true, materialized));
        };

        let mut current = self.root.clone();
        for &comp in parents {
            let child = {
                let st = current.contents.read().await;
                match st.get(comp) {
                    Some(entry) => entry.loaded.clone(),
                    None => return None,
                }
            };
            match child {
                Some(InodeRef::Tree(tree)) => current = tree,
                // An unloaded ancestor means the node itself is neither
                // loaded nor materialized in memory.
                _ => return Some((false, false)),
            }
        }

        let st = current.contents.read().await;
        st.get(name)
            .map(|entry| (entry.is_loaded(), entry.is_materialized()))
    }
}
