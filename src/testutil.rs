use crate::clock::FixedClock;
use crate::config::MountConfig;
use crate::error::{OverlayError, Result};
use crate::model::hash::ObjectHash;
use crate::model::store::{BlobMetadata, FetchContext, ObjectStore};
use crate::model::tree::{Tree, TreeEntry, TreeEntryKind};
use crate::mount::Mount;
use crate::types::Timestamp;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory backing store for tests. Individual blobs can be failed to
/// exercise per-field error isolation.
#[derive(Default)]
pub struct FakeObjectStore {
    trees: DashMap<ObjectHash, Arc<Tree>>,
    blobs: DashMap<ObjectHash, Bytes>,
    failing: DashMap<ObjectHash, ()>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_tree(&self, tree: Tree) -> ObjectHash {
        let hash = *tree.hash();
        self.trees.insert(hash, Arc::new(tree));
        hash
    }

    pub fn put_blob(&self, content: &[u8]) -> ObjectHash {
        let hash = ObjectHash::sha1_of(content);
        self.blobs.insert(hash, Bytes::copy_from_slice(content));
        hash
    }

    /// All subsequent fetches of this blob fail.
    pub fn fail_blob(&self, hash: ObjectHash) {
        self.failing.insert(hash, ());
    }

    fn check(&self, hash: &ObjectHash, ctx: &FetchContext) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(OverlayError::Cancelled);
        }
        if self.failing.contains_key(hash) {
            return Err(OverlayError::FetchFailed(format!(
                "injected failure for {hash}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn fetch_tree(&self, hash: &ObjectHash, ctx: &FetchContext) -> Result<Arc<Tree>> {
        self.check(hash, ctx)?;
        self.trees
            .get(hash)
            .map(|t| t.value().clone())
            .ok_or_else(|| OverlayError::FetchFailed(format!("no tree {hash}")))
    }

    async fn fetch_blob(&self, hash: &ObjectHash, ctx: &FetchContext) -> Result<Bytes> {
        self.check(hash, ctx)?;
        self.blobs
            .get(hash)
            .map(|b| b.value().clone())
            .ok_or_else(|| OverlayError::FetchFailed(format!("no blob {hash}")))
    }

    async fn fetch_blob_metadata(
        &self,
        hash: &ObjectHash,
        ctx: &FetchContext,
    ) -> Result<BlobMetadata> {
        let blob = self.fetch_blob(hash, ctx).await?;
        Ok(BlobMetadata {
            sha1: ObjectHash::sha1_of(&blob),
            size: blob.len() as u64,
        })
    }
}

enum Node {
    File(String),
    Dir,
}

/// Builds a backing-store tree bottom-up from `set_file` calls, content
/// addressing every blob and tree along the way.
#[derive(Default)]
pub struct TreeBuilder {
    files: Vec<(String, String)>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_file(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.push((path.into(), contents.into()));
    }

    pub fn build(&self) -> (Arc<FakeObjectStore>, ObjectHash) {
        let store = FakeObjectStore::new();
        let root_hash = self.build_dir("", &store);
        (Arc::new(store), root_hash)
    }

    fn children_of(&self, prefix: &str) -> BTreeMap<String, Node> {
        let mut children = BTreeMap::new();
        for (path, contents) in &self.files {
            let rel = if prefix.is_empty() {
                path.as_str()
            } else {
                match path.strip_prefix(prefix).and_then(|p| p.strip_prefix('/')) {
                    Some(rel) => rel,
                    None => continue,
                }
            };
            match rel.split_once('/') {
                Some((dir, _)) => {
                    children.entry(dir.to_string()).or_insert(Node::Dir);
                }
                None => {
                    children.insert(rel.to_string(), Node::File(contents.clone()));
                }
            }
        }
        children
    }

    fn build_dir(&self, prefix: &str, store: &FakeObjectStore) -> ObjectHash {
        let mut entries = Vec::new();
        for (name, node) in self.children_of(prefix) {
            let child_prefix = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            let entry = match node {
                Node::Dir => {
                    let hash = self.build_dir(&child_prefix, store);
                    TreeEntry::new(hash, TreeEntryKind::Tree)
                }
                Node::File(contents) => {
                    let hash = store.put_blob(contents.as_bytes());
                    TreeEntry::new(hash, TreeEntryKind::RegularFile)
                }
            };
            entries.push((name, entry));
        }

        let serialized = bincode::serialize(&entries).expect("tree entries serialize");
        let hash = ObjectHash::sha1_of(&serialized);
        store.put_tree(Tree::new(hash, entries));
        hash
    }
}

/// The reference instant every test mount's clock is frozen at.
pub const TEST_TIME: Timestamp = Timestamp {
    seconds: 1_600_000_000,
    nanoseconds: 0,
};

pub struct TestMount {
    pub mount: Mount,
    pub store: Arc<FakeObjectStore>,
    pub ctx: FetchContext,
    _tmp: tempfile::TempDir,
}

impl TestMount {
    pub async fn new(builder: &TreeBuilder) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root_hash) = builder.build();
        let mount = Mount::initialize(
            MountConfig::new(tmp.path().join("overlay")),
            store.clone(),
            root_hash,
            Arc::new(FixedClock(TEST_TIME)),
        )
        .await
        .unwrap();
        Self {
            mount,
            store,
            ctx: FetchContext::new(),
            _tmp: tmp,
        }
    }
}
