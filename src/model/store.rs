use crate::error::Result;
use crate::model::hash::ObjectHash;
use crate::model::tree::Tree;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cached per-blob facts the store can answer without shipping content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobMetadata {
    pub sha1: ObjectHash,
    pub size: u64,
}

/// Operation-scoped fetch context. Carries the cancellation signal for an
/// in-flight read; abandoning a fetch has no side effects on overlay state.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    cancel: CancellationToken,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// The immutable, content-addressed backing store. Fetches are async and
/// cancellable; failures surface as `FetchFailed`, never a crash.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch_tree(&self, hash: &ObjectHash, ctx: &FetchContext) -> Result<Arc<Tree>>;

    async fn fetch_blob(&self, hash: &ObjectHash, ctx: &FetchContext) -> Result<Bytes>;

    async fn fetch_blob_metadata(
        &self,
        hash: &ObjectHash,
        ctx: &FetchContext,
    ) -> Result<BlobMetadata>;
}
