pub mod allocator;
pub mod file_store;
pub mod scanner;

use crate::dir::DirContents;
use crate::error::Result;
use crate::types::{Dtype, InodeId, S_IFMT};
use allocator::InodeAllocator;
use file_store::{OverlayFileHandle, OverlayFileStore};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{info, warn};

/// The overlay engine facade: durable record store plus identifier
/// allocation, bracketed by `initialize` and `close`.
///
/// `initialize` opens the store, consumes the persisted high-water mark if
/// a clean shutdown left one, and otherwise recomputes it by scanning every
/// on-disk record. The allocator and store live exactly as long as this
/// value, so neither can be used outside the bracket.
pub struct Overlay {
    store: OverlayFileStore,
    allocator: InodeAllocator,
}

impl Overlay {
    pub async fn initialize(root: impl Into<PathBuf>) -> Result<Self> {
        let store = OverlayFileStore::open(root).await?;

        let persisted_next = store.take_next_inode_number().await?;
        let allocator = match persisted_next {
            Some(next) => {
                info!(next, "recovered clean-shutdown inode mark");
                InodeAllocator::bootstrap(Some(next.saturating_sub(1)), crate::types::ROOT_INODE)
            }
            None => {
                info!("no inode mark found, scanning overlay records");
                let scanned = scanner::scan_max_inode(&store).await;
                InodeAllocator::bootstrap(None, scanned)
            }
        };

        Ok(Self { store, allocator })
    }

    pub fn allocate_inode_number(&self) -> InodeId {
        self.allocator.allocate()
    }

    /// Diagnostic read of the current high-water mark.
    pub fn max_inode_number(&self) -> InodeId {
        self.allocator.max_issued()
    }

    pub async fn save_overlay_dir(&self, ino: InodeId, dir: &DirContents) -> Result<()> {
        self.store.save_directory(ino, dir).await
    }

    pub async fn load_overlay_dir(&self, ino: InodeId) -> Result<Option<DirContents>> {
        self.store.load_directory(ino).await
    }

    pub async fn create_overlay_file(&self, ino: InodeId, content: &[u8]) -> Result<()> {
        self.store.create_file(ino, content).await
    }

    pub async fn open_file(&self, ino: InodeId) -> Result<OverlayFileHandle> {
        self.store.open_file(ino).await
    }

    pub async fn remove_overlay_data(&self, ino: InodeId) -> Result<()> {
        self.store.remove_record(ino).await
    }

    /// Shuts the overlay down: waits for in-flight writes, then records the
    /// high-water mark so the next `initialize` can skip the scan.
    pub async fn close(&self) -> Result<()> {
        self.store.close(self.allocator.max_issued() + 1).await
    }

    /// Renders a deterministic textual listing of the overlay tree rooted
    /// at `root`: entries in insertion order, subdirectories recursed
    /// depth-first after all direct entries of the current directory.
    /// Existing tooling parses this format; keep it stable.
    pub async fn debug_dump_inodes(&self, root: InodeId) -> String {
        let mut out = String::new();
        self.dump_one(&mut out, "/".to_string(), root).await;
        out
    }

    fn dump_one<'a>(
        &'a self,
        out: &'a mut String,
        path: String,
        ino: InodeId,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            out.push_str(&path);
            out.push('\n');
            out.push_str(&format!("  Inode number: {ino}\n"));

            let dir = match self.load_overlay_dir(ino).await {
                Ok(Some(dir)) => dir,
                Ok(None) => return,
                Err(e) => {
                    warn!(ino, "skipping unreadable overlay record in dump: {e}");
                    return;
                }
            };

            out.push_str(&format!("  Entries ({} total):\n", dir.len()));
            for (name, entry) in dir.iter() {
                let dtype = match entry.dtype() {
                    Dtype::Directory => 'd',
                    Dtype::Regular => 'f',
                    _ => '?',
                };
                let perms = entry.mode & !S_IFMT;
                out.push_str(&format!(
                    "  {:11} {} {:4o} {}\n",
                    entry.ino.unwrap_or(0),
                    dtype,
                    perms,
                    name
                ));
            }

            for (name, entry) in dir.iter() {
                if entry.dtype() != Dtype::Directory {
                    continue;
                }
                let Some(child_ino) = entry.ino else { continue };
                let child_path = if path == "/" {
                    format!("/{name}")
                } else {
                    format!("{path}/{name}")
                };
                self.dump_one(&mut *out, child_path, child_ino).await;
            }
        })
    }
}
