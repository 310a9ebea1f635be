use crate::types::{InodeId, ROOT_INODE};
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues mount-unique, monotonically increasing inode numbers.
///
/// Owned by an `Overlay` instance; there is no process-wide counter, so
/// multiple mounts in one process never share allocation state.
pub struct InodeAllocator {
    next: AtomicU64,
}

impl InodeAllocator {
    /// Resolves the high-water mark at startup: the persisted mark when one
    /// survived a clean shutdown, otherwise whatever the recovery scan
    /// found, whichever is larger.
    pub fn bootstrap(persisted: Option<InodeId>, scanned: InodeId) -> Self {
        let max_issued = persisted.unwrap_or(ROOT_INODE).max(scanned);
        Self {
            next: AtomicU64::new(max_issued + 1),
        }
    }

    /// Returns a never-before-issued identifier. Safe under arbitrary
    /// concurrent callers.
    pub fn allocate(&self) -> InodeId {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// The largest identifier issued or recovered so far.
    pub fn max_issued(&self) -> InodeId {
        self.next.load(Ordering::Acquire) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_fresh_allocator_starts_above_root() {
        let alloc = InodeAllocator::bootstrap(None, ROOT_INODE);
        assert_eq!(alloc.max_issued(), ROOT_INODE);
        assert_eq!(alloc.allocate(), 2);
        assert_eq!(alloc.allocate(), 3);
        assert_eq!(alloc.max_issued(), 3);
    }

    #[test]
    fn test_bootstrap_takes_max_of_persisted_and_scanned() {
        let alloc = InodeAllocator::bootstrap(Some(10), 4);
        assert_eq!(alloc.max_issued(), 10);
        assert_eq!(alloc.allocate(), 11);

        let alloc = InodeAllocator::bootstrap(Some(4), 10);
        assert_eq!(alloc.max_issued(), 10);

        let alloc = InodeAllocator::bootstrap(None, 7);
        assert_eq!(alloc.allocate(), 8);
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_distinct() {
        let alloc = Arc::new(InodeAllocator::bootstrap(None, ROOT_INODE));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let alloc = alloc.clone();
            handles.push(tokio::spawn(async move {
                (0..100).map(|_| alloc.allocate()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for ino in handle.await.unwrap() {
                assert!(ino > ROOT_INODE);
                assert!(seen.insert(ino), "identifier {ino} issued twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(alloc.max_issued(), ROOT_INODE + 800);
    }
}
