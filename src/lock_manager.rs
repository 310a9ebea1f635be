use crate::types::InodeId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Registry of per-inode reader/writer locks.
///
/// Overlay record writes are serialized per identifier through this
/// registry; independent records proceed in parallel. Locks are created on
/// first use and removed again once no guard references them.
#[derive(Clone, Default)]
pub struct LockManager {
    locks: Arc<DashMap<InodeId, Arc<RwLock<()>>>>,
}

pub enum LockGuard {
    Read {
        _guard: OwnedRwLockReadGuard<()>,
        ino: InodeId,
        locks: Arc<DashMap<InodeId, Arc<RwLock<()>>>>,
    },
    Write {
        _guard: OwnedRwLockWriteGuard<()>,
        ino: InodeId,
        locks: Arc<DashMap<InodeId, Arc<RwLock<()>>>>,
    },
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create_lock(&self, ino: InodeId) -> Arc<RwLock<()>> {
        self.locks
            .entry(ino)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn acquire_read(&self, ino: InodeId) -> LockGuard {
        let lock = self.get_or_create_lock(ino);
        let guard = lock.read_owned().await;
        LockGuard::Read {
            _guard: guard,
            ino,
            locks: self.locks.clone(),
        }
    }

    pub async fn acquire_write(&self, ino: InodeId) -> LockGuard {
        let lock = self.get_or_create_lock(ino);
        let guard = lock.write_owned().await;
        LockGuard::Write {
            _guard: guard,
            ino,
            locks: self.locks.clone(),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let (ino, locks) = match self {
            LockGuard::Read { ino, locks, .. } => (*ino, locks),
            LockGuard::Write { ino, locks, .. } => (*ino, locks),
        };

        // One reference is held by the guard, one by the map; anything
        // above that means another waiter exists and the slot must stay.
        locks.remove_if(&ino, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_write_lock_reacquire() {
        let manager = LockManager::new();
        let guard = manager.acquire_write(1).await;
        drop(guard);
        let _guard = manager.acquire_write(1).await;
    }

    #[tokio::test]
    async fn test_different_inodes_do_not_block() {
        let manager = Arc::new(LockManager::new());
        let _guard = manager.acquire_write(1).await;

        let manager2 = manager.clone();
        let acquired = Arc::new(AtomicBool::new(false));
        let acquired2 = acquired.clone();
        let handle = tokio::spawn(async move {
            let _guard = manager2.acquire_write(2).await;
            acquired2.store(true, Ordering::SeqCst);
        });

        handle.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lock_cleanup_after_drop() {
        let manager = LockManager::new();
        {
            let _guard = manager.acquire_write(42).await;
            assert_eq!(manager.locks.len(), 1);
        }
        assert_eq!(manager.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_readers_share() {
        let manager = LockManager::new();
        let _r1 = manager.acquire_read(7).await;
        let _r2 = manager.acquire_read(7).await;
    }
}
