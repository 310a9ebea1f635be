use crate::overlay::file_store::{decode_directory, parse_header, OverlayFileStore, RecordKind};
use crate::types::{InodeId, ROOT_INODE};
use std::io::ErrorKind;
use tokio::fs;
use tracing::{info, warn};

/// Recomputes the true maximum identifier by walking every on-disk record.
///
/// This is a flat scan over the shard directories, independent of the
/// logical directory tree: a root-down walk would miss records whose parent
/// link is corrupted, but those identifiers were issued and must never be
/// reused. Each record contributes its own filename-derived identifier;
/// directory records that still parse also contribute every identifier
/// referenced by their entries. Missing, truncated, or malformed records
/// are tolerated and never abort the scan.
pub async fn scan_max_inode(store: &OverlayFileStore) -> InodeId {
    let mut max = ROOT_INODE;
    let mut records = 0u64;
    let mut corrupt = 0u64;

    let mut shards = match fs::read_dir(store.root_path()).await {
        Ok(shards) => shards,
        Err(e) => {
            warn!("cannot enumerate overlay root: {e}");
            return max;
        }
    };

    while let Ok(Some(shard)) = shards.next_entry().await {
        let shard_path = shard.path();
        let is_dir = shard
            .file_type()
            .await
            .map(|ft| ft.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }

        let mut entries = match fs::read_dir(&shard_path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(shard = %shard_path.display(), "cannot enumerate shard: {e}");
                continue;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            // Temp files and other non-numeric names were never issued
            // identifiers; skip them.
            let Some(ino) = name.to_str().and_then(|n| n.parse::<InodeId>().ok()) else {
                continue;
            };
            records += 1;
            max = max.max(ino);

            match fs::read(entry.path()).await {
                // Only directory records reference further identifiers. A
                // record that does not parse contributes just its own
                // filename-derived identifier.
                Ok(data) => match parse_header(ino, &data) {
                    Ok(RecordKind::Directory) => match decode_directory(ino, &data) {
                        Ok(dir) => {
                            for child in dir.referenced_inodes() {
                                max = max.max(child);
                            }
                        }
                        Err(_) => {
                            corrupt += 1;
                            warn!(ino, "directory record does not parse, counting its identifier only");
                        }
                    },
                    Ok(RecordKind::File) => {}
                    Err(_) => {
                        corrupt += 1;
                        warn!(ino, "record header does not parse, counting its identifier only");
                    }
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Deleted between readdir and read; its identifier
                    // still counts.
                }
                Err(e) => {
                    corrupt += 1;
                    warn!(ino, "overlay record unreadable: {e}");
                }
            }
        }
    }

    info!(records, corrupt, max, "overlay scan complete");
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::{DirContents, DirEntry};
    use crate::types::{S_IFDIR, S_IFREG};

    async fn open_store(dir: &tempfile::TempDir) -> OverlayFileStore {
        OverlayFileStore::open(dir.path().join("overlay"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_scans_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp).await;
        assert_eq!(scan_max_inode(&store).await, ROOT_INODE);
    }

    #[tokio::test]
    async fn test_counts_record_identifiers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp).await;

        store.save_directory(2, &DirContents::new()).await.unwrap();
        store.create_file(9, b"contents").await.unwrap();

        assert_eq!(scan_max_inode(&store).await, 9);
    }

    #[tokio::test]
    async fn test_counts_identifiers_referenced_by_listings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp).await;

        let mut dir = DirContents::new();
        dir.insert("f", DirEntry::materialized(S_IFREG | 0o644, 40));
        dir.insert("d", DirEntry::materialized(S_IFDIR | 0o755, 41));
        store.save_directory(2, &dir).await.unwrap();

        assert_eq!(scan_max_inode(&store).await, 41);
    }

    #[tokio::test]
    async fn test_corrupt_record_counts_own_identifier_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp).await;

        let mut dir = DirContents::new();
        dir.insert("f", DirEntry::materialized(S_IFREG | 0o644, 99));
        store.save_directory(25, &dir).await.unwrap();

        // Truncate: the reference to 99 is lost, 25 itself still counts.
        fs::write(store.record_path(25), b"").await.unwrap();
        assert_eq!(scan_max_inode(&store).await, 25);
    }

    #[tokio::test]
    async fn test_orphaned_records_still_count() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp).await;

        // Nothing links to 300; its identifier must survive recovery.
        store.create_file(300, b"orphan").await.unwrap();
        store.save_directory(ROOT_INODE, &DirContents::new()).await.unwrap();

        assert_eq!(scan_max_inode(&store).await, 300);
    }

    #[tokio::test]
    async fn test_tmp_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(&tmp).await;

        store.create_file(5, b"x").await.unwrap();
        let stray = store.root_path().join("07").join("777.tmp");
        fs::write(&stray, b"partial").await.unwrap();

        assert_eq!(scan_max_inode(&store).await, 5);
    }
}
