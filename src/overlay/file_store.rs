use crate::dir::DirContents;
use crate::error::{OverlayError, Result};
use crate::lock_manager::LockManager;
use crate::types::InodeId;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

/// Every overlay record starts with a fixed-size header: a 4-byte kind tag,
/// a big-endian format version, then zero padding. Readers seek past
/// `HEADER_LENGTH` to reach the raw content.
pub const HEADER_LENGTH: u64 = 64;
pub const HEADER_TAG_DIR: [u8; 4] = *b"SFDR";
pub const HEADER_TAG_FILE: [u8; 4] = *b"SFFL";
pub const FORMAT_VERSION: u32 = 1;

const INFO_FILE: &str = "info";
const INFO_MAGIC: [u8; 4] = *b"SFOV";
const NEXT_INODE_FILE: &str = "next-inode-number";
const SHARD_COUNT: u64 = 256;
const TMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Directory,
    File,
}

fn make_header(kind: RecordKind) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LENGTH as usize);
    buf.put_slice(match kind {
        RecordKind::Directory => &HEADER_TAG_DIR,
        RecordKind::File => &HEADER_TAG_FILE,
    });
    buf.put_u32(FORMAT_VERSION);
    buf.resize(HEADER_LENGTH as usize, 0);
    buf
}

pub(crate) fn parse_header(ino: InodeId, data: &[u8]) -> Result<RecordKind> {
    if data.len() < HEADER_LENGTH as usize {
        return Err(OverlayError::corrupt(
            ino,
            format!("record shorter than header ({} bytes)", data.len()),
        ));
    }
    let kind = if data[0..4] == HEADER_TAG_DIR {
        RecordKind::Directory
    } else if data[0..4] == HEADER_TAG_FILE {
        RecordKind::File
    } else {
        return Err(OverlayError::corrupt(
            ino,
            format!("unknown record tag {:02x?}", &data[0..4]),
        ));
    };
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(OverlayError::corrupt(
            ino,
            format!("unsupported record version {version}"),
        ));
    }
    Ok(kind)
}

/// Decodes a complete directory record (header + body).
pub(crate) fn decode_directory(ino: InodeId, data: &[u8]) -> Result<DirContents> {
    match parse_header(ino, data)? {
        RecordKind::Directory => {}
        RecordKind::File => {
            return Err(OverlayError::corrupt(ino, "file record where directory expected"))
        }
    }
    let dir: DirContents = bincode::deserialize(&data[HEADER_LENGTH as usize..])
        .map_err(|e| OverlayError::corrupt(ino, format!("listing does not parse: {e}")))?;
    for (name, entry) in dir.iter() {
        if entry.ino == Some(0) {
            return Err(OverlayError::corrupt(
                ino,
                format!("entry {name:?} carries a nil identifier"),
            ));
        }
    }
    Ok(dir)
}

/// Durable, sharded store of per-inode overlay records.
///
/// Records live at `<root>/<low-byte-of-id-in-hex>/<decimal-id>`; the shard
/// level bounds directory fan-out. Writes land on a temp path and are
/// renamed into place, so a crash never exposes a half-written record.
pub struct OverlayFileStore {
    root: PathBuf,
    locks: LockManager,
    gate: Arc<RwLock<()>>,
    closed: AtomicBool,
}

impl OverlayFileStore {
    /// Opens or creates the on-disk hierarchy rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let info_path = root.join(INFO_FILE);
        match fs::read(&info_path).await {
            Ok(data) => validate_info(&data)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut buf = BytesMut::with_capacity(8);
                buf.put_slice(&INFO_MAGIC);
                buf.put_u32(FORMAT_VERSION);
                fs::write(&info_path, &buf).await?;
                info!(root = %root.display(), "created overlay store");
            }
            Err(e) => return Err(e.into()),
        }

        for shard in 0..SHARD_COUNT {
            let dir = root.join(format!("{shard:02x}"));
            match fs::create_dir(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self {
            root,
            locks: LockManager::new(),
            gate: Arc::new(RwLock::new(())),
            closed: AtomicBool::new(false),
        })
    }

    /// Relative record path for an identifier: two hex digits of the low
    /// byte, then the decimal identifier (`1 -> "01/1"`, `1234 -> "d2/1234"`).
    pub fn record_relative_path(ino: InodeId) -> String {
        format!("{:02x}/{}", ino & 0xff, ino)
    }

    pub fn record_path(&self, ino: InodeId) -> PathBuf {
        self.root.join(Self::record_relative_path(ino))
    }

    pub(crate) fn root_path(&self) -> &Path {
        &self.root
    }

    async fn begin_op(&self) -> Result<OwnedRwLockReadGuard<()>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OverlayError::Closed);
        }
        Ok(self.gate.clone().read_owned().await)
    }

    /// Writes `data` to the record's temp path, then renames it onto the
    /// final path. The rename is the commit point.
    async fn write_record(&self, ino: InodeId, data: &[u8]) -> Result<()> {
        let final_path = self.record_path(ino);
        let tmp_path = final_path.with_extension(TMP_SUFFIX);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_data().await?;
        drop(file);

        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    /// Atomically replaces the directory record for `ino`.
    pub async fn save_directory(&self, ino: InodeId, dir: &DirContents) -> Result<()> {
        let _op = self.begin_op().await?;
        let _guard = self.locks.acquire_write(ino).await;

        let body = bincode::serialize(dir).map_err(std::io::Error::other)?;
        let mut record = make_header(RecordKind::Directory);
        record.extend_from_slice(&body);

        debug!(ino, entries = dir.len(), "saving directory record");
        self.write_record(ino, &record).await
    }

    /// Loads the directory record for `ino`. `Ok(None)` when no record
    /// exists; `Corrupt` when one exists but does not parse.
    pub async fn load_directory(&self, ino: InodeId) -> Result<Option<DirContents>> {
        let _op = self.begin_op().await?;
        let _guard = self.locks.acquire_read(ino).await;

        let data = match fs::read(self.record_path(ino)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_directory(ino, &data).map(Some)
    }

    /// Creates (or replaces) the file record for `ino` with `content`.
    pub async fn create_file(&self, ino: InodeId, content: &[u8]) -> Result<()> {
        let _op = self.begin_op().await?;
        let _guard = self.locks.acquire_write(ino).await;

        let mut record = make_header(RecordKind::File);
        record.extend_from_slice(content);

        debug!(ino, bytes = content.len(), "saving file record");
        self.write_record(ino, &record).await
    }

    /// Opens the file record for `ino`, positioned past the header.
    pub async fn open_file(&self, ino: InodeId) -> Result<OverlayFileHandle> {
        let _op = self.begin_op().await?;
        let _guard = self.locks.acquire_read(ino).await;

        let mut file = match fs::File::open(self.record_path(ino)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OverlayError::NotFound(ino))
            }
            Err(e) => return Err(e.into()),
        };

        let mut header = [0u8; HEADER_LENGTH as usize];
        let mut read = 0;
        while read < header.len() {
            let n = file.read(&mut header[read..]).await?;
            if n == 0 {
                return Err(OverlayError::corrupt(ino, "truncated header"));
            }
            read += n;
        }
        match parse_header(ino, &header)? {
            RecordKind::File => {}
            RecordKind::Directory => {
                return Err(OverlayError::corrupt(ino, "directory record where file expected"))
            }
        }

        Ok(OverlayFileHandle { ino, file })
    }

    /// Deletes the record for `ino`. A missing record is not an error.
    pub async fn remove_record(&self, ino: InodeId) -> Result<()> {
        let _op = self.begin_op().await?;
        let _guard = self.locks.acquire_write(ino).await;

        match fs::remove_file(self.record_path(ino)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the persisted high-water mark and removes it, so its absence
    /// at the next open signals an unclean shutdown.
    pub async fn take_next_inode_number(&self) -> Result<Option<InodeId>> {
        let path = self.root.join(NEXT_INODE_FILE);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        fs::remove_file(&path).await?;

        match data.as_slice().try_into() {
            Ok(bytes) => Ok(Some(u64::from_le_bytes(bytes))),
            Err(_) => {
                warn!(
                    len = data.len(),
                    "next-inode record has unexpected length, treating shutdown as unclean"
                );
                Ok(None)
            }
        }
    }

    async fn write_next_inode_number(&self, next: InodeId) -> Result<()> {
        let final_path = self.root.join(NEXT_INODE_FILE);
        let tmp_path = final_path.with_extension(TMP_SUFFIX);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&next.to_le_bytes()).await?;
        file.sync_data().await?;
        drop(file);

        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    /// Closes the store: rejects new operations, waits for in-flight writes
    /// to drain, then persists the high-water mark as the clean-shutdown
    /// record.
    pub async fn close(&self, next_inode: InodeId) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(OverlayError::Closed);
        }
        let _barrier = self.gate.write().await;
        self.write_next_inode_number(next_inode).await?;
        info!(next_inode, "overlay store closed");
        Ok(())
    }
}

fn validate_info(data: &[u8]) -> Result<()> {
    if data.len() < 8 || data[0..4] != INFO_MAGIC {
        return Err(OverlayError::corrupt(0, "overlay info record is malformed"));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(OverlayError::corrupt(
            0,
            format!("unsupported overlay store version {version}"),
        ));
    }
    Ok(())
}

/// An open file record, positioned past the header.
pub struct OverlayFileHandle {
    ino: InodeId,
    file: fs::File,
}

impl OverlayFileHandle {
    pub fn ino(&self) -> InodeId {
        self.ino
    }

    /// Reads the remaining raw content.
    pub async fn read_content(&mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
