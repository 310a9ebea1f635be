use serde::{Deserialize, Serialize};

/// Identifier of a filesystem object, unique for the lifetime of a mount.
pub type InodeId = u64;

/// The mount root. Identifier allocation starts above this value.
pub const ROOT_INODE: InodeId = 1;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    Regular,
    Directory,
    Symlink,
    Unknown,
}

impl Dtype {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => Dtype::Directory,
            S_IFREG => Dtype::Regular,
            S_IFLNK => Dtype::Symlink,
            _ => Dtype::Unknown,
        }
    }

    /// One-character tag used by the debug dump.
    pub fn as_char(&self) -> char {
        match self {
            Dtype::Directory => 'd',
            Dtype::Regular => 'f',
            Dtype::Symlink => 'l',
            Dtype::Unknown => '?',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        seconds: 0,
        nanoseconds: 0,
    };

    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: now.as_secs(),
            nanoseconds: now.subsec_nanos(),
        }
    }
}

/// Result of `NodeView::stat`. Unmaterialized objects synthesize their
/// mtime from the caller-supplied fallback (there is no local mtime yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub mode: u32,
    pub size: u64,
    pub mtime: Timestamp,
}

impl Stat {
    pub fn dtype(&self) -> Dtype {
        Dtype::from_mode(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_from_mode() {
        assert_eq!(Dtype::from_mode(S_IFDIR | 0o755), Dtype::Directory);
        assert_eq!(Dtype::from_mode(S_IFREG | 0o644), Dtype::Regular);
        assert_eq!(Dtype::from_mode(S_IFLNK | 0o777), Dtype::Symlink);
        assert_eq!(Dtype::from_mode(0), Dtype::Unknown);
    }

    #[test]
    fn test_dtype_chars() {
        assert_eq!(Dtype::Directory.as_char(), 'd');
        assert_eq!(Dtype::Regular.as_char(), 'f');
        assert_eq!(Dtype::Unknown.as_char(), '?');
    }
}
