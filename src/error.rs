use crate::types::InodeId;
use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// `Corrupt` is recoverable: readers treat the record as absent and the
/// recovery scanner still counts its identifier. Write-side `Io` failures
/// are always propagated to the caller, never retried here.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("overlay record {ino} is corrupt: {detail}")]
    Corrupt { ino: InodeId, detail: String },

    #[error("no overlay record for inode {0}")]
    NotFound(InodeId),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("not a regular file")]
    NotARegularFile,

    #[error("backing store fetch failed: {0}")]
    FetchFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("overlay is closed")]
    Closed,
}

impl OverlayError {
    pub fn corrupt(ino: InodeId, detail: impl Into<String>) -> Self {
        OverlayError::Corrupt {
            ino,
            detail: detail.into(),
        }
    }

    /// An equivalent error value. Batched operations report one underlying
    /// failure through several per-field results; `std::io::Error` is not
    /// `Clone`, so the copy re-describes it instead.
    pub fn duplicate(&self) -> Self {
        match self {
            OverlayError::Corrupt { ino, detail } => OverlayError::Corrupt {
                ino: *ino,
                detail: detail.clone(),
            },
            OverlayError::NotFound(ino) => OverlayError::NotFound(*ino),
            OverlayError::PathNotFound(path) => OverlayError::PathNotFound(path.clone()),
            OverlayError::Io(e) => OverlayError::Io(std::io::Error::new(e.kind(), e.to_string())),
            OverlayError::NotADirectory => OverlayError::NotADirectory,
            OverlayError::IsADirectory => OverlayError::IsADirectory,
            OverlayError::NotARegularFile => OverlayError::NotARegularFile,
            OverlayError::FetchFailed(detail) => OverlayError::FetchFailed(detail.clone()),
            OverlayError::Cancelled => OverlayError::Cancelled,
            OverlayError::Closed => OverlayError::Closed,
        }
    }

    /// True for errors the recovery path tolerates rather than propagates.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OverlayError::Corrupt { .. } | OverlayError::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OverlayError>;
