//! Overlay storage engine for a virtual checkout filesystem.
//!
//! The backing store is immutable and content-addressed; everything the
//! checkout changes locally lives in a durable overlay keyed by inode
//! number. This crate persists that overlay with crash-grade consistency,
//! allocates and recovers inode numbers across restarts (clean or not),
//! and answers path queries through a single [`view::NodeView`] sum type
//! whether the object is loaded in memory, known only to the backing
//! store, or materialized on disk.

pub mod clock;
pub mod config;
pub mod dir;
pub mod error;
pub mod inode;
pub mod lock_manager;
pub mod model;
pub mod mount;
pub mod overlay;
pub mod types;
pub mod view;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::MountConfig;
pub use dir::{DirContents, DirEntry};
pub use error::{OverlayError, Result};
pub use model::{BlobMetadata, FetchContext, ObjectHash, ObjectStore, Tree, TreeEntry, TreeEntryKind};
pub use mount::Mount;
pub use overlay::Overlay;
pub use types::{Dtype, InodeId, Stat, Timestamp, ROOT_INODE};
pub use view::{EntryAttributes, NodeView, ViewKind};
