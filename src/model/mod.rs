pub mod hash;
pub mod store;
pub mod tree;

pub use hash::ObjectHash;
pub use store::{BlobMetadata, FetchContext, ObjectStore};
pub use tree::{Tree, TreeEntry, TreeEntryKind};
