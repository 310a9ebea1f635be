use std::path::PathBuf;

/// Mount-level configuration consumed at `Mount::initialize`.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Directory holding the overlay store for this mount.
    pub overlay_root: PathBuf,
}

impl MountConfig {
    pub fn new(overlay_root: impl Into<PathBuf>) -> Self {
        Self {
            overlay_root: overlay_root.into(),
        }
    }
}
