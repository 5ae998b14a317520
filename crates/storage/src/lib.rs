//! Physical storage of asset bytes behind one trait, addressed by
//! `/`-separated paths relative to the store root.

mod folder;
mod local;

pub use folder::{FolderApi, FolderNode, FolderTreeStore, MemoryFolderApi};
pub use local::LocalFileStore;

pub trait FileStore: Send + Sync {
    /// Writes `bytes` at `relpath`, creating parent directories and replacing
    /// any existing file.
    fn put(&self, relpath: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn get(&self, relpath: &str) -> Result<Vec<u8>, StoreError>;

    /// True when a regular file is stored at `relpath`.
    fn exists(&self, relpath: &str) -> Result<bool, StoreError>;

    /// Fails with `NotFound` when `from` is missing and with `AlreadyExists`
    /// when a different file already sits at `to`. Moving onto itself is a
    /// no-op.
    fn move_file(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// Missing files are not an error.
    fn delete(&self, relpath: &str) -> Result<(), StoreError>;

    fn ensure_dir(&self, relpath: &str) -> Result<(), StoreError>;

    /// Removes a directory and everything under it. Missing is not an error.
    fn remove_tree(&self, relpath: &str) -> Result<(), StoreError>;

    /// Removes empty directories under `relpath`, including `relpath` itself
    /// when it ends up empty.
    fn prune_empty_dirs(&self, relpath: &str) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    NotFound(String),
    AlreadyExists(String),
    InvalidPath(String),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {}", err),
            StoreError::NotFound(path) => write!(f, "not found: {}", path),
            StoreError::AlreadyExists(path) => write!(f, "already exists: {}", path),
            StoreError::InvalidPath(path) => write!(f, "invalid path: {:?}", path),
            StoreError::Backend(message) => write!(f, "backend error: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

/// Splits a relative path into its meaningful segments. Empty, `.` and `..`
/// segments are dropped.
pub(crate) fn segments(relpath: &str) -> Vec<&str> {
    relpath
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect()
}

/// Segments of a path that must name something below the root.
pub(crate) fn non_root_segments(relpath: &str) -> Result<Vec<&str>, StoreError> {
    let parts = segments(relpath);
    if parts.is_empty() {
        return Err(StoreError::InvalidPath(relpath.to_string()));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_drop_traversal() {
        assert_eq!(segments("a/../b/./c"), vec!["a", "b", "c"]);
        assert_eq!(segments("a\\b"), vec!["a", "b"]);
        assert!(segments("/").is_empty());
    }

    #[test]
    fn root_is_not_a_valid_target() {
        assert!(matches!(
            non_root_segments(".."),
            Err(StoreError::InvalidPath(_))
        ));
    }
}
