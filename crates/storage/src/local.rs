use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::{non_root_segments, segments, FileStore, StoreError};

/// Stores files under a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, relpath: &str) -> PathBuf {
        let mut out = self.root.clone();
        for part in segments(relpath) {
            out.push(part);
        }
        out
    }

    fn file_path(&self, relpath: &str) -> Result<PathBuf, StoreError> {
        non_root_segments(relpath)?;
        Ok(self.full_path(relpath))
    }
}

impl FileStore for LocalFileStore {
    fn put(&self, relpath: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.file_path(relpath)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn get(&self, relpath: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.file_path(relpath)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(relpath.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, relpath: &str) -> Result<bool, StoreError> {
        Ok(self.file_path(relpath)?.is_file())
    }

    fn move_file(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let source = self.file_path(from)?;
        let target = self.file_path(to)?;
        if source == target {
            return Ok(());
        }
        if !source.is_file() {
            return Err(StoreError::NotFound(from.to_string()));
        }
        if target.exists() {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;
        Ok(())
    }

    fn delete(&self, relpath: &str) -> Result<(), StoreError> {
        let path = self.file_path(relpath)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_dir(&self, relpath: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.full_path(relpath))?;
        Ok(())
    }

    fn remove_tree(&self, relpath: &str) -> Result<(), StoreError> {
        let path = self.file_path(relpath)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn prune_empty_dirs(&self, relpath: &str) -> Result<(), StoreError> {
        let start = self.full_path(relpath);
        if !start.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&start).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("prune walk error under {:?}: {}", start, err);
                    continue;
                }
            };
            if !entry.file_type().is_dir() || entry.path() == self.root {
                continue;
            }
            let is_empty = fs::read_dir(entry.path())?.next().is_none();
            if is_empty {
                fs::remove_dir(entry.path())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("uploads")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_creates_parents_and_overwrites() {
        let (_dir, store) = store();
        store.put("S/Lyrics/S - Lyrics.txt", b"one").unwrap();
        store.put("S/Lyrics/S - Lyrics.txt", b"two").unwrap();
        assert_eq!(store.get("S/Lyrics/S - Lyrics.txt").unwrap(), b"two");
        assert!(store.exists("S/Lyrics/S - Lyrics.txt").unwrap());
        assert!(!store.exists("S/Lyrics").unwrap());
    }

    #[test]
    fn move_reports_missing_source_and_occupied_target() {
        let (_dir, store) = store();
        assert!(matches!(
            store.move_file("nope", "b"),
            Err(StoreError::NotFound(_))
        ));
        store.put("a", b"a").unwrap();
        store.put("b", b"b").unwrap();
        assert!(matches!(
            store.move_file("a", "b"),
            Err(StoreError::AlreadyExists(_))
        ));
        store.move_file("a", "x/y/a").unwrap();
        assert!(!store.exists("a").unwrap());
        assert_eq!(store.get("x/y/a").unwrap(), b"a");
        store.move_file("x/y/a", "x/y/a").unwrap();
    }

    #[test]
    fn delete_and_remove_tree_tolerate_missing() {
        let (_dir, store) = store();
        store.delete("missing.txt").unwrap();
        store.remove_tree("missing").unwrap();
        store.put("S/Recordings/a.mp3", b"a").unwrap();
        store.remove_tree("S").unwrap();
        assert!(!store.root().join("S").exists());
    }

    #[test]
    fn prune_removes_only_empty_directories() {
        let (_dir, store) = store();
        store.ensure_dir("S/Recordings/Live").unwrap();
        store.ensure_dir("S/Lyrics").unwrap();
        store.put("S/Sheet Music/p.pdf", b"p").unwrap();
        store.prune_empty_dirs("S").unwrap();
        assert!(!store.root().join("S/Recordings").exists());
        assert!(!store.root().join("S/Lyrics").exists());
        assert!(store.exists("S/Sheet Music/p.pdf").unwrap());

        store.delete("S/Sheet Music/p.pdf").unwrap();
        store.prune_empty_dirs("S").unwrap();
        assert!(!store.root().join("S").exists());
        assert!(store.root().exists());
    }

    #[test]
    fn traversal_stays_inside_root() {
        let (dir, store) = store();
        store.put("../escape.txt", b"x").unwrap();
        assert!(!dir.path().join("escape.txt").exists());
        assert!(store.exists("escape.txt").unwrap());
    }
}
