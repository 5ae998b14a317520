mod audit;
mod collections;
mod edit;
mod files;
mod reconcile;
mod songs;

use std::sync::Arc;

use catalog::{Catalog, CatalogError};
use common::{
    compute_file_name, file_relpath, resolve_dir, AssetFile, AssetType, Collection,
    CollectionRef, FileMetadata, Song, SongRef,
};
use storage::{FileStore, StoreError};
use tracing::error;

pub use audit::{AuditIssue, AuditIssueKind, AuditReport};
pub use collections::CollectionUpdate;
pub use edit::{
    AssetEntry, AssetGroupEdit, CollectionEntry, FailureKind, FileEntry, FileFailure, Payload,
    ReconcileReport, SongEdit,
};
pub use files::{BatchDeleteReport, CollectionChange, FileUpdate, UploadCollection, UploadRequest};
pub use songs::{SongDeletion, SongUpdate};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AssetOptions {
    pub max_upload_bytes: usize,
    /// Fill blank recording metadata from the payload's own tags.
    pub fill_tags_from_audio: bool,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fill_tags_from_audio: true,
        }
    }
}

/// Keeps catalog rows and stored bytes in step for songs, collections and
/// files.
pub struct AssetManager {
    catalog: Catalog,
    store: Arc<dyn FileStore>,
    options: AssetOptions,
}

impl AssetManager {
    pub fn new(catalog: Catalog, store: Arc<dyn FileStore>, options: AssetOptions) -> Self {
        Self {
            catalog,
            store,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    pub fn options(&self) -> &AssetOptions {
        &self.options
    }

    fn require_song(&self, song_id: u64) -> Result<Song, AssetError> {
        self.catalog
            .get_song(song_id)?
            .ok_or_else(|| AssetError::NotFound(format!("song {} not found", song_id)))
    }

    fn require_collection(&self, collection_id: u64) -> Result<Collection, AssetError> {
        self.catalog
            .get_collection(collection_id)?
            .ok_or_else(|| AssetError::NotFound(format!("collection {} not found", collection_id)))
    }

    fn require_file(&self, file_id: u64) -> Result<AssetFile, AssetError> {
        self.catalog
            .get_file(file_id)?
            .ok_or_else(|| AssetError::NotFound(format!("file {} not found", file_id)))
    }

    /// Path a file should live at given its current song and collection rows.
    fn expected_path(&self, song: &Song, file: &AssetFile) -> Result<String, AssetError> {
        let collection = match file.collection_id {
            Some(collection_id) => Some(self.require_collection(collection_id)?),
            None => None,
        };
        Ok(planned_path(
            song,
            collection.as_ref(),
            file.asset_type,
            &file.metadata,
            &file.extension,
        ))
    }

    /// Moves the bytes from `current` to `next` when their paths differ, then
    /// writes the `next` row. A failed row write moves the bytes back.
    fn commit_file(&self, current: &AssetFile, next: &AssetFile) -> Result<(), AssetError> {
        let moved = current.file_path != next.file_path;
        if moved {
            if let Some(owner) = self.catalog.find_file_by_path(&next.file_path)? {
                if owner.id != next.id {
                    return Err(AssetError::Conflict(format!(
                        "{} already belongs to file {}",
                        next.file_path, owner.id
                    )));
                }
            }
            self.store
                .move_file(&current.file_path, &next.file_path)
                .map_err(|err| match err {
                    StoreError::NotFound(path) => AssetError::MissingSource(path),
                    StoreError::AlreadyExists(path) => {
                        AssetError::Conflict(format!("{} is occupied", path))
                    }
                    other => AssetError::Store(other),
                })?;
        }

        let result = match self.catalog.update_file(next) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AssetError::NotFound(format!("file {} not found", next.id))),
            Err(err) => Err(AssetError::from(err)),
        };
        if result.is_err() && moved {
            if let Err(err) = self.store.move_file(&next.file_path, &current.file_path) {
                error!(
                    "could not move {} back to {}: {}",
                    next.file_path, current.file_path, err
                );
            }
        }
        result
    }
}

pub(crate) fn planned_path(
    song: &Song,
    collection: Option<&Collection>,
    asset_type: AssetType,
    metadata: &FileMetadata,
    extension: &str,
) -> String {
    let dir = resolve_dir(
        SongRef::from(song),
        asset_type,
        collection.map(CollectionRef::from),
    );
    file_relpath(
        &dir,
        &compute_file_name(metadata, asset_type, &song.name, extension),
    )
}

#[derive(Debug)]
pub enum AssetError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge { size: usize, limit: usize },
    MissingSource(String),
    Store(StoreError),
    Catalog(CatalogError),
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetError::BadRequest(message) => write!(f, "bad request: {}", message),
            AssetError::NotFound(message) => write!(f, "{}", message),
            AssetError::Conflict(message) => write!(f, "conflict: {}", message),
            AssetError::PayloadTooLarge { size, limit } => {
                write!(f, "payload of {} bytes exceeds limit of {} bytes", size, limit)
            }
            AssetError::MissingSource(path) => write!(f, "stored file missing: {}", path),
            AssetError::Store(err) => write!(f, "storage error: {}", err),
            AssetError::Catalog(err) => write!(f, "catalog error: {}", err),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<StoreError> for AssetError {
    fn from(err: StoreError) -> Self {
        AssetError::Store(err)
    }
}

impl From<CatalogError> for AssetError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::PathTaken(path) => {
                AssetError::Conflict(format!("{} is already in use", path))
            }
            CatalogError::Reference(message) => AssetError::BadRequest(message),
            other => AssetError::Catalog(other),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use common::SongDraft;
    use storage::LocalFileStore;

    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub manager: AssetManager,
    }

    impl Fixture {
        pub fn exists(&self, relpath: &str) -> bool {
            self.manager.store().exists(relpath).unwrap()
        }

        pub fn root_has(&self, relpath: &str) -> bool {
            self.dir.path().join("uploads").join(relpath).exists()
        }

        pub fn song(&self, name: &str) -> Song {
            self.manager
                .create_song(&SongDraft {
                    name: name.to_string(),
                    ..SongDraft::default()
                })
                .unwrap()
        }
    }

    pub fn fixture() -> Fixture {
        fixture_with(AssetOptions::default())
    }

    pub fn fixture_with(options: AssetOptions) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.redb")).unwrap();
        let store = LocalFileStore::new(dir.path().join("uploads")).unwrap();
        let manager = AssetManager::new(catalog, Arc::new(store), options);
        Fixture { dir, manager }
    }

    pub fn meta(name: &str, album: &str, date: &str) -> FileMetadata {
        FileMetadata {
            name: name.to_string(),
            album: album.to_string(),
            date: date.to_string(),
            ..FileMetadata::default()
        }
    }
}
