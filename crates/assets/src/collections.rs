use common::{resolve_dir, AssetType, Collection, CollectionRef, Song, SongRef};
use serde::Serialize;
use tracing::{info, warn};

use crate::edit::FileFailure;
use crate::{planned_path, AssetError, AssetManager};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUpdate {
    pub collection: Collection,
    pub moved: Vec<u64>,
    pub failures: Vec<FileFailure>,
    /// False when a delete left the collection in place.
    pub removed: bool,
}

impl AssetManager {
    pub fn create_collection(
        &self,
        song_id: u64,
        asset_type: AssetType,
        name: &str,
        description: &str,
    ) -> Result<Collection, AssetError> {
        let song = self.require_song(song_id)?;
        self.check_collection_dir_free(&song, asset_type, None, name)?;
        let collection = self
            .catalog
            .create_collection(song_id, asset_type, name, description)?;
        self.store.ensure_dir(&collection_dir(&song, &collection))?;
        info!(
            "Created collection {} ({:?}) under song {}",
            collection.id, collection.name, song_id
        );
        Ok(collection)
    }

    pub fn update_collection(
        &self,
        collection_id: u64,
        name: &str,
        description: &str,
    ) -> Result<CollectionUpdate, AssetError> {
        let current = self.require_collection(collection_id)?;
        let song = self.require_song(current.song_id)?;
        let mut moved = Vec::new();
        let mut failures = Vec::new();
        let collection =
            self.apply_collection_fields(&song, &current, name, description, &mut moved, &mut failures)?;
        Ok(CollectionUpdate {
            collection,
            moved,
            failures,
            removed: false,
        })
    }

    /// Member files are moved into the renamed directory before the
    /// collection row is written.
    pub(crate) fn apply_collection_fields(
        &self,
        song: &Song,
        current: &Collection,
        name: &str,
        description: &str,
        moved: &mut Vec<u64>,
        failures: &mut Vec<FileFailure>,
    ) -> Result<Collection, AssetError> {
        if current.name != name {
            self.check_collection_dir_free(song, current.asset_type, Some(current.id), name)?;
            let mut renamed = current.clone();
            renamed.name = name.to_string();
            let old_dir = collection_dir(song, current);
            let new_dir = collection_dir(song, &renamed);
            self.store.ensure_dir(&new_dir)?;

            for file in self.catalog.list_collection_files(current.id)? {
                let target = planned_path(
                    song,
                    Some(&renamed),
                    file.asset_type,
                    &file.metadata,
                    &file.extension,
                );
                if target == file.file_path {
                    continue;
                }
                let mut next = file.clone();
                next.file_path = target;
                match self.commit_file(&file, &next) {
                    Ok(()) => moved.push(file.id),
                    Err(err) => {
                        warn!("skipping file {} during collection rename: {}", file.id, err);
                        failures.push(FileFailure::new(Some(file.id), &file.file_path, &err));
                    }
                }
            }

            if old_dir != new_dir {
                if let Err(err) = self.store.prune_empty_dirs(&old_dir) {
                    warn!("could not prune {}: {}", old_dir, err);
                }
            }
        }

        self.catalog
            .update_collection(current.id, name, description)?
            .ok_or_else(|| AssetError::NotFound(format!("collection {} not found", current.id)))
    }

    /// Removes the collection; its files move to the ungrouped location of
    /// the same asset type and are kept.
    pub fn delete_collection(&self, collection_id: u64) -> Result<CollectionUpdate, AssetError> {
        let collection = self.require_collection(collection_id)?;
        let song = self.require_song(collection.song_id)?;
        let mut moved = Vec::new();
        let mut failures = Vec::new();
        let removed = self.remove_collection(&song, &collection, &mut moved, &mut failures)?;
        Ok(CollectionUpdate {
            collection,
            moved,
            failures,
            removed,
        })
    }

    pub(crate) fn remove_collection(
        &self,
        song: &Song,
        collection: &Collection,
        moved: &mut Vec<u64>,
        failures: &mut Vec<FileFailure>,
    ) -> Result<bool, AssetError> {
        let mut stuck = 0;
        for file in self.catalog.list_collection_files(collection.id)? {
            let mut next = file.clone();
            next.collection_id = None;
            next.file_path = planned_path(
                song,
                None,
                file.asset_type,
                &file.metadata,
                &file.extension,
            );
            match self.commit_file(&file, &next) {
                Ok(()) => moved.push(file.id),
                Err(err) => {
                    warn!("could not ungroup file {}: {}", file.id, err);
                    failures.push(FileFailure::new(Some(file.id), &file.file_path, &err));
                    stuck += 1;
                }
            }
        }

        // A member that could not leave keeps its collection row and folder.
        if stuck > 0 {
            warn!(
                "keeping collection {}: {} files could not be ungrouped",
                collection.id, stuck
            );
            return Ok(false);
        }

        let removal = self.catalog.delete_collection(collection.id)?;
        if let Some(removal) = removal {
            if !removal.detached.is_empty() {
                warn!(
                    "collection {} still had {} files; detached in place",
                    collection.id,
                    removal.detached.len()
                );
            }
        }

        let dir = collection_dir(song, collection);
        if let Err(err) = self.store.prune_empty_dirs(&dir) {
            warn!("could not prune {}: {}", dir, err);
        }
        info!("Removed collection {} from song {}", collection.id, song.id);
        Ok(true)
    }

    /// Collection directories are unique within one song and asset type.
    pub(crate) fn check_collection_dir_free(
        &self,
        song: &Song,
        asset_type: AssetType,
        collection_id: Option<u64>,
        name: &str,
    ) -> Result<(), AssetError> {
        if name.trim().is_empty() {
            return Ok(());
        }
        let candidate = resolve_dir(
            SongRef::from(song),
            asset_type,
            Some(CollectionRef { id: 0, name }),
        );
        for other in self.catalog.list_collections(song.id, asset_type)? {
            if Some(other.id) != collection_id && collection_dir(song, &other) == candidate {
                return Err(AssetError::Conflict(format!(
                    "collection {} already uses directory {:?}",
                    other.id, candidate
                )));
            }
        }
        Ok(())
    }
}

fn collection_dir(song: &Song, collection: &Collection) -> String {
    resolve_dir(
        SongRef::from(song),
        collection.asset_type,
        Some(CollectionRef::from(collection)),
    )
}
