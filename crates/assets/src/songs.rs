use std::collections::HashMap;

use common::{resolve_dir, song_dir, Collection, CollectionRef, Song, SongDraft, SongRef};
use serde::Serialize;
use tracing::{info, warn};

use crate::edit::FileFailure;
use crate::{planned_path, AssetError, AssetManager};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongUpdate {
    pub song: Song,
    pub moved: Vec<u64>,
    pub failures: Vec<FileFailure>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDeletion {
    pub song_id: u64,
    pub collections: usize,
    pub files: usize,
    pub failures: Vec<FileFailure>,
}

impl AssetManager {
    pub fn create_song(&self, draft: &SongDraft) -> Result<Song, AssetError> {
        self.check_song_dir_free(None, &draft.name)?;
        let song = self.catalog.create_song(draft)?;
        self.store.ensure_dir(&song_dir(SongRef::from(&song)))?;
        info!("Created song {} ({:?})", song.id, song.name);
        Ok(song)
    }

    pub fn update_song(&self, song_id: u64, draft: &SongDraft) -> Result<SongUpdate, AssetError> {
        let current = self.require_song(song_id)?;
        let mut moved = Vec::new();
        let mut failures = Vec::new();
        let song = self.apply_song_fields(&current, draft, &mut moved, &mut failures)?;
        Ok(SongUpdate {
            song,
            moved,
            failures,
        })
    }

    /// Writes the song row and, when the name changed, moves every file of
    /// the song to its recomputed path. Files that fail to move keep their
    /// old row path and are reported.
    pub(crate) fn apply_song_fields(
        &self,
        current: &Song,
        draft: &SongDraft,
        moved: &mut Vec<u64>,
        failures: &mut Vec<FileFailure>,
    ) -> Result<Song, AssetError> {
        let renamed = current.name != draft.name;
        if renamed {
            self.check_song_dir_free(Some(current.id), &draft.name)?;
        }
        let song = self
            .catalog
            .update_song(current.id, draft)?
            .ok_or_else(|| AssetError::NotFound(format!("song {} not found", current.id)))?;
        if renamed {
            self.cascade_song_rename(current, &song, moved, failures)?;
        }
        Ok(song)
    }

    fn cascade_song_rename(
        &self,
        old: &Song,
        new: &Song,
        moved: &mut Vec<u64>,
        failures: &mut Vec<FileFailure>,
    ) -> Result<(), AssetError> {
        let old_root = song_dir(SongRef::from(old));
        let new_root = song_dir(SongRef::from(new));
        info!(
            "Renaming song {} from {:?} to {:?}",
            new.id, old.name, new.name
        );

        self.store.ensure_dir(&new_root)?;
        let collections: HashMap<u64, Collection> = self
            .catalog
            .list_song_collections(new.id)?
            .into_iter()
            .map(|collection| (collection.id, collection))
            .collect();
        for collection in collections.values() {
            let dir = resolve_dir(
                SongRef::from(new),
                collection.asset_type,
                Some(CollectionRef::from(collection)),
            );
            if let Err(err) = self.store.ensure_dir(&dir) {
                warn!("could not create collection directory {}: {}", dir, err);
            }
        }

        for file in self.catalog.list_song_files(new.id)? {
            let collection = file.collection_id.and_then(|id| collections.get(&id));
            let target = planned_path(
                new,
                collection,
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
                    warn!("skipping file {} during song rename: {}", file.id, err);
                    failures.push(FileFailure::new(Some(file.id), &file.file_path, &err));
                }
            }
        }

        if old_root != new_root {
            if let Err(err) = self.store.prune_empty_dirs(&old_root) {
                warn!("could not prune {}: {}", old_root, err);
            }
        }
        Ok(())
    }

    /// Deletes the song's rows in one catalog transaction, then its bytes.
    pub fn delete_song(&self, song_id: u64) -> Result<SongDeletion, AssetError> {
        let removal = self
            .catalog
            .delete_song(song_id)?
            .ok_or_else(|| AssetError::NotFound(format!("song {} not found", song_id)))?;

        let mut failures = Vec::new();
        for file in &removal.files {
            if let Err(err) = self.store.delete(&file.file_path) {
                warn!("could not delete {}: {}", file.file_path, err);
                failures.push(FileFailure::new(
                    Some(file.id),
                    &file.file_path,
                    &AssetError::Store(err),
                ));
            }
        }
        let root = song_dir(SongRef::from(&removal.song));
        if let Err(err) = self.store.remove_tree(&root) {
            warn!("could not remove {}: {}", root, err);
            failures.push(FileFailure::new(None, &root, &AssetError::Store(err)));
        }

        info!(
            "Deleted song {} with {} collections and {} files",
            song_id,
            removal.collections.len(),
            removal.files.len()
        );
        Ok(SongDeletion {
            song_id,
            collections: removal.collections.len(),
            files: removal.files.len(),
            failures,
        })
    }

    /// Two songs may not share a root directory. An unnamed song lives in
    /// `song_{id}`, so a new song needs a name before its id exists.
    pub(crate) fn check_song_dir_free(
        &self,
        song_id: Option<u64>,
        name: &str,
    ) -> Result<(), AssetError> {
        let candidate = match song_id {
            Some(id) => song_dir(SongRef { id, name }),
            None if name.trim().is_empty() => {
                return Err(AssetError::BadRequest("song name is required".to_string()))
            }
            None => song_dir(SongRef { id: 0, name }),
        };
        for song in self.catalog.list_songs()? {
            if Some(song.id) != song_id && song_dir(SongRef::from(&song)) == candidate {
                return Err(AssetError::Conflict(format!(
                    "song {} already uses directory {:?}",
                    song.id, candidate
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::AssetType;

    use crate::testing::{fixture, meta};
    use crate::{AssetError, FailureKind, Payload, UploadCollection, UploadRequest};

    use super::*;

    fn upload_lyrics(f: &crate::testing::Fixture, song_id: u64, name: &str) -> common::AssetFile {
        f.manager
            .upload(UploadRequest {
                song_id,
                asset_type: AssetType::Lyrics,
                collection: UploadCollection::Ungrouped,
                replace_file_id: None,
                metadata: meta(name, "", ""),
                payload: Payload {
                    file_name: "words.txt".to_string(),
                    bytes: name.as_bytes().to_vec(),
                },
            })
            .unwrap()
    }

    #[test]
    fn create_song_makes_root_directory() {
        let f = fixture();
        let song = f.song("Amazing Grace");
        assert_eq!(song.status, "Active");
        assert!(f.root_has("Amazing Grace"));
    }

    #[test]
    fn songs_cannot_share_a_directory() {
        let f = fixture();
        f.song("A/B");
        let err = f
            .manager
            .create_song(&SongDraft {
                name: "A:B".to_string(),
                ..SongDraft::default()
            })
            .unwrap_err();
        assert!(matches!(err, AssetError::Conflict(_)));
    }

    #[test]
    fn unnamed_song_cannot_take_a_named_songs_directory() {
        let f = fixture();
        let first = f.song("placeholder");
        let second = f.song("Other");
        let squatter = f
            .manager
            .update_song(
                first.id,
                &SongDraft {
                    name: format!("song_{}", second.id),
                    ..SongDraft::default()
                },
            )
            .unwrap();
        let kept = upload_lyrics(&f, squatter.song.id, "Verse");

        let err = f
            .manager
            .update_song(second.id, &SongDraft::default())
            .unwrap_err();
        assert!(matches!(err, AssetError::Conflict(_)));

        f.manager.delete_song(second.id).unwrap();
        assert!(f.exists(&kept.file_path));
        assert!(f.manager.catalog().get_file(kept.id).unwrap().is_some());
    }

    #[test]
    fn new_song_needs_a_name() {
        let f = fixture();
        let err = f.manager.create_song(&SongDraft::default()).unwrap_err();
        assert!(matches!(err, AssetError::BadRequest(_)));
    }

    #[test]
    fn rename_moves_every_file_and_prunes_old_root() {
        let f = fixture();
        let song = f.song("Old");
        let verse = upload_lyrics(&f, song.id, "Verse");
        assert_eq!(verse.file_path, "Old/Lyrics/Old - Verse.txt");

        let update = f
            .manager
            .update_song(
                song.id,
                &SongDraft {
                    name: "New".to_string(),
                    status: "Active".to_string(),
                    ..SongDraft::default()
                },
            )
            .unwrap();
        assert_eq!(update.moved, vec![verse.id]);
        assert!(update.failures.is_empty());

        let stored = f.manager.catalog().get_file(verse.id).unwrap().unwrap();
        assert_eq!(stored.file_path, "New/Lyrics/New - Verse.txt");
        assert!(f.exists(&stored.file_path));
        assert!(!f.root_has("Old"));
    }

    #[test]
    fn rename_to_same_name_moves_nothing() {
        let f = fixture();
        let song = f.song("Same");
        upload_lyrics(&f, song.id, "Verse");
        let update = f
            .manager
            .update_song(
                song.id,
                &SongDraft {
                    name: "Same".to_string(),
                    description: "new words".to_string(),
                    ..SongDraft::default()
                },
            )
            .unwrap();
        assert!(update.moved.is_empty());
        assert_eq!(update.song.description, "new words");
    }

    #[test]
    fn rename_skips_files_with_missing_bytes() {
        let f = fixture();
        let song = f.song("Old");
        let gone = upload_lyrics(&f, song.id, "Gone");
        let kept = upload_lyrics(&f, song.id, "Kept");
        f.manager.store().delete(&gone.file_path).unwrap();

        let update = f
            .manager
            .update_song(
                song.id,
                &SongDraft {
                    name: "New".to_string(),
                    ..SongDraft::default()
                },
            )
            .unwrap();
        assert_eq!(update.moved, vec![kept.id]);
        assert_eq!(update.failures.len(), 1);
        assert_eq!(update.failures[0].kind, FailureKind::MissingSource);

        let unchanged = f.manager.catalog().get_file(gone.id).unwrap().unwrap();
        assert_eq!(unchanged.file_path, gone.file_path);
    }

    #[test]
    fn delete_song_removes_rows_and_bytes() {
        let f = fixture();
        let song = f.song("Doomed");
        let other = f.song("Survivor");
        upload_lyrics(&f, song.id, "One");
        upload_lyrics(&f, song.id, "Two");
        let survivor = upload_lyrics(&f, other.id, "Three");

        let deletion = f.manager.delete_song(song.id).unwrap();
        assert_eq!(deletion.files, 2);
        assert!(deletion.failures.is_empty());
        assert!(!f.root_has("Doomed"));
        assert!(f.manager.catalog().get_song(song.id).unwrap().is_none());
        assert!(f.manager.catalog().list_song_files(song.id).unwrap().is_empty());
        assert!(f.exists(&survivor.file_path));

        assert!(matches!(
            f.manager.delete_song(song.id),
            Err(AssetError::NotFound(_))
        ));
    }
}
