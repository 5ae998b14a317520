use catalog::NewFile;
use common::{content_hash, extension_of, AssetFile, AssetType, Collection, FileMetadata, Song};
use metadata::probe_audio;
use serde::Serialize;
use storage::StoreError;
use tracing::{info, warn};

use crate::edit::{FileFailure, Payload};
use crate::{planned_path, AssetError, AssetManager};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollectionChange {
    #[default]
    Keep,
    Ungroup,
    MoveTo(u64),
}

#[derive(Clone, Debug, Default)]
pub struct FileUpdate {
    pub metadata: Option<FileMetadata>,
    pub collection: CollectionChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadCollection {
    Ungrouped,
    Existing(u64),
    /// Reuses the collection with this directory name or creates it.
    Named(String),
}

#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub song_id: u64,
    pub asset_type: AssetType,
    pub collection: UploadCollection,
    /// Replace the bytes of this file instead of adding a new one.
    pub replace_file_id: Option<u64>,
    pub metadata: FileMetadata,
    pub payload: Payload,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteReport {
    pub deleted: Vec<u64>,
    pub missing: Vec<u64>,
    pub failures: Vec<FileFailure>,
}

impl AssetManager {
    /// Applies new metadata and/or a collection change, moving the bytes
    /// when the computed path changes.
    pub fn update_file(&self, file_id: u64, update: FileUpdate) -> Result<AssetFile, AssetError> {
        let current = self.require_file(file_id)?;
        let song = self.require_song(current.song_id)?;
        let collection_id = match update.collection {
            CollectionChange::Keep => current.collection_id,
            CollectionChange::Ungroup => None,
            CollectionChange::MoveTo(collection_id) => Some(collection_id),
        };
        let collection = self.target_collection(&song, current.asset_type, collection_id)?;

        let mut next = current.clone();
        if let Some(metadata) = update.metadata {
            next.metadata = metadata;
        }
        next.collection_id = collection.as_ref().map(|c| c.id);
        next.file_path = planned_path(
            &song,
            collection.as_ref(),
            next.asset_type,
            &next.metadata,
            &next.extension,
        );
        if next == current {
            return Ok(current);
        }
        self.commit_file(&current, &next)?;
        Ok(next)
    }

    pub fn upload(&self, request: UploadRequest) -> Result<AssetFile, AssetError> {
        self.check_payload_size(request.payload.bytes.len())?;
        let song = self.require_song(request.song_id)?;
        let asset_type = request.asset_type;
        let collection = match &request.collection {
            UploadCollection::Ungrouped => None,
            UploadCollection::Existing(collection_id) => {
                self.target_collection(&song, asset_type, Some(*collection_id))?
            }
            UploadCollection::Named(name) if name.trim().is_empty() => None,
            UploadCollection::Named(name) => {
                Some(self.find_or_create_collection(&song, asset_type, name)?)
            }
        };
        let replace = match request.replace_file_id {
            Some(file_id) => {
                let file = self.require_file(file_id)?;
                if file.song_id != song.id || file.asset_type != asset_type {
                    return Err(AssetError::BadRequest(format!(
                        "file {} is not a {} file of song {}",
                        file_id, asset_type, song.id
                    )));
                }
                Some(file)
            }
            None => None,
        };
        let (file, _) = self.store_upload(
            &song,
            asset_type,
            collection.as_ref(),
            replace,
            request.metadata,
            &request.payload.file_name,
            &request.payload.bytes,
        )?;
        Ok(file)
    }

    pub(crate) fn check_payload_size(&self, size: usize) -> Result<(), AssetError> {
        let limit = self.options.max_upload_bytes;
        if size > limit {
            return Err(AssetError::PayloadTooLarge { size, limit });
        }
        Ok(())
    }

    /// Writes the payload and its row. An existing row of the same song at
    /// the computed path (or the explicit `replace` row) is reused. Returns
    /// the row and whether it was newly created.
    pub(crate) fn store_upload(
        &self,
        song: &Song,
        asset_type: AssetType,
        collection: Option<&Collection>,
        replace: Option<AssetFile>,
        mut metadata: FileMetadata,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(AssetFile, bool), AssetError> {
        let duration = if asset_type == AssetType::Recordings && is_audio(file_name) {
            self.inspect_audio(file_name, bytes, &mut metadata)
        } else {
            0.0
        };
        let extension = extension_of(file_name).to_string();
        let file_path = planned_path(song, collection, asset_type, &metadata, &extension);
        let hash = content_hash(bytes);

        let existing = match replace {
            Some(file) => Some(file),
            None => match self.catalog.find_file_by_path(&file_path)? {
                Some(file) if file.song_id == song.id => Some(file),
                Some(file) => {
                    return Err(AssetError::Conflict(format!(
                        "{} already belongs to file {}",
                        file_path, file.id
                    )))
                }
                None => None,
            },
        };

        if let Some(current) = existing {
            let next = AssetFile {
                collection_id: collection.map(|c| c.id),
                metadata,
                duration,
                extension,
                file_path,
                content_hash: hash,
                ..current.clone()
            };
            self.replace_bytes(&current, &next, bytes)?;
            info!("Replaced bytes of file {} at {}", next.id, next.file_path);
            return Ok((next, false));
        }

        self.store.put(&file_path, bytes)?;
        let created = self.catalog.create_file(NewFile {
            song_id: song.id,
            asset_type,
            collection_id: collection.map(|c| c.id),
            metadata,
            duration,
            extension,
            file_path: file_path.clone(),
            content_hash: hash,
        });
        match created {
            Ok(file) => {
                info!("Stored file {} at {}", file.id, file.file_path);
                Ok((file, true))
            }
            Err(err) => {
                if let Err(cleanup) = self.store.delete(&file_path) {
                    warn!("could not remove orphaned upload {}: {}", file_path, cleanup);
                }
                Err(err.into())
            }
        }
    }

    fn replace_bytes(
        &self,
        current: &AssetFile,
        next: &AssetFile,
        bytes: &[u8],
    ) -> Result<(), AssetError> {
        if next.file_path == current.file_path {
            self.store.put(&next.file_path, bytes)?;
            return self.write_file_row(next);
        }

        if let Some(owner) = self.catalog.find_file_by_path(&next.file_path)? {
            if owner.id != current.id {
                return Err(AssetError::Conflict(format!(
                    "{} already belongs to file {}",
                    next.file_path, owner.id
                )));
            }
        }
        self.store.put(&next.file_path, bytes)?;
        if let Err(err) = self.write_file_row(next) {
            if let Err(cleanup) = self.store.delete(&next.file_path) {
                warn!("could not remove {}: {}", next.file_path, cleanup);
            }
            return Err(err);
        }
        if let Err(err) = self.store.delete(&current.file_path) {
            warn!("could not remove replaced file {}: {}", current.file_path, err);
        }
        Ok(())
    }

    fn write_file_row(&self, file: &AssetFile) -> Result<(), AssetError> {
        if self.catalog.update_file(file)? {
            Ok(())
        } else {
            Err(AssetError::NotFound(format!("file {} not found", file.id)))
        }
    }

    fn inspect_audio(&self, file_name: &str, bytes: &[u8], metadata: &mut FileMetadata) -> f64 {
        let tags = match probe_audio(bytes) {
            Ok(tags) => tags,
            Err(err) => {
                warn!("could not read audio properties of {:?}: {}", file_name, err);
                return 0.0;
            }
        };
        if self.options.fill_tags_from_audio {
            fill_blank(&mut metadata.name, tags.title);
            fill_blank(&mut metadata.album, tags.album);
            fill_blank(&mut metadata.date, tags.year.map(|year| year.to_string()));
        }
        tags.duration_secs.unwrap_or(0.0)
    }

    /// Deletes bytes and rows. Unknown ids are reported as missing; a file
    /// whose bytes cannot be removed keeps its row.
    pub fn batch_delete(&self, file_ids: &[u64]) -> Result<BatchDeleteReport, AssetError> {
        let mut report = BatchDeleteReport::default();
        let mut files = Vec::new();
        for &file_id in file_ids {
            match self.catalog.get_file(file_id)? {
                Some(file) => files.push(file),
                None => report.missing.push(file_id),
            }
        }
        let (deleted, failures) = self.delete_stored_files(&files)?;
        report.deleted = deleted;
        report.failures = failures;
        Ok(report)
    }

    pub(crate) fn delete_stored_files(
        &self,
        files: &[AssetFile],
    ) -> Result<(Vec<u64>, Vec<FileFailure>), AssetError> {
        let mut removable = Vec::new();
        let mut failures = Vec::new();
        for file in files {
            match self.store.delete(&file.file_path) {
                Ok(()) => removable.push(file.id),
                Err(err) => {
                    warn!("could not delete {}: {}", file.file_path, err);
                    failures.push(FileFailure::new(
                        Some(file.id),
                        &file.file_path,
                        &AssetError::Store(err),
                    ));
                }
            }
        }
        let deleted = self
            .catalog
            .delete_files(&removable)?
            .into_iter()
            .map(|file| file.id)
            .collect();
        Ok((deleted, failures))
    }

    /// Raw bytes of a stored file by its relative path.
    pub fn read_file(&self, relpath: &str) -> Result<Vec<u8>, AssetError> {
        match self.store.get(relpath) {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound(_)) | Err(StoreError::InvalidPath(_)) => {
                Err(AssetError::NotFound(format!("{} not found", relpath)))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn target_collection(
        &self,
        song: &Song,
        asset_type: AssetType,
        collection_id: Option<u64>,
    ) -> Result<Option<Collection>, AssetError> {
        let collection_id = match collection_id {
            Some(collection_id) => collection_id,
            None => return Ok(None),
        };
        let collection = self.catalog.get_collection(collection_id)?.ok_or_else(|| {
            AssetError::BadRequest(format!("collection {} does not exist", collection_id))
        })?;
        if collection.song_id != song.id || collection.asset_type != asset_type {
            return Err(AssetError::BadRequest(format!(
                "collection {} is not a {} collection of song {}",
                collection_id, asset_type, song.id
            )));
        }
        Ok(Some(collection))
    }

    fn find_or_create_collection(
        &self,
        song: &Song,
        asset_type: AssetType,
        name: &str,
    ) -> Result<Collection, AssetError> {
        let wanted = common::sanitize_name(name);
        for collection in self.catalog.list_collections(song.id, asset_type)? {
            if common::sanitize_name(&collection.name) == wanted {
                return Ok(collection);
            }
        }
        self.create_collection(song.id, asset_type, name, "")
    }
}

fn is_audio(file_name: &str) -> bool {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.type_() == mime_guess::mime::AUDIO)
        .unwrap_or(false)
}

fn fill_blank(field: &mut String, value: Option<String>) {
    if field.trim().is_empty() {
        if let Some(value) = value {
            *field = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{fixture, fixture_with, meta, Fixture};
    use crate::AssetOptions;

    use super::*;

    fn request(song_id: u64, asset_type: AssetType, name: &str, file_name: &str, bytes: &[u8]) -> UploadRequest {
        UploadRequest {
            song_id,
            asset_type,
            collection: UploadCollection::Ungrouped,
            replace_file_id: None,
            metadata: meta(name, "", ""),
            payload: Payload {
                file_name: file_name.to_string(),
                bytes: bytes.to_vec(),
            },
        }
    }

    fn file_count(f: &Fixture, song_id: u64) -> usize {
        f.manager.catalog().list_song_files(song_id).unwrap().len()
    }

    #[test]
    fn oversized_upload_is_rejected_before_any_write() {
        let f = fixture_with(AssetOptions {
            max_upload_bytes: 4,
            ..AssetOptions::default()
        });
        let song = f.song("S");
        let err = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "Big", "big.txt", b"12345"))
            .unwrap_err();
        assert!(matches!(err, AssetError::PayloadTooLarge { size: 5, limit: 4 }));
        assert_eq!(file_count(&f, song.id), 0);
        assert!(!f.root_has("S/Lyrics"));
    }

    #[test]
    fn upload_to_unknown_song_is_not_found() {
        let f = fixture();
        let err = f
            .manager
            .upload(request(7, AssetType::Lyrics, "X", "x.txt", b"x"))
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[test]
    fn identical_reupload_reuses_the_row() {
        let f = fixture();
        let song = f.song("S");
        let first = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "Verse", "v.txt", b"one"))
            .unwrap();
        let second = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "Verse", "v.txt", b"two"))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(file_count(&f, song.id), 1);
        assert_eq!(f.manager.read_file(&first.file_path).unwrap(), b"two");
        assert_ne!(first.content_hash, second.content_hash);
    }

    #[test]
    fn replacing_bytes_can_change_the_extension() {
        let f = fixture();
        let song = f.song("S");
        let original = f
            .manager
            .upload(request(song.id, AssetType::SheetMusic, "Lead", "lead.png", b"png"))
            .unwrap();
        let mut replacement = request(song.id, AssetType::SheetMusic, "Lead", "lead.pdf", b"pdf");
        replacement.replace_file_id = Some(original.id);
        let replaced = f.manager.upload(replacement).unwrap();

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.file_path, "S/Sheet Music/S - Lead.pdf");
        assert!(!f.exists(&original.file_path));
        assert_eq!(f.manager.read_file(&replaced.file_path).unwrap(), b"pdf");
    }

    #[test]
    fn named_collection_is_created_once() {
        let f = fixture();
        let song = f.song("S");
        let mut a = request(song.id, AssetType::SheetMusic, "Alto", "a.pdf", b"a");
        a.collection = UploadCollection::Named("Choir".to_string());
        let mut b = request(song.id, AssetType::SheetMusic, "Bass", "b.pdf", b"b");
        b.collection = UploadCollection::Named("Choir".to_string());
        let a = f.manager.upload(a).unwrap();
        let b = f.manager.upload(b).unwrap();
        assert_eq!(a.collection_id, b.collection_id);
        assert_eq!(b.file_path, "S/Sheet Music/Choir/S - Bass.pdf");
        assert_eq!(
            f.manager
                .catalog()
                .list_collections(song.id, AssetType::SheetMusic)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn unreadable_recording_gets_zero_duration() {
        let f = fixture();
        let song = f.song("S");
        let file = f
            .manager
            .upload(request(song.id, AssetType::Recordings, "Demo", "demo.mp3", b"not audio"))
            .unwrap();
        assert_eq!(file.duration, 0.0);
        assert_eq!(file.extension, ".mp3");
        assert_eq!(file.file_path, "S/Recordings/S - Demo.mp3");
    }

    #[test]
    fn metadata_change_renames_bytes() {
        let f = fixture();
        let song = f.song("S");
        let file = f
            .manager
            .upload(request(song.id, AssetType::Recordings, "Demo", "demo.wav", b"x"))
            .unwrap();
        let updated = f
            .manager
            .update_file(
                file.id,
                FileUpdate {
                    metadata: Some(meta("Demo", "Sessions", "recorded 2004")),
                    collection: CollectionChange::Keep,
                },
            )
            .unwrap();
        assert_eq!(updated.file_path, "S/Recordings/S - Sessions -- 2004.wav");
        assert!(f.exists(&updated.file_path));
        assert!(!f.exists(&file.file_path));
    }

    #[test]
    fn move_into_and_out_of_collection() {
        let f = fixture();
        let song = f.song("S");
        let collection = f
            .manager
            .create_collection(song.id, AssetType::Lyrics, "Drafts", "")
            .unwrap();
        let file = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "V1", "v1.txt", b"v1"))
            .unwrap();

        let grouped = f
            .manager
            .update_file(
                file.id,
                FileUpdate {
                    metadata: None,
                    collection: CollectionChange::MoveTo(collection.id),
                },
            )
            .unwrap();
        assert_eq!(grouped.collection_id, Some(collection.id));
        assert_eq!(grouped.file_path, "S/Lyrics/Drafts/S - V1.txt");

        let ungrouped = f
            .manager
            .update_file(
                file.id,
                FileUpdate {
                    metadata: None,
                    collection: CollectionChange::Ungroup,
                },
            )
            .unwrap();
        assert_eq!(ungrouped.collection_id, None);
        assert_eq!(ungrouped.file_path, "S/Lyrics/S - V1.txt");
        assert!(f.exists(&ungrouped.file_path));
    }

    #[test]
    fn cannot_move_into_collection_of_another_type() {
        let f = fixture();
        let song = f.song("S");
        let sheets = f
            .manager
            .create_collection(song.id, AssetType::SheetMusic, "Parts", "")
            .unwrap();
        let file = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "V1", "v1.txt", b"v1"))
            .unwrap();
        let err = f
            .manager
            .update_file(
                file.id,
                FileUpdate {
                    metadata: None,
                    collection: CollectionChange::MoveTo(sheets.id),
                },
            )
            .unwrap_err();
        assert!(matches!(err, AssetError::BadRequest(_)));
        let stored = f.manager.catalog().get_file(file.id).unwrap().unwrap();
        assert_eq!(stored, file);
    }

    #[test]
    fn rename_onto_another_file_is_a_conflict() {
        let f = fixture();
        let song = f.song("S");
        let a = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "A", "a.txt", b"a"))
            .unwrap();
        f.manager
            .upload(request(song.id, AssetType::Lyrics, "B", "b.txt", b"b"))
            .unwrap();
        let err = f
            .manager
            .update_file(
                a.id,
                FileUpdate {
                    metadata: Some(meta("B", "", "")),
                    collection: CollectionChange::Keep,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AssetError::Conflict(_)));
        assert_eq!(f.manager.read_file(&a.file_path).unwrap(), b"a");
    }

    #[test]
    fn missing_bytes_leave_the_row_unchanged() {
        let f = fixture();
        let song = f.song("S");
        let file = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "A", "a.txt", b"a"))
            .unwrap();
        f.manager.store().delete(&file.file_path).unwrap();
        let err = f
            .manager
            .update_file(
                file.id,
                FileUpdate {
                    metadata: Some(meta("Renamed", "", "")),
                    collection: CollectionChange::Keep,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AssetError::MissingSource(_)));
        assert_eq!(f.manager.catalog().get_file(file.id).unwrap().unwrap(), file);
    }

    #[test]
    fn batch_delete_tolerates_missing_ids_and_bytes() {
        let f = fixture();
        let song = f.song("S");
        let a = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "A", "a.txt", b"a"))
            .unwrap();
        let b = f
            .manager
            .upload(request(song.id, AssetType::Lyrics, "B", "b.txt", b"b"))
            .unwrap();
        f.manager.store().delete(&b.file_path).unwrap();

        let report = f.manager.batch_delete(&[a.id, b.id, 99]).unwrap();
        assert_eq!(report.deleted, vec![a.id, b.id]);
        assert_eq!(report.missing, vec![99]);
        assert!(report.failures.is_empty());
        assert_eq!(file_count(&f, song.id), 0);
        assert!(!f.exists(&a.file_path));
    }

    #[test]
    fn read_file_maps_missing_to_not_found() {
        let f = fixture();
        assert!(matches!(
            f.manager.read_file("nope/none.txt"),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn blank_fields_are_filled_from_tags() {
        let mut metadata = meta("", "Kept", " ");
        fill_blank(&mut metadata.name, Some("Title".to_string()));
        fill_blank(&mut metadata.album, Some("Other".to_string()));
        fill_blank(&mut metadata.date, Some("1998".to_string()));
        assert_eq!(metadata, meta("Title", "Kept", "1998"));
        assert!(is_audio("take.mp3"));
        assert!(!is_audio("score.pdf"));
    }
}
