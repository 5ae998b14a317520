//! Nested read models: a song with its four asset groups, each group listing
//! collections (with their parts) before ungrouped files.

use common::{AssetFile, AssetType, Collection, Song};
use serde::Serialize;

use crate::{
    get_row, keys_with_prefix, rows_for_keys, type_prefix, Catalog, CatalogError,
    COLLECTIONS_TABLE, FILES_TABLE, SONGS_TABLE, SONG_COLLECTIONS_TABLE, SONG_FILES_TABLE,
};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: u64,
    pub collection_id: Option<u64>,
    pub asset_type: AssetType,
    pub name: String,
    pub description: String,
    pub date: String,
    pub album: String,
    pub instrument: String,
    pub duration: f64,
    pub file_path: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionView {
    pub id: u64,
    pub asset_type: AssetType,
    pub name: String,
    pub description: String,
    pub parts: Vec<FileView>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetView {
    Collection(CollectionView),
    File(FileView),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongView {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub recordings: Vec<AssetView>,
    pub sheet_music: Vec<AssetView>,
    pub lyrics: Vec<AssetView>,
    pub other_files: Vec<AssetView>,
}

impl From<&AssetFile> for FileView {
    fn from(file: &AssetFile) -> Self {
        FileView {
            id: file.id,
            collection_id: file.collection_id,
            asset_type: file.asset_type,
            name: file.metadata.name.clone(),
            description: file.metadata.description.clone(),
            date: file.metadata.date.clone(),
            album: file.metadata.album.clone(),
            instrument: file.metadata.instrument.clone(),
            duration: file.duration,
            file_path: file.file_path.clone(),
        }
    }
}

impl Catalog {
    pub fn assets_for_song(
        &self,
        song_id: u64,
        asset_type: AssetType,
    ) -> Result<Vec<AssetView>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let collection_index = read_txn.open_table(SONG_COLLECTIONS_TABLE)?;
        let file_index = read_txn.open_table(SONG_FILES_TABLE)?;
        let collections_table = read_txn.open_table(COLLECTIONS_TABLE)?;
        let files_table = read_txn.open_table(FILES_TABLE)?;

        let prefix = type_prefix(song_id, asset_type);
        let collections: Vec<Collection> =
            rows_for_keys(&collections_table, keys_with_prefix(&collection_index, &prefix)?)?;
        let files: Vec<AssetFile> =
            rows_for_keys(&files_table, keys_with_prefix(&file_index, &prefix)?)?;
        Ok(assemble(collections, &files))
    }

    pub fn song_view(&self, song_id: u64) -> Result<Option<SongView>, CatalogError> {
        let song: Song = {
            let read_txn = self.db.begin_read()?;
            let songs = read_txn.open_table(SONGS_TABLE)?;
            match get_row(&songs, song_id)? {
                Some(song) => song,
                None => return Ok(None),
            }
        };
        Ok(Some(self.build_song_view(song)?))
    }

    pub fn list_song_views(&self) -> Result<Vec<SongView>, CatalogError> {
        let songs = self.list_songs()?;
        let mut views = Vec::with_capacity(songs.len());
        for song in songs {
            views.push(self.build_song_view(song)?);
        }
        Ok(views)
    }

    fn build_song_view(&self, song: Song) -> Result<SongView, CatalogError> {
        Ok(SongView {
            recordings: self.assets_for_song(song.id, AssetType::Recordings)?,
            sheet_music: self.assets_for_song(song.id, AssetType::SheetMusic)?,
            lyrics: self.assets_for_song(song.id, AssetType::Lyrics)?,
            other_files: self.assets_for_song(song.id, AssetType::OtherFiles)?,
            id: song.id,
            name: song.name,
            description: song.description,
            kind: song.kind,
            status: song.status,
        })
    }
}

fn assemble(collections: Vec<Collection>, files: &[AssetFile]) -> Vec<AssetView> {
    let mut out = Vec::with_capacity(collections.len() + files.len());
    for collection in collections {
        let parts = files
            .iter()
            .filter(|file| file.collection_id == Some(collection.id))
            .map(FileView::from)
            .collect();
        out.push(AssetView::Collection(CollectionView {
            id: collection.id,
            asset_type: collection.asset_type,
            name: collection.name,
            description: collection.description,
            parts,
        }));
    }
    out.extend(
        files
            .iter()
            .filter(|file| file.collection_id.is_none())
            .map(|file| AssetView::File(FileView::from(file))),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewFile;
    use common::{FileMetadata, SongDraft};

    fn add_file(catalog: &Catalog, song_id: u64, collection_id: Option<u64>, path: &str) -> u64 {
        catalog
            .create_file(NewFile {
                song_id,
                asset_type: AssetType::Recordings,
                collection_id,
                metadata: FileMetadata {
                    name: path.to_string(),
                    ..FileMetadata::default()
                },
                duration: 1.5,
                extension: ".mp3".to_string(),
                file_path: path.to_string(),
                content_hash: String::new(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn collections_come_before_ungrouped_files() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("c.redb")).unwrap();
        let song = catalog
            .create_song(&SongDraft {
                name: "S".to_string(),
                ..SongDraft::default()
            })
            .unwrap();
        let loose = add_file(&catalog, song.id, None, "S/Recordings/loose.mp3");
        let collection = catalog
            .create_collection(song.id, AssetType::Recordings, "Live", "")
            .unwrap();
        let part = add_file(&catalog, song.id, Some(collection.id), "S/Recordings/Live/p.mp3");

        let views = catalog.assets_for_song(song.id, AssetType::Recordings).unwrap();
        assert_eq!(views.len(), 2);
        match &views[0] {
            AssetView::Collection(c) => {
                assert_eq!(c.id, collection.id);
                assert_eq!(c.parts.len(), 1);
                assert_eq!(c.parts[0].id, part);
            }
            other => panic!("expected collection, got {:?}", other),
        }
        match &views[1] {
            AssetView::File(f) => assert_eq!(f.id, loose),
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn song_view_serializes_with_client_keys() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("c.redb")).unwrap();
        let song = catalog
            .create_song(&SongDraft {
                name: "S".to_string(),
                kind: "Hymn".to_string(),
                ..SongDraft::default()
            })
            .unwrap();
        add_file(&catalog, song.id, None, "S/Recordings/a.mp3");

        let view = catalog.song_view(song.id).unwrap().unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "Hymn");
        assert_eq!(json["status"], "Active");
        assert_eq!(json["recordings"][0]["kind"], "file");
        assert_eq!(json["recordings"][0]["assetType"], "Recordings");
        assert!(json["sheetMusic"].as_array().unwrap().is_empty());
        assert!(json["otherFiles"].as_array().unwrap().is_empty());

        assert!(catalog.song_view(99).unwrap().is_none());
        assert_eq!(catalog.list_song_views().unwrap().len(), 1);
    }
}
