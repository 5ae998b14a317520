pub mod view;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{AssetFile, AssetType, Collection, FileMetadata, Song, SongDraft};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError, WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use view::{AssetView, CollectionView, FileView, SongView};

const SCHEMA_VERSION: u32 = 1;
const KEY_SEP: char = '\x1f';
const DEFAULT_STATUS: &str = "Active";

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const SONGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("songs");
const COLLECTIONS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("collections");
const FILES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("files");
const SONG_COLLECTIONS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("song_collections");
const SONG_FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("song_files");
const COLLECTION_FILES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("collection_files");
const FILE_PATHS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("file_paths");

const META_VERSION_KEY: &str = "version";
const NEXT_SONG_KEY: &str = "next_song_id";
const NEXT_COLLECTION_KEY: &str = "next_collection_id";
const NEXT_FILE_KEY: &str = "next_file_id";

/// Persistent catalog of songs, collections and files.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

/// Everything needed to insert a file row; the id is allocated by the catalog.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub song_id: u64,
    pub asset_type: AssetType,
    pub collection_id: Option<u64>,
    pub metadata: FileMetadata,
    pub duration: f64,
    pub extension: String,
    pub file_path: String,
    pub content_hash: String,
}

#[derive(Clone, Debug)]
pub struct SongRemoval {
    pub song: Song,
    pub collections: Vec<Collection>,
    pub files: Vec<AssetFile>,
}

#[derive(Clone, Debug)]
pub struct CollectionRemoval {
    pub collection: Collection,
    pub detached: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogStats {
    pub songs: u64,
    pub collections: u64,
    pub files: u64,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let db = open_or_create_db(path)?;
        let catalog = Self { db: Arc::new(db) };
        catalog.init_tables()?;
        info!("Opened catalog at {:?}", path);
        Ok(catalog)
    }

    pub fn with_db(db: Arc<Database>) -> Result<Self, CatalogError> {
        let catalog = Self { db };
        catalog.init_tables()?;
        Ok(catalog)
    }

    fn init_tables(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META_TABLE)?;
            let version: Option<u32> = match meta.get(META_VERSION_KEY)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            match version {
                Some(version) if version == SCHEMA_VERSION => {}
                Some(version) => return Err(CatalogError::VersionMismatch(version)),
                None => {
                    let bytes = encode_value(&SCHEMA_VERSION)?;
                    meta.insert(META_VERSION_KEY, bytes.as_slice())?;
                }
            }
            let _ = write_txn.open_table(SONGS_TABLE)?;
            let _ = write_txn.open_table(COLLECTIONS_TABLE)?;
            let _ = write_txn.open_table(FILES_TABLE)?;
            let _ = write_txn.open_table(SONG_COLLECTIONS_TABLE)?;
            let _ = write_txn.open_table(SONG_FILES_TABLE)?;
            let _ = write_txn.open_table(COLLECTION_FILES_TABLE)?;
            let _ = write_txn.open_table(FILE_PATHS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let songs = read_txn.open_table(SONGS_TABLE)?.len()?;
        let collections = read_txn.open_table(COLLECTIONS_TABLE)?.len()?;
        let files = read_txn.open_table(FILES_TABLE)?.len()?;
        Ok(CatalogStats {
            songs,
            collections,
            files,
        })
    }

    // Songs

    pub fn create_song(&self, draft: &SongDraft) -> Result<Song, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let song = {
            let id = next_id(&write_txn, NEXT_SONG_KEY)?;
            let status = if draft.status.trim().is_empty() {
                DEFAULT_STATUS.to_string()
            } else {
                draft.status.clone()
            };
            let song = Song {
                id,
                name: draft.name.clone(),
                description: draft.description.clone(),
                kind: draft.kind.clone(),
                status,
            };
            let mut songs = write_txn.open_table(SONGS_TABLE)?;
            let bytes = encode_value(&song)?;
            songs.insert(id, bytes.as_slice())?;
            song
        };
        write_txn.commit()?;
        Ok(song)
    }

    pub fn update_song(&self, song_id: u64, draft: &SongDraft) -> Result<Option<Song>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let song = {
            let mut songs = write_txn.open_table(SONGS_TABLE)?;
            let mut song: Song = match get_row(&songs, song_id)? {
                Some(song) => song,
                None => return Ok(None),
            };
            song.name = draft.name.clone();
            song.description = draft.description.clone();
            song.kind = draft.kind.clone();
            song.status = draft.status.clone();
            let bytes = encode_value(&song)?;
            songs.insert(song_id, bytes.as_slice())?;
            song
        };
        write_txn.commit()?;
        Ok(Some(song))
    }

    /// Removes the song and every collection and file row beneath it in one
    /// transaction. Stored bytes are the caller's concern.
    pub fn delete_song(&self, song_id: u64) -> Result<Option<SongRemoval>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let removal = {
            let mut songs = write_txn.open_table(SONGS_TABLE)?;
            let song: Song = match songs.remove(song_id)? {
                Some(value) => decode_value(value.value())?,
                None => return Ok(None),
            };

            let prefix = prefix_key(&id_token(song_id));
            let mut song_collections = write_txn.open_table(SONG_COLLECTIONS_TABLE)?;
            let mut collections_table = write_txn.open_table(COLLECTIONS_TABLE)?;
            let mut collection_files = write_txn.open_table(COLLECTION_FILES_TABLE)?;
            let mut collections = Vec::new();
            for key in keys_with_prefix(&song_collections, &prefix)? {
                song_collections.remove(key.as_str())?;
                let collection_id = id_from_key(&key)?;
                for member_key in
                    keys_with_prefix(&collection_files, &prefix_key(&id_token(collection_id)))?
                {
                    collection_files.remove(member_key.as_str())?;
                }
                let removed = match collections_table.remove(collection_id)? {
                    Some(value) => Some(decode_value::<Collection>(value.value())?),
                    None => None,
                };
                if let Some(collection) = removed {
                    collections.push(collection);
                }
            }

            let mut song_files = write_txn.open_table(SONG_FILES_TABLE)?;
            let mut files_table = write_txn.open_table(FILES_TABLE)?;
            let mut file_paths = write_txn.open_table(FILE_PATHS_TABLE)?;
            let mut files = Vec::new();
            for key in keys_with_prefix(&song_files, &prefix)? {
                song_files.remove(key.as_str())?;
                let file_id = id_from_key(&key)?;
                let removed = match files_table.remove(file_id)? {
                    Some(value) => Some(decode_value::<AssetFile>(value.value())?),
                    None => None,
                };
                if let Some(file) = removed {
                    file_paths.remove(file.file_path.as_str())?;
                    files.push(file);
                }
            }

            SongRemoval {
                song,
                collections,
                files,
            }
        };
        write_txn.commit()?;
        Ok(Some(removal))
    }

    pub fn get_song(&self, song_id: u64) -> Result<Option<Song>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let songs = read_txn.open_table(SONGS_TABLE)?;
        get_row(&songs, song_id)
    }

    pub fn list_songs(&self) -> Result<Vec<Song>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let songs = read_txn.open_table(SONGS_TABLE)?;
        let mut items = Vec::new();
        for entry in songs.iter()? {
            let entry = entry?;
            items.push(decode_value(entry.1.value())?);
        }
        Ok(items)
    }

    // Collections

    pub fn create_collection(
        &self,
        song_id: u64,
        asset_type: AssetType,
        name: &str,
        description: &str,
    ) -> Result<Collection, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let collection = {
            let songs = write_txn.open_table(SONGS_TABLE)?;
            if get_row::<Song, _>(&songs, song_id)?.is_none() {
                return Err(CatalogError::Reference(format!("song {} does not exist", song_id)));
            }
            drop(songs);

            let id = next_id(&write_txn, NEXT_COLLECTION_KEY)?;
            let collection = Collection {
                id,
                song_id,
                asset_type,
                name: name.to_string(),
                description: description.to_string(),
            };
            let mut collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            let bytes = encode_value(&collection)?;
            collections.insert(id, bytes.as_slice())?;
            let mut song_collections = write_txn.open_table(SONG_COLLECTIONS_TABLE)?;
            song_collections.insert(typed_key(song_id, asset_type, id).as_str(), EMPTY)?;
            collection
        };
        write_txn.commit()?;
        Ok(collection)
    }

    pub fn update_collection(
        &self,
        collection_id: u64,
        name: &str,
        description: &str,
    ) -> Result<Option<Collection>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let collection = {
            let mut collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            let mut collection: Collection = match get_row(&collections, collection_id)? {
                Some(collection) => collection,
                None => return Ok(None),
            };
            collection.name = name.to_string();
            collection.description = description.to_string();
            let bytes = encode_value(&collection)?;
            collections.insert(collection_id, bytes.as_slice())?;
            collection
        };
        write_txn.commit()?;
        Ok(Some(collection))
    }

    /// Removes the collection row. Files still pointing at it are detached
    /// (their `collection_id` becomes `None`), never deleted.
    pub fn delete_collection(
        &self,
        collection_id: u64,
    ) -> Result<Option<CollectionRemoval>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let removal = {
            let mut collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            let collection: Collection = match collections.remove(collection_id)? {
                Some(value) => decode_value(value.value())?,
                None => return Ok(None),
            };

            let mut song_collections = write_txn.open_table(SONG_COLLECTIONS_TABLE)?;
            song_collections.remove(
                typed_key(collection.song_id, collection.asset_type, collection_id).as_str(),
            )?;

            let mut collection_files = write_txn.open_table(COLLECTION_FILES_TABLE)?;
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let mut detached = Vec::new();
            for key in keys_with_prefix(&collection_files, &prefix_key(&id_token(collection_id)))? {
                collection_files.remove(key.as_str())?;
                let file_id = id_from_key(&key)?;
                let mut file: AssetFile = match get_row(&files, file_id)? {
                    Some(file) => file,
                    None => continue,
                };
                file.collection_id = None;
                let bytes = encode_value(&file)?;
                files.insert(file_id, bytes.as_slice())?;
                detached.push(file_id);
            }

            CollectionRemoval {
                collection,
                detached,
            }
        };
        write_txn.commit()?;
        Ok(Some(removal))
    }

    pub fn get_collection(&self, collection_id: u64) -> Result<Option<Collection>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let collections = read_txn.open_table(COLLECTIONS_TABLE)?;
        get_row(&collections, collection_id)
    }

    pub fn list_collections(
        &self,
        song_id: u64,
        asset_type: AssetType,
    ) -> Result<Vec<Collection>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SONG_COLLECTIONS_TABLE)?;
        let collections = read_txn.open_table(COLLECTIONS_TABLE)?;
        let mut items = Vec::new();
        for key in keys_with_prefix(&index, &type_prefix(song_id, asset_type))? {
            if let Some(collection) = get_row(&collections, id_from_key(&key)?)? {
                items.push(collection);
            }
        }
        Ok(items)
    }

    pub fn list_song_collections(&self, song_id: u64) -> Result<Vec<Collection>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SONG_COLLECTIONS_TABLE)?;
        let collections = read_txn.open_table(COLLECTIONS_TABLE)?;
        let mut items = Vec::new();
        for key in keys_with_prefix(&index, &prefix_key(&id_token(song_id)))? {
            if let Some(collection) = get_row(&collections, id_from_key(&key)?)? {
                items.push(collection);
            }
        }
        Ok(items)
    }

    // Files

    pub fn create_file(&self, new_file: NewFile) -> Result<AssetFile, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let file = {
            check_file_refs(
                &write_txn,
                new_file.song_id,
                new_file.asset_type,
                new_file.collection_id,
            )?;

            let mut file_paths = write_txn.open_table(FILE_PATHS_TABLE)?;
            let taken = file_paths.get(new_file.file_path.as_str())?.is_some();
            if taken {
                return Err(CatalogError::PathTaken(new_file.file_path));
            }

            let id = next_id(&write_txn, NEXT_FILE_KEY)?;
            let file = AssetFile {
                id,
                song_id: new_file.song_id,
                asset_type: new_file.asset_type,
                collection_id: new_file.collection_id,
                metadata: new_file.metadata,
                duration: new_file.duration,
                extension: new_file.extension,
                file_path: new_file.file_path,
                content_hash: new_file.content_hash,
            };
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let bytes = encode_value(&file)?;
            files.insert(id, bytes.as_slice())?;
            file_paths.insert(file.file_path.as_str(), id)?;

            let mut song_files = write_txn.open_table(SONG_FILES_TABLE)?;
            song_files.insert(typed_key(file.song_id, file.asset_type, id).as_str(), EMPTY)?;
            if let Some(collection_id) = file.collection_id {
                let mut collection_files = write_txn.open_table(COLLECTION_FILES_TABLE)?;
                collection_files.insert(member_key(collection_id, id).as_str(), EMPTY)?;
            }
            file
        };
        write_txn.commit()?;
        Ok(file)
    }

    /// Replaces a file row. Song and asset type are fixed for the life of a
    /// file; a changed collection or path updates the indexes.
    pub fn update_file(&self, file: &AssetFile) -> Result<bool, CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let previous: AssetFile = match get_row(&files, file.id)? {
                Some(previous) => previous,
                None => return Ok(false),
            };
            if previous.song_id != file.song_id || previous.asset_type != file.asset_type {
                return Err(CatalogError::Reference(format!(
                    "file {} cannot change song or asset type",
                    file.id
                )));
            }

            if previous.collection_id != file.collection_id {
                check_file_refs(&write_txn, file.song_id, file.asset_type, file.collection_id)?;
                let mut collection_files = write_txn.open_table(COLLECTION_FILES_TABLE)?;
                if let Some(old) = previous.collection_id {
                    collection_files.remove(member_key(old, file.id).as_str())?;
                }
                if let Some(new) = file.collection_id {
                    collection_files.insert(member_key(new, file.id).as_str(), EMPTY)?;
                }
            }

            if previous.file_path != file.file_path {
                let mut file_paths = write_txn.open_table(FILE_PATHS_TABLE)?;
                let owner = file_paths.get(file.file_path.as_str())?.map(|v| v.value());
                if matches!(owner, Some(owner) if owner != file.id) {
                    return Err(CatalogError::PathTaken(file.file_path.clone()));
                }
                file_paths.remove(previous.file_path.as_str())?;
                file_paths.insert(file.file_path.as_str(), file.id)?;
            }

            let bytes = encode_value(file)?;
            files.insert(file.id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Deletes the given rows, skipping ids that do not exist. Returns the
    /// removed rows.
    pub fn delete_files(&self, file_ids: &[u64]) -> Result<Vec<AssetFile>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut files = write_txn.open_table(FILES_TABLE)?;
            let mut song_files = write_txn.open_table(SONG_FILES_TABLE)?;
            let mut collection_files = write_txn.open_table(COLLECTION_FILES_TABLE)?;
            let mut file_paths = write_txn.open_table(FILE_PATHS_TABLE)?;
            let mut removed = Vec::new();
            for &file_id in file_ids {
                let file: AssetFile = match files.remove(file_id)? {
                    Some(value) => decode_value(value.value())?,
                    None => continue,
                };
                song_files.remove(typed_key(file.song_id, file.asset_type, file_id).as_str())?;
                if let Some(collection_id) = file.collection_id {
                    collection_files.remove(member_key(collection_id, file_id).as_str())?;
                }
                file_paths.remove(file.file_path.as_str())?;
                removed.push(file);
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn get_file(&self, file_id: u64) -> Result<Option<AssetFile>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let files = read_txn.open_table(FILES_TABLE)?;
        get_row(&files, file_id)
    }

    pub fn find_file_by_path(&self, file_path: &str) -> Result<Option<AssetFile>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let file_paths = read_txn.open_table(FILE_PATHS_TABLE)?;
        let file_id = match file_paths.get(file_path)? {
            Some(value) => value.value(),
            None => return Ok(None),
        };
        let files = read_txn.open_table(FILES_TABLE)?;
        get_row(&files, file_id)
    }

    /// All files of one asset type, grouped and ungrouped, in insertion order.
    pub fn list_files(
        &self,
        song_id: u64,
        asset_type: AssetType,
    ) -> Result<Vec<AssetFile>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SONG_FILES_TABLE)?;
        let files = read_txn.open_table(FILES_TABLE)?;
        rows_for_keys(&files, keys_with_prefix(&index, &type_prefix(song_id, asset_type))?)
    }

    pub fn list_song_files(&self, song_id: u64) -> Result<Vec<AssetFile>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SONG_FILES_TABLE)?;
        let files = read_txn.open_table(FILES_TABLE)?;
        rows_for_keys(&files, keys_with_prefix(&index, &prefix_key(&id_token(song_id)))?)
    }

    pub fn list_collection_files(&self, collection_id: u64) -> Result<Vec<AssetFile>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(COLLECTION_FILES_TABLE)?;
        let files = read_txn.open_table(FILES_TABLE)?;
        rows_for_keys(&files, keys_with_prefix(&index, &prefix_key(&id_token(collection_id)))?)
    }

    pub fn list_all_files(&self) -> Result<Vec<AssetFile>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let files = read_txn.open_table(FILES_TABLE)?;
        let mut items = Vec::new();
        for entry in files.iter()? {
            let entry = entry?;
            items.push(decode_value(entry.1.value())?);
        }
        Ok(items)
    }

    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    KeyParse(String),
    VersionMismatch(u32),
    Reference(String),
    PathTaken(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Redb(err) => write!(f, "db error: {}", err),
            CatalogError::Bincode(err) => write!(f, "bincode error: {}", err),
            CatalogError::KeyParse(value) => write!(f, "key parse error: {}", value),
            CatalogError::VersionMismatch(version) => {
                write!(f, "catalog schema version mismatch: {}", version)
            }
            CatalogError::Reference(message) => write!(f, "broken reference: {}", message),
            CatalogError::PathTaken(path) => write!(f, "path already in use: {}", path),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Redb(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Bincode(err)
    }
}

const EMPTY: &[u8] = &[];

fn open_or_create_db(path: &Path) -> Result<Database, CatalogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn next_id(txn: &WriteTransaction, key: &str) -> Result<u64, CatalogError> {
    let mut meta = txn.open_table(META_TABLE)?;
    let current: u64 = match meta.get(key)? {
        Some(value) => decode_value(value.value())?,
        None => 1,
    };
    let bytes = encode_value(&(current + 1))?;
    meta.insert(key, bytes.as_slice())?;
    Ok(current)
}

fn check_file_refs(
    txn: &WriteTransaction,
    song_id: u64,
    asset_type: AssetType,
    collection_id: Option<u64>,
) -> Result<(), CatalogError> {
    let songs = txn.open_table(SONGS_TABLE)?;
    if get_row::<Song, _>(&songs, song_id)?.is_none() {
        return Err(CatalogError::Reference(format!("song {} does not exist", song_id)));
    }
    if let Some(collection_id) = collection_id {
        let collections = txn.open_table(COLLECTIONS_TABLE)?;
        match get_row::<Collection, _>(&collections, collection_id)? {
            Some(c) if c.song_id == song_id && c.asset_type == asset_type => {}
            Some(_) => {
                return Err(CatalogError::Reference(format!(
                    "collection {} belongs to another song or asset type",
                    collection_id
                )))
            }
            None => {
                return Err(CatalogError::Reference(format!(
                    "collection {} does not exist",
                    collection_id
                )))
            }
        }
    }
    Ok(())
}

fn get_row<T, Tbl>(table: &Tbl, id: u64) -> Result<Option<T>, CatalogError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    let row = match table.get(id)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    Ok(row)
}

fn rows_for_keys<T, Tbl>(table: &Tbl, keys: Vec<String>) -> Result<Vec<T>, CatalogError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(row) = get_row(table, id_from_key(&key)?)? {
            items.push(row);
        }
    }
    Ok(items)
}

fn keys_with_prefix<Tbl>(table: &Tbl, prefix: &str) -> Result<Vec<String>, CatalogError>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut end = prefix.to_string();
    end.push('\u{10ffff}');
    let mut keys = Vec::new();
    for entry in table.range(prefix..end.as_str())? {
        let entry = entry?;
        keys.push(entry.0.value().to_string());
    }
    Ok(keys)
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}

fn id_token(id: u64) -> String {
    format!("{:020}", id)
}

fn prefix_key(prefix: &str) -> String {
    let mut out = String::new();
    out.push_str(prefix);
    out.push(KEY_SEP);
    out
}

fn type_prefix(song_id: u64, asset_type: AssetType) -> String {
    let mut out = prefix_key(&id_token(song_id));
    out.push_str(asset_type.key());
    out.push(KEY_SEP);
    out
}

fn typed_key(song_id: u64, asset_type: AssetType, id: u64) -> String {
    let mut out = type_prefix(song_id, asset_type);
    out.push_str(&id_token(id));
    out
}

fn member_key(collection_id: u64, file_id: u64) -> String {
    let mut out = prefix_key(&id_token(collection_id));
    out.push_str(&id_token(file_id));
    out
}

fn id_from_key(value: &str) -> Result<u64, CatalogError> {
    let idx = value
        .rfind(KEY_SEP)
        .ok_or_else(|| CatalogError::KeyParse(value.to_string()))?;
    value[idx + KEY_SEP.len_utf8()..]
        .parse()
        .map_err(|_| CatalogError::KeyParse(value.to_string()))
}
