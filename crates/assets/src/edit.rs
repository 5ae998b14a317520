use std::collections::HashMap;

use common::{FileMetadata, SongDraft};
use serde::{Deserialize, Serialize};

use crate::AssetError;

/// A full asset edit submitted for one song. Asset types that do not appear
/// in `groups` are left as they are.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SongEdit {
    pub song: Option<SongDraft>,
    pub groups: Vec<AssetGroupEdit>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetGroupEdit {
    pub asset_type: String,
    pub entries: Vec<AssetEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetEntry {
    Collection(CollectionEntry),
    File(FileEntry),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionEntry {
    pub id: Option<u64>,
    pub name: String,
    pub description: String,
    pub files: Vec<FileEntry>,
}

/// A stored file (`id`), a new payload (`upload`), or both when the bytes of
/// an existing file are being replaced.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileEntry {
    pub id: Option<u64>,
    /// Names a payload sent with the same request. Never stored.
    pub upload: Option<String>,
    pub original_name: Option<String>,
    pub metadata: FileMetadata,
}

/// Uploaded bytes with the client's file name.
#[derive(Clone, Debug)]
pub struct Payload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub(crate) type Payloads = HashMap<String, Payload>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingSource,
    Conflict,
    Store,
    Catalog,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub file_id: Option<u64>,
    pub path: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl FileFailure {
    pub(crate) fn new(file_id: Option<u64>, path: &str, err: &AssetError) -> Self {
        let kind = match err {
            AssetError::MissingSource(_) | AssetError::NotFound(_) => FailureKind::MissingSource,
            AssetError::Conflict(_) => FailureKind::Conflict,
            AssetError::Store(_) => FailureKind::Store,
            _ => FailureKind::Catalog,
        };
        Self {
            file_id,
            path: path.to_string(),
            kind,
            reason: err.to_string(),
        }
    }
}

/// Outcome of one reconciliation pass. Per-file problems end up in
/// `failures`; the pass itself still succeeds.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub created: Vec<u64>,
    pub updated: Vec<u64>,
    pub deleted: Vec<u64>,
    pub skipped: Vec<u64>,
    pub collections_created: Vec<u64>,
    pub collections_updated: Vec<u64>,
    pub collections_removed: Vec<u64>,
    pub failures: Vec<FileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_parses_tagged_entries() {
        let edit: SongEdit = serde_json::from_value(serde_json::json!({
            "song": { "name": "Test Song", "type": "Hymn" },
            "groups": [{
                "assetType": "Recordings",
                "entries": [
                    {
                        "kind": "collection",
                        "name": "Live Takes",
                        "files": [{ "upload": "u1", "originalName": "take.mp3",
                                    "metadata": { "album": "Live Takes" } }]
                    },
                    { "kind": "file", "id": 4, "metadata": { "name": "Demo" } }
                ]
            }]
        }))
        .unwrap();

        assert_eq!(edit.song.as_ref().map(|s| s.kind.as_str()), Some("Hymn"));
        let entries = &edit.groups[0].entries;
        match &entries[0] {
            AssetEntry::Collection(collection) => {
                assert_eq!(collection.id, None);
                assert_eq!(collection.files[0].upload.as_deref(), Some("u1"));
                assert_eq!(collection.files[0].metadata.album, "Live Takes");
            }
            other => panic!("unexpected entry {:?}", other),
        }
        match &entries[1] {
            AssetEntry::File(file) => {
                assert_eq!(file.id, Some(4));
                assert_eq!(file.metadata.name, "Demo");
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn failure_kind_follows_error() {
        let failure = FileFailure::new(
            Some(3),
            "S/Recordings/a.mp3",
            &AssetError::MissingSource("S/Recordings/a.mp3".to_string()),
        );
        assert_eq!(failure.kind, FailureKind::MissingSource);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["fileId"], 3);
        assert_eq!(json["kind"], "missing_source");
    }
}
