use std::collections::HashMap;

use common::{Collection, Song};
use serde::Serialize;
use tracing::{info, warn};

use crate::{planned_path, AssetError, AssetManager};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditIssueKind {
    PathMismatch,
    MissingBytes,
    BrokenReference,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditIssue {
    pub file_id: u64,
    pub song_id: u64,
    pub kind: AuditIssueKind,
    pub stored_path: String,
    pub expected_path: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub checked: usize,
    pub issues: Vec<AuditIssue>,
}

impl AssetManager {
    /// Compares every file row with the layout it should have and with the
    /// bytes actually stored. Read-only.
    pub fn audit(&self) -> Result<AuditReport, AssetError> {
        let songs: HashMap<u64, Song> = self
            .catalog
            .list_songs()?
            .into_iter()
            .map(|song| (song.id, song))
            .collect();
        let mut collections: HashMap<u64, Option<Collection>> = HashMap::new();
        let mut report = AuditReport::default();

        for file in self.catalog.list_all_files()? {
            report.checked += 1;
            let issue = |kind, expected_path| AuditIssue {
                file_id: file.id,
                song_id: file.song_id,
                kind,
                stored_path: file.file_path.clone(),
                expected_path,
            };

            let Some(song) = songs.get(&file.song_id) else {
                report.issues.push(issue(AuditIssueKind::BrokenReference, None));
                continue;
            };
            let collection = match file.collection_id {
                Some(collection_id) => {
                    if !collections.contains_key(&collection_id) {
                        let row = self.catalog.get_collection(collection_id)?;
                        collections.insert(collection_id, row);
                    }
                    match collections.get(&collection_id).and_then(|c| c.as_ref()) {
                        Some(collection) => Some(collection),
                        None => {
                            report.issues.push(issue(AuditIssueKind::BrokenReference, None));
                            continue;
                        }
                    }
                }
                None => None,
            };

            let expected = planned_path(
                song,
                collection,
                file.asset_type,
                &file.metadata,
                &file.extension,
            );
            if expected != file.file_path {
                report
                    .issues
                    .push(issue(AuditIssueKind::PathMismatch, Some(expected)));
            }
            if !self.store.exists(&file.file_path)? {
                report.issues.push(issue(AuditIssueKind::MissingBytes, None));
            }
        }

        if report.issues.is_empty() {
            info!("Audit checked {} files, no issues", report.checked);
        } else {
            warn!(
                "Audit checked {} files, {} issues",
                report.checked,
                report.issues.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use common::AssetType;

    use crate::testing::{fixture, meta};
    use crate::{Payload, UploadCollection, UploadRequest};

    use super::*;

    #[test]
    fn reports_mismatched_paths_and_missing_bytes() {
        let f = fixture();
        let song = f.song("S");
        let upload = |name: &str| {
            f.manager
                .upload(UploadRequest {
                    song_id: song.id,
                    asset_type: AssetType::OtherFiles,
                    collection: UploadCollection::Ungrouped,
                    replace_file_id: None,
                    metadata: meta(name, "", ""),
                    payload: Payload {
                        file_name: "x.zip".to_string(),
                        bytes: name.as_bytes().to_vec(),
                    },
                })
                .unwrap()
        };
        let clean = upload("Clean");
        let drifted = upload("Drifted");
        let missing = upload("Missing");

        assert!(f.manager.audit().unwrap().issues.is_empty());

        let mut row = drifted.clone();
        row.file_path = "S/Other Files/legacy name.zip".to_string();
        f.manager.store().move_file(&drifted.file_path, &row.file_path).unwrap();
        f.manager.catalog().update_file(&row).unwrap();
        f.manager.store().delete(&missing.file_path).unwrap();

        let report = f.manager.audit().unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.issues.len(), 2);
        let mismatch = &report.issues[0];
        assert_eq!(mismatch.file_id, drifted.id);
        assert_eq!(mismatch.kind, AuditIssueKind::PathMismatch);
        assert_eq!(mismatch.expected_path.as_deref(), Some(drifted.file_path.as_str()));
        assert_eq!(report.issues[1].file_id, missing.id);
        assert_eq!(report.issues[1].kind, AuditIssueKind::MissingBytes);
        assert!(report.issues.iter().all(|issue| issue.file_id != clean.id));
    }
}
