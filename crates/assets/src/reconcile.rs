//! Applies a full asset edit for one song: the submitted list is the desired
//! state, the catalog is the current state.

use std::collections::{HashMap, HashSet};

use common::{resolve_dir, AssetFile, AssetType, Collection, CollectionRef, Song, SongRef};
use tracing::{info, warn};

use crate::edit::{
    AssetEntry, AssetGroupEdit, FileEntry, FileFailure, Payload, Payloads, ReconcileReport,
    SongEdit,
};
use crate::{planned_path, AssetError, AssetManager};

struct GroupPlan<'a> {
    asset_type: AssetType,
    entries: &'a [AssetEntry],
}

#[derive(Default)]
struct Seen {
    asset_types: HashSet<AssetType>,
    file_ids: HashSet<u64>,
    collection_ids: HashSet<u64>,
    uploads: HashSet<String>,
}

impl AssetManager {
    /// Validates the whole edit first; nothing is touched when validation
    /// fails. After that, per-file problems are collected in the report
    /// instead of aborting the pass.
    pub fn reconcile(
        &self,
        song_id: u64,
        edit: &SongEdit,
        payloads: &HashMap<String, Payload>,
    ) -> Result<ReconcileReport, AssetError> {
        let current = self.require_song(song_id)?;
        let plans = self.validate_edit(&current, edit, payloads)?;

        let mut report = ReconcileReport::default();
        let song = match &edit.song {
            Some(draft) => self.apply_song_fields(
                &current,
                draft,
                &mut report.updated,
                &mut report.failures,
            )?,
            None => current,
        };

        for plan in &plans {
            self.reconcile_group(&song, plan, payloads, &mut report)?;
        }

        dedup_in_place(&mut report.updated);
        report.updated.retain(|id| !report.created.contains(id));
        info!(
            "Reconciled song {}: {} created, {} updated, {} deleted, {} failures",
            song.id,
            report.created.len(),
            report.updated.len(),
            report.deleted.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn validate_edit<'a>(
        &self,
        song: &Song,
        edit: &'a SongEdit,
        payloads: &Payloads,
    ) -> Result<Vec<GroupPlan<'a>>, AssetError> {
        if let Some(draft) = &edit.song {
            if draft.name != song.name {
                self.check_song_dir_free(Some(song.id), &draft.name)?;
            }
        }

        let mut seen = Seen::default();
        let mut plans = Vec::with_capacity(edit.groups.len());
        for group in &edit.groups {
            plans.push(self.validate_group(song, group, payloads, &mut seen)?);
        }
        Ok(plans)
    }

    fn validate_group<'a>(
        &self,
        song: &Song,
        group: &'a AssetGroupEdit,
        payloads: &Payloads,
        seen: &mut Seen,
    ) -> Result<GroupPlan<'a>, AssetError> {
        let asset_type = AssetType::parse(&group.asset_type).ok_or_else(|| {
            AssetError::BadRequest(format!("unknown asset type {:?}", group.asset_type))
        })?;
        if !seen.asset_types.insert(asset_type) {
            return Err(AssetError::BadRequest(format!(
                "asset type {} submitted twice",
                asset_type
            )));
        }

        // Directory names already on disk for this type, by collection id.
        let existing_dirs: Vec<(u64, String)> = self
            .catalog
            .list_collections(song.id, asset_type)?
            .iter()
            .map(|c| (c.id, collection_dir(song, asset_type, c.id, &c.name)))
            .collect();
        let mut wanted_dirs = HashSet::new();

        for entry in &group.entries {
            match entry {
                AssetEntry::Collection(entry) => {
                    if let Some(collection_id) = entry.id {
                        let collection = self.catalog.get_collection(collection_id)?;
                        let belongs = matches!(&collection,
                            Some(c) if c.song_id == song.id && c.asset_type == asset_type);
                        if !belongs {
                            return Err(AssetError::BadRequest(format!(
                                "collection {} is not a {} collection of song {}",
                                collection_id, asset_type, song.id
                            )));
                        }
                        if !seen.collection_ids.insert(collection_id) {
                            return Err(AssetError::BadRequest(format!(
                                "collection {} submitted twice",
                                collection_id
                            )));
                        }
                    }
                    if !entry.name.trim().is_empty() {
                        let dir = collection_dir(song, asset_type, 0, &entry.name);
                        let taken = existing_dirs
                            .iter()
                            .any(|(id, existing)| *existing == dir && Some(*id) != entry.id);
                        if taken || !wanted_dirs.insert(dir.clone()) {
                            return Err(AssetError::Conflict(format!(
                                "collection directory {:?} is already in use",
                                dir
                            )));
                        }
                    }
                    for file in &entry.files {
                        self.validate_file_entry(song, asset_type, file, payloads, seen)?;
                    }
                }
                AssetEntry::File(file) => {
                    self.validate_file_entry(song, asset_type, file, payloads, seen)?;
                }
            }
        }

        Ok(GroupPlan {
            asset_type,
            entries: &group.entries,
        })
    }

    fn validate_file_entry(
        &self,
        song: &Song,
        asset_type: AssetType,
        entry: &FileEntry,
        payloads: &Payloads,
        seen: &mut Seen,
    ) -> Result<(), AssetError> {
        if let Some(file_id) = entry.id {
            let file = self.catalog.get_file(file_id)?;
            let belongs =
                matches!(&file, Some(f) if f.song_id == song.id && f.asset_type == asset_type);
            if !belongs {
                return Err(AssetError::BadRequest(format!(
                    "file {} is not a {} file of song {}",
                    file_id, asset_type, song.id
                )));
            }
            if !seen.file_ids.insert(file_id) {
                return Err(AssetError::BadRequest(format!(
                    "file {} submitted twice",
                    file_id
                )));
            }
        }

        match &entry.upload {
            Some(token) => {
                let payload = payloads.get(token).ok_or_else(|| {
                    AssetError::BadRequest(format!("no payload for upload {:?}", token))
                })?;
                self.check_payload_size(payload.bytes.len())?;
                if !seen.uploads.insert(token.clone()) {
                    return Err(AssetError::BadRequest(format!(
                        "upload {:?} referenced twice",
                        token
                    )));
                }
            }
            None if entry.id.is_none() => {
                return Err(AssetError::BadRequest(
                    "new file entry without a payload".to_string(),
                ));
            }
            None => {}
        }
        Ok(())
    }

    fn reconcile_group(
        &self,
        song: &Song,
        plan: &GroupPlan<'_>,
        payloads: &Payloads,
        report: &mut ReconcileReport,
    ) -> Result<(), AssetError> {
        let asset_type = plan.asset_type;
        let prior_files = self.catalog.list_files(song.id, asset_type)?;
        let prior_collections = self.catalog.list_collections(song.id, asset_type)?;

        // 1. Collections.
        let mut placements: Vec<(Option<Collection>, &FileEntry)> = Vec::new();
        let mut desired_collections = HashSet::new();
        for entry in plan.entries {
            match entry {
                AssetEntry::Collection(entry) => {
                    let collection = match entry.id {
                        Some(collection_id) => {
                            let current = self.require_collection(collection_id)?;
                            if current.name == entry.name && current.description == entry.description
                            {
                                current
                            } else {
                                let updated = self.apply_collection_fields(
                                    song,
                                    &current,
                                    &entry.name,
                                    &entry.description,
                                    &mut report.updated,
                                    &mut report.failures,
                                )?;
                                report.collections_updated.push(collection_id);
                                updated
                            }
                        }
                        None => {
                            let created = self.create_collection(
                                song.id,
                                asset_type,
                                &entry.name,
                                &entry.description,
                            )?;
                            report.collections_created.push(created.id);
                            created
                        }
                    };
                    desired_collections.insert(collection.id);
                    for file in &entry.files {
                        placements.push((Some(collection.clone()), file));
                    }
                }
                AssetEntry::File(file) => placements.push((None, file)),
            }
        }

        // 2. Metadata and placement of stored files. Files that already
        // failed in a rename cascade are reported once and left alone.
        let failed: HashSet<u64> = report.failures.iter().filter_map(|f| f.file_id).collect();
        let mut desired_files: HashSet<u64> = HashSet::new();
        let mut blocked = Vec::new();
        for (collection, entry) in &placements {
            let Some(file_id) = entry.id else {
                continue;
            };
            desired_files.insert(file_id);
            if entry.upload.is_some() || failed.contains(&file_id) {
                continue;
            }
            let Some(current) = self.catalog.get_file(file_id)? else {
                continue;
            };
            let next = placed(song, collection.as_ref(), &current, entry);
            if next == current {
                report.skipped.push(file_id);
                continue;
            }
            match self.commit_file(&current, &next) {
                Ok(()) => report.updated.push(file_id),
                Err(err @ AssetError::Conflict(_)) => blocked.push((current, next, err)),
                Err(err) => {
                    warn!("could not update file {}: {}", file_id, err);
                    report
                        .failures
                        .push(FileFailure::new(Some(file_id), &current.file_path, &err));
                }
            }
        }
        self.retry_blocked_moves(blocked, report);

        // 3. New payloads.
        for (collection, entry) in &placements {
            let Some(token) = &entry.upload else {
                continue;
            };
            let Some(payload) = payloads.get(token) else {
                continue;
            };
            let replace = match entry.id {
                Some(file_id) => self.catalog.get_file(file_id)?,
                None => None,
            };
            let file_name = entry.original_name.as_deref().unwrap_or(&payload.file_name);
            let stored = self.store_upload(
                song,
                asset_type,
                collection.as_ref(),
                replace,
                entry.metadata.clone(),
                file_name,
                &payload.bytes,
            );
            match stored {
                Ok((file, created)) => {
                    desired_files.insert(file.id);
                    if created {
                        report.created.push(file.id);
                    } else {
                        report.updated.push(file.id);
                    }
                }
                Err(err) => {
                    warn!("could not store upload {:?}: {}", token, err);
                    report
                        .failures
                        .push(FileFailure::new(entry.id, file_name, &err));
                }
            }
        }

        // 4. Files no longer submitted.
        let removed: Vec<AssetFile> = prior_files
            .into_iter()
            .filter(|file| !desired_files.contains(&file.id))
            .collect();
        let (deleted, failures) = self.delete_stored_files(&removed)?;
        report.deleted.extend(deleted);
        report.failures.extend(failures);

        // 5. Collections no longer submitted; their remaining files are kept.
        for collection in prior_collections {
            if desired_collections.contains(&collection.id) {
                continue;
            }
            if self.remove_collection(
                song,
                &collection,
                &mut report.updated,
                &mut report.failures,
            )? {
                report.collections_removed.push(collection.id);
            }
        }
        Ok(())
    }

    /// A move can be blocked by a file that is itself about to leave the
    /// target path. Blocked moves are swept again until a sweep makes no
    /// progress; whatever is left is reported.
    fn retry_blocked_moves(
        &self,
        mut blocked: Vec<(AssetFile, AssetFile, AssetError)>,
        report: &mut ReconcileReport,
    ) {
        while !blocked.is_empty() {
            let before = blocked.len();
            let mut still_blocked = Vec::new();
            for (current, next, _) in blocked {
                match self.commit_file(&current, &next) {
                    Ok(()) => report.updated.push(current.id),
                    Err(err @ AssetError::Conflict(_)) => still_blocked.push((current, next, err)),
                    Err(err) => {
                        warn!("could not update file {}: {}", current.id, err);
                        report
                            .failures
                            .push(FileFailure::new(Some(current.id), &current.file_path, &err));
                    }
                }
            }
            let stalled = still_blocked.len() == before;
            blocked = still_blocked;
            if stalled {
                break;
            }
        }
        for (current, _, err) in blocked {
            warn!("could not update file {}: {}", current.id, err);
            report
                .failures
                .push(FileFailure::new(Some(current.id), &current.file_path, &err));
        }
    }
}

/// The row `current` should become under `entry`'s metadata and placement.
fn placed(
    song: &Song,
    collection: Option<&Collection>,
    current: &AssetFile,
    entry: &FileEntry,
) -> AssetFile {
    let mut next = current.clone();
    next.metadata = entry.metadata.clone();
    next.collection_id = collection.map(|c| c.id);
    next.file_path = planned_path(
        song,
        collection,
        current.asset_type,
        &next.metadata,
        &next.extension,
    );
    next
}

fn collection_dir(song: &Song, asset_type: AssetType, id: u64, name: &str) -> String {
    resolve_dir(SongRef::from(song), asset_type, Some(CollectionRef { id, name }))
}

fn dedup_in_place(ids: &mut Vec<u64>) {
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(*id));
}
