use std::collections::HashMap;

use assets::{Payload, SongEdit, UploadCollection, UploadRequest};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use catalog::FileView;
use common::{AssetType, FileMetadata};
use tracing::{info, warn};

use crate::state::{AppState, ErrorResponse, JsonResult, ReconcileResponse};
use crate::utils::{json_error, run_blocking};

const EDIT_PART: &str = "edit";
const FILE_PART: &str = "file";

/// One multipart field, fully buffered.
#[derive(Debug)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl FormPart {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).trim().to_string()
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> JsonResult<FileView> {
    let parts = read_parts(multipart).await?;
    let request = upload_request(parts).map_err(|msg| json_error(StatusCode::BAD_REQUEST, msg))?;
    let file = run_blocking(&state, move |assets| assets.upload(request)).await?;
    info!("Uploaded {} for song {}", file.file_path, file.song_id);
    Ok(Json(FileView::from(&file)))
}

pub async fn reconcile_assets(
    State(state): State<AppState>,
    Path(song_id): Path<u64>,
    multipart: Multipart,
) -> JsonResult<ReconcileResponse> {
    let parts = read_parts(multipart).await?;
    let (edit, payloads) =
        song_edit(parts).map_err(|msg| json_error(StatusCode::BAD_REQUEST, msg))?;
    let response = run_blocking(&state, move |assets| {
        let report = assets.reconcile(song_id, &edit, &payloads)?;
        let song = assets.catalog().song_view(song_id)?;
        Ok(ReconcileResponse { report, song })
    })
    .await?;
    if !response.report.is_clean() {
        warn!(
            "Asset edit for song {} finished with {} failures",
            song_id,
            response.report.failures.len()
        );
    }
    Ok(Json(response))
}

async fn read_parts(
    mut multipart: Multipart,
) -> Result<Vec<FormPart>, (StatusCode, Json<ErrorResponse>)> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(|value| value.to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;
        parts.push(FormPart {
            name,
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Ok(parts)
}

fn multipart_error(err: MultipartError) -> (StatusCode, Json<ErrorResponse>) {
    json_error(err.status(), format!("invalid multipart body: {}", err.body_text()))
}

/// Form fields: `file`, `songId`, `assetType`, and optionally
/// `collectionId` or `collectionName`, `fileName`, `replaceFileId` and
/// `metadata` (JSON).
pub fn upload_request(parts: Vec<FormPart>) -> Result<UploadRequest, String> {
    let mut payload = None;
    let mut fields = HashMap::new();
    for part in parts {
        if part.name == FILE_PART {
            payload = Some(Payload {
                file_name: part.file_name.unwrap_or_default(),
                bytes: part.bytes,
            });
        } else {
            let value = part.text();
            fields.insert(part.name, value);
        }
    }
    let field = |name: &str| fields.get(name).map(String::as_str).filter(|v| !v.is_empty());

    let Some(mut payload) = payload else {
        return Err("missing file part".to_string());
    };
    if let Some(file_name) = field("fileName") {
        payload.file_name = file_name.to_string();
    }
    let song_id = parse_id(field("songId"), "songId")?.ok_or("songId is required")?;
    let asset_type = match field("assetType") {
        Some(value) => {
            AssetType::parse(value).ok_or_else(|| format!("unknown asset type {:?}", value))?
        }
        None => return Err("assetType is required".to_string()),
    };
    let collection = match (parse_id(field("collectionId"), "collectionId")?, field("collectionName")) {
        (Some(collection_id), _) => UploadCollection::Existing(collection_id),
        (None, Some(name)) => UploadCollection::Named(name.to_string()),
        (None, None) => UploadCollection::Ungrouped,
    };
    let replace_file_id = parse_id(field("replaceFileId"), "replaceFileId")?;
    let metadata = match field("metadata") {
        Some(raw) => serde_json::from_str::<FileMetadata>(raw)
            .map_err(|err| format!("invalid metadata: {}", err))?,
        None => FileMetadata::default(),
    };

    Ok(UploadRequest {
        song_id,
        asset_type,
        collection,
        replace_file_id,
        metadata,
        payload,
    })
}

/// The `edit` part carries the JSON edit; every other part is a payload
/// keyed by its field name, which entries reference as their upload token.
pub fn song_edit(parts: Vec<FormPart>) -> Result<(SongEdit, HashMap<String, Payload>), String> {
    let mut edit = None;
    let mut payloads = HashMap::new();
    for part in parts {
        if part.name == EDIT_PART {
            let parsed: SongEdit = serde_json::from_slice(&part.bytes)
                .map_err(|err| format!("invalid edit: {}", err))?;
            edit = Some(parsed);
            continue;
        }
        if part.name.is_empty() {
            return Err("payload part without a name".to_string());
        }
        let payload = Payload {
            file_name: part.file_name.unwrap_or_else(|| part.name.clone()),
            bytes: part.bytes,
        };
        if payloads.insert(part.name.clone(), payload).is_some() {
            return Err(format!("duplicate payload {:?}", part.name));
        }
    }
    let edit = edit.ok_or("missing edit part")?;
    Ok((edit, payloads))
}

fn parse_id(value: Option<&str>, field: &str) -> Result<Option<u64>, String> {
    match value {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("{} must be a number", field)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, value: &str) -> FormPart {
        FormPart {
            name: name.to_string(),
            file_name: None,
            bytes: value.as_bytes().to_vec(),
        }
    }

    fn file(name: &str, file_name: &str, bytes: &[u8]) -> FormPart {
        FormPart {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn upload_form_is_parsed() {
        let request = upload_request(vec![
            file("file", "take 1.mp3", b"ID3"),
            text("songId", "7"),
            text("assetType", "Recordings"),
            text("collectionName", "Live"),
            text("fileName", "renamed.mp3"),
            text("metadata", r#"{"name":"Take","album":"Live 2001"}"#),
        ])
        .unwrap();
        assert_eq!(request.song_id, 7);
        assert_eq!(request.asset_type, AssetType::Recordings);
        assert_eq!(request.collection, UploadCollection::Named("Live".to_string()));
        assert_eq!(request.payload.file_name, "renamed.mp3");
        assert_eq!(request.metadata.album, "Live 2001");
        assert_eq!(request.replace_file_id, None);
    }

    #[test]
    fn collection_id_wins_over_name() {
        let request = upload_request(vec![
            file("file", "a.pdf", b"%PDF"),
            text("songId", "1"),
            text("assetType", "sheet music"),
            text("collectionId", "3"),
            text("collectionName", "ignored"),
        ])
        .unwrap();
        assert_eq!(request.collection, UploadCollection::Existing(3));
        assert_eq!(request.metadata, FileMetadata::default());
    }

    #[test]
    fn upload_form_errors() {
        let missing_file = upload_request(vec![text("songId", "1"), text("assetType", "Lyrics")]);
        assert!(missing_file.unwrap_err().contains("file"));

        let bad_type = upload_request(vec![
            file("file", "a.txt", b"x"),
            text("songId", "1"),
            text("assetType", "Videos"),
        ]);
        assert!(bad_type.unwrap_err().contains("asset type"));

        let bad_id = upload_request(vec![
            file("file", "a.txt", b"x"),
            text("songId", "one"),
            text("assetType", "Lyrics"),
        ]);
        assert!(bad_id.unwrap_err().contains("songId"));
    }

    #[test]
    fn edit_form_collects_payloads_by_token() {
        let edit = r#"{"groups":[{"assetType":"Lyrics","entries":[{"kind":"file","upload":"u1"}]}]}"#;
        let (parsed, payloads) =
            song_edit(vec![text("edit", edit), file("u1", "verse.txt", b"words")]).unwrap();
        assert_eq!(parsed.groups.len(), 1);
        assert_eq!(payloads["u1"].file_name, "verse.txt");
        assert_eq!(payloads["u1"].bytes, b"words");
    }

    #[test]
    fn edit_form_requires_edit_part() {
        let err = song_edit(vec![file("u1", "verse.txt", b"words")]).unwrap_err();
        assert!(err.contains("edit"));

        let err = song_edit(vec![
            text("edit", "{}"),
            file("u1", "a.txt", b"a"),
            file("u1", "b.txt", b"b"),
        ])
        .unwrap_err();
        assert!(err.contains("duplicate"));
    }
}
