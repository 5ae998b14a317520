use assets::{BatchDeleteReport, CollectionChange, FileUpdate};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use catalog::FileView;

use crate::range::file_response;
use crate::state::{AppState, BatchDeleteRequest, ErrorResponse, JsonResult, UpdateFileRequest};
use crate::utils::{json_error, run_blocking};

pub async fn update_file(
    State(state): State<AppState>,
    Path(file_id): Path<u64>,
    Json(request): Json<UpdateFileRequest>,
) -> JsonResult<FileView> {
    let collection = match request.collection_id {
        None => CollectionChange::Keep,
        Some(None) => CollectionChange::Ungroup,
        Some(Some(collection_id)) => CollectionChange::MoveTo(collection_id),
    };
    let update = FileUpdate {
        metadata: request.metadata,
        collection,
    };
    let file = run_blocking(&state, move |assets| assets.update_file(file_id, update)).await?;
    Ok(Json(FileView::from(&file)))
}

pub async fn batch_delete(
    State(state): State<AppState>,
    Json(request): Json<BatchDeleteRequest>,
) -> JsonResult<BatchDeleteReport> {
    if request.file_ids.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "fileIds is empty"));
    }
    let report =
        run_blocking(&state, move |assets| assets.batch_delete(&request.file_ids)).await?;
    Ok(Json(report))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let relpath = path.trim_start_matches('/').to_string();
    if relpath.is_empty() {
        return Err(json_error(StatusCode::NOT_FOUND, "file not found"));
    }
    let mime = mime_guess::from_path(&relpath)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let data = run_blocking(&state, move |assets| assets.read_file(&relpath)).await?;
    Ok(file_response(data, &mime, range.as_deref()))
}
