use assets::{AssetError, SongDeletion};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use catalog::SongView;
use common::SongDraft;
use tracing::info;

use crate::state::{
    AppState, CreatedResponse, ErrorResponse, JsonResult, ListResponse, SongUpdateResponse,
};
use crate::utils::{json_error, run_blocking};

pub async fn list_songs(State(state): State<AppState>) -> JsonResult<ListResponse<SongView>> {
    let items = run_blocking(&state, |assets| Ok(assets.catalog().list_song_views()?)).await?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_song(
    State(state): State<AppState>,
    Path(song_id): Path<u64>,
) -> JsonResult<SongView> {
    let view = run_blocking(&state, move |assets| {
        assets
            .catalog()
            .song_view(song_id)?
            .ok_or_else(|| AssetError::NotFound(format!("song {} not found", song_id)))
    })
    .await?;
    Ok(Json(view))
}

pub async fn create_song(
    State(state): State<AppState>,
    Json(draft): Json<SongDraft>,
) -> Result<(StatusCode, Json<CreatedResponse>), (StatusCode, Json<ErrorResponse>)> {
    if draft.name.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "song name is required"));
    }
    let song = run_blocking(&state, move |assets| assets.create_song(&draft)).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: song.id })))
}

pub async fn update_song(
    State(state): State<AppState>,
    Path(song_id): Path<u64>,
    Json(draft): Json<SongDraft>,
) -> JsonResult<SongUpdateResponse> {
    if draft.name.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "song name is required"));
    }
    let response = run_blocking(&state, move |assets| {
        let update = assets.update_song(song_id, &draft)?;
        let view = assets.catalog().song_view(song_id)?;
        Ok(SongUpdateResponse { update, view })
    })
    .await?;
    if !response.update.failures.is_empty() {
        info!(
            "Song {} updated with {} file failures",
            song_id,
            response.update.failures.len()
        );
    }
    Ok(Json(response))
}

pub async fn delete_song(
    State(state): State<AppState>,
    Path(song_id): Path<u64>,
) -> JsonResult<SongDeletion> {
    let deletion = run_blocking(&state, move |assets| assets.delete_song(song_id)).await?;
    Ok(Json(deletion))
}
