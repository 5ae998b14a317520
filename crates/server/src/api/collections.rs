use assets::CollectionUpdate;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::{AssetType, Collection};

use crate::state::{AppState, CreateCollectionRequest, JsonResult, UpdateCollectionRequest};
use crate::utils::{json_error, run_blocking};

pub async fn create_collection(
    State(state): State<AppState>,
    Json(request): Json<CreateCollectionRequest>,
) -> JsonResult<Collection> {
    let Some(asset_type) = AssetType::parse(&request.asset_type) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            format!("unknown asset type {:?}", request.asset_type),
        ));
    };
    if request.name.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "collection name is required"));
    }
    let collection = run_blocking(&state, move |assets| {
        assets.create_collection(
            request.song_id,
            asset_type,
            &request.name,
            &request.description,
        )
    })
    .await?;
    Ok(Json(collection))
}

pub async fn update_collection(
    State(state): State<AppState>,
    Path(collection_id): Path<u64>,
    Json(request): Json<UpdateCollectionRequest>,
) -> JsonResult<CollectionUpdate> {
    if request.name.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "collection name is required"));
    }
    let update = run_blocking(&state, move |assets| {
        assets.update_collection(collection_id, &request.name, &request.description)
    })
    .await?;
    Ok(Json(update))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    Path(collection_id): Path<u64>,
) -> JsonResult<CollectionUpdate> {
    let update =
        run_blocking(&state, move |assets| assets.delete_collection(collection_id)).await?;
    Ok(Json(update))
}
