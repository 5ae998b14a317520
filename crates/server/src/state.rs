use std::sync::Arc;

use assets::{AssetManager, ReconcileReport, SongUpdate};
use axum::http::StatusCode;
use axum::Json;
use catalog::SongView;
use common::FileMetadata;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub assets: Arc<AssetManager>,
    pub config: Arc<RwLock<ServerConfig>>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: u64,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongUpdateResponse {
    #[serde(flatten)]
    pub update: SongUpdate,
    pub view: Option<SongView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub report: ReconcileReport,
    pub song: Option<SongView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollectionRequest {
    pub song_id: u64,
    pub asset_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// `collectionId` absent keeps the current collection, `null` ungroups.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileRequest {
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
    #[serde(default, deserialize_with = "present")]
    pub collection_id: Option<Option<u64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteRequest {
    pub file_ids: Vec<u64>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
