pub mod collections;
pub mod files;
pub mod songs;
pub mod upload;

use assets::AuditReport;
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post, put},
    Json, Router,
};
use catalog::CatalogStats;

use crate::config::ServerConfig;
use crate::state::{AppState, HealthResponse, JsonResult};
use crate::utils::run_blocking;

/// Room for multipart boundaries and the non-file fields of a request.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Request body caps: one payload per upload request, many per asset edit.
/// The per-payload limit is still enforced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    pub upload: usize,
    pub edit: usize,
}

impl BodyLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            upload: config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            edit: config
                .max_edit_bytes
                .max(config.max_upload_bytes)
                .saturating_add(MULTIPART_OVERHEAD),
        }
    }
}

pub fn api_router(state: AppState) -> Router {
    let limits = BodyLimits::from_config(&state.config.read());

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/audit", get(audit))
        .route("/songs", get(songs::list_songs).post(songs::create_song))
        .route(
            "/songs/:song_id",
            get(songs::get_song)
                .put(songs::update_song)
                .delete(songs::delete_song),
        )
        .route(
            "/songs/:song_id/assets",
            put(upload::reconcile_assets).layer(DefaultBodyLimit::max(limits.edit)),
        )
        .route("/upload", post(upload::upload_file))
        .route("/collections", post(collections::create_collection))
        .route(
            "/collections/:collection_id",
            put(collections::update_collection).delete(collections::delete_collection),
        )
        .route("/files/batch-delete", post(files::batch_delete))
        .route("/files/:file_id", put(files::update_file))
        .route("/file/*path", get(files::get_file))
        .layer(DefaultBodyLimit::max(limits.upload))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn stats(State(state): State<AppState>) -> JsonResult<CatalogStats> {
    let stats = run_blocking(&state, |assets| Ok(assets.catalog().stats()?)).await?;
    Ok(Json(stats))
}

async fn audit(State(state): State<AppState>) -> JsonResult<AuditReport> {
    let report = run_blocking(&state, |assets| assets.audit()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_route_fits_several_full_size_payloads() {
        let config = ServerConfig::default();
        let limits = BodyLimits::from_config(&config);
        let two_recordings = 2 * 30 * 1024 * 1024;
        assert!(two_recordings > limits.upload);
        assert!(two_recordings < limits.edit);
        assert_eq!(limits.upload, config.max_upload_bytes + MULTIPART_OVERHEAD);
    }

    #[test]
    fn edit_limit_covers_at_least_one_upload() {
        let config = ServerConfig {
            max_upload_bytes: 100,
            max_edit_bytes: 10,
            ..ServerConfig::default()
        };
        let limits = BodyLimits::from_config(&config);
        assert_eq!(limits.edit, limits.upload);
    }
}
