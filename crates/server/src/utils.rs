use std::sync::Arc;

use assets::{AssetError, AssetManager};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::state::{AppState, ErrorResponse};

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

pub fn asset_status(err: &AssetError) -> StatusCode {
    match err {
        AssetError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AssetError::NotFound(_) | AssetError::MissingSource(_) => StatusCode::NOT_FOUND,
        AssetError::Conflict(_) => StatusCode::CONFLICT,
        AssetError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AssetError::Store(_) | AssetError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn asset_error(err: AssetError) -> (StatusCode, Json<ErrorResponse>) {
    let status = asset_status(&err);
    if status.is_server_error() {
        error!("asset operation failed: {}", err);
    }
    json_error(status, err.to_string())
}

/// Runs a synchronous engine call on the blocking pool.
pub async fn run_blocking<T, F>(
    state: &AppState,
    task: F,
) -> Result<T, (StatusCode, Json<ErrorResponse>)>
where
    T: Send + 'static,
    F: FnOnce(&AssetManager) -> Result<T, AssetError> + Send + 'static,
{
    let assets = Arc::clone(&state.assets);
    match tokio::task::spawn_blocking(move || task(&assets)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(asset_error(err)),
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("task failed: {}", err),
        )),
    }
}
