//! Remote storage upload endpoint.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::storage::XBearer;

pub const X_BEARER_HEADER: &str = "x-bearer";

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub folder_path: String,
    pub recording_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload/recording", get(upload_recording))
        .with_state(state)
}

/// GET /upload/recording - Copy a recording archive into the user's drive.
///
/// `X-Bearer` must carry `{"user": "...", "token": "..."}`.
async fn upload_recording(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
) -> ApiResult<Json<Value>> {
    let raw = headers
        .get(X_BEARER_HEADER)
        .map(|value| value.to_str())
        .transpose()
        .map_err(|_| ApiError::bad_request("X-Bearer header is not valid text"))?;
    let bearer = XBearer::parse(raw)?;

    info!(
        "Uploading {} into {:?} for {}",
        params.recording_url, params.folder_path, bearer.user
    );
    let code = state
        .uploader
        .upload_recording(&bearer, &params.folder_path, &params.recording_url)
        .await?;

    Ok(Json(json!({ "code": code })))
}
