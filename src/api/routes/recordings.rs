//! Recording acquisition endpoints.
//!
//! - POST /recordings - acquire, combine and announce a meeting recording
//! - GET /recordings/:run_key - persisted progress of a run

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::delivery::{validate_recipient, DeliveryStatus};
use crate::recording::{CombineDecision, MeetingRequest, RunLedger};

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingRequest {
    pub url: String,
    #[serde(default)]
    pub name: String,
    /// Recipient of the download notice.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordingResponse {
    pub run_key: String,
    pub already_existed: bool,
    /// Whether both tracks were merged; `None` when nothing was combined now.
    pub combined: Option<bool>,
    pub download_link: String,
    pub archive: Option<String>,
    pub notification: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_key: String,
    pub complete: bool,
    pub ledger: Option<RunLedger>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/recordings", post(create_recording))
        .route("/recordings/:run_key", get(recording_status))
        .with_state(state)
}

/// Runs the full pipeline for one meeting URL. Requests resolving to the same
/// run key are processed one at a time.
async fn create_recording(
    State(state): State<AppState>,
    Json(body): Json<RecordingRequest>,
) -> ApiResult<Json<RecordingResponse>> {
    let email = body
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());
    if let Some(email) = email {
        validate_recipient(email)?;
    }

    let request = MeetingRequest::new(body.url, body.name);
    let run_key = state.pipeline.run_key_for(&request)?;

    let _guard = state.locks.lock(&run_key).await;
    info!("Processing recording {}", run_key);

    let outcome = state.pipeline.process(&request).await?;
    let workdir = state.pipeline.workdir_for(&outcome.run.run_key);

    let notification = match email {
        Some(email) => {
            match state
                .delivery
                .notify(&workdir, email, &request.requested_name)
                .await
            {
                Ok(DeliveryStatus::Sent) => Some("sent".to_string()),
                Ok(DeliveryStatus::AlreadySent) => Some("already_sent".to_string()),
                Err(e) => {
                    error!("Failed to notify {}: {}", email, e);
                    Some("failed".to_string())
                }
            }
        }
        None => None,
    };

    Ok(Json(RecordingResponse {
        download_link: state.delivery.download_link(&outcome.run.run_key),
        run_key: outcome.run.run_key,
        already_existed: outcome.run.already_existed,
        combined: outcome
            .run
            .combine_decision
            .map(|decision| decision == CombineDecision::Merge),
        archive: outcome
            .output
            .map(|output| output.archive.to_string_lossy().to_string()),
        notification,
    }))
}

async fn recording_status(
    State(state): State<AppState>,
    Path(run_key): Path<String>,
) -> ApiResult<Json<RunStatusResponse>> {
    let workdir = state.pipeline.checked_workdir(&run_key)?;
    if !workdir.exists() {
        return Err(ApiError::not_found(format!("Recording {} not found", run_key)));
    }
    let ledger = state.pipeline.ledger_for(&run_key)?;

    Ok(Json(RunStatusResponse {
        complete: crate::recording::ledger::is_complete(&workdir),
        run_key,
        ledger,
    }))
}
