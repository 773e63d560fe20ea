//! Job submission, progress and cancellation handlers.

use super::{BatchDownloadRequest, DownloadRequest, DownloadResponse, MessageResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::{JobId, JobSnapshot};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

/// POST /download - Submit a retrieval
#[utoipa::path(
    post,
    path = "/api/download",
    tag = "jobs",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "Job accepted", body = DownloadResponse),
        (status = 400, description = "Malformed URL or format selector", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, Error> {
    let file_id = state
        .relay
        .submit(&request.url, request.format_id.as_deref())
        .await?;

    Ok(Json(DownloadResponse {
        success: true,
        file_id,
        message: "Download started".to_string(),
    }))
}

/// POST /batch-download - Submit several retrievals
#[utoipa::path(
    post,
    path = "/api/batch-download",
    tag = "jobs",
    request_body = BatchDownloadRequest,
    responses(
        (status = 200, description = "One result per URL"),
        (status = 400, description = "Empty URL list", body = crate::error::ApiError)
    )
)]
pub async fn batch_download(
    State(state): State<AppState>,
    Json(request): Json<BatchDownloadRequest>,
) -> Result<impl IntoResponse, Error> {
    if request.urls.is_empty() {
        return Err(Error::Validation("urls must not be empty".into()));
    }
    let results = state
        .relay
        .submit_batch(&request.urls, request.format_id.as_deref())
        .await?;
    let successful = results.iter().filter(|r| r.file_id.is_some()).count();

    Ok(Json(json!({
        "total": results.len(),
        "successful": successful,
        "failed": results.len() - successful,
        "results": results,
    })))
}

/// GET /progress/:id - Poll job progress
///
/// Unknown (or malformed) ids answer with the `unknown` sentinel rather
/// than an error, so pollers need no special casing.
#[utoipa::path(
    get,
    path = "/api/progress/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Current snapshot", body = JobSnapshot)
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<JobSnapshot> {
    match JobId::parse(&id) {
        Ok(id) => Json(state.relay.progress(&id)),
        Err(_) => Json(JobSnapshot::unknown()),
    }
}

/// POST /cancel/:id - Cancel a running job
#[utoipa::path(
    post,
    path = "/api/cancel/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Whether a job existed to cancel", body = MessageResponse)
    )
)]
pub async fn cancel_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let existed = JobId::parse(&id)
        .map(|id| state.relay.cancel(&id))
        .unwrap_or(false);

    let message = if existed {
        "Download cancelled"
    } else {
        "Download not found"
    };
    (
        StatusCode::OK,
        Json(MessageResponse {
            success: existed,
            message: message.to_string(),
        }),
    )
}
