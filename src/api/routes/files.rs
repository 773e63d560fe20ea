//! File streaming, zip bundle and cleanup handlers.

use super::{CreateZipRequest, MessageResponse, parse_id};
use crate::api::AppState;
use crate::error::Error;
use crate::types::JobStatus;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tokio_util::io::ReaderStream;

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}

/// GET /download-file/:id - Stream a finished artifact or bundle
#[utoipa::path(
    get,
    path = "/api/download-file/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "Job or bundle id")
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 400, description = "Malformed id", body = crate::error::ApiError),
        (status = 404, description = "No file for this id", body = crate::error::ApiError)
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let id = parse_id(&id)?;
    let path = state.relay.file_path(&id).await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::NotFound(format!("file {id}")))?;
    let size = file.metadata().await?.len();

    let on_disk = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(id.as_str())
        .to_string();
    let snapshot = state.relay.progress(&id);
    let name = if snapshot.status == JobStatus::Completed && !snapshot.filename.is_empty() {
        snapshot.filename
    } else {
        on_disk
    };

    tracing::debug!(job_id = %id, size_bytes = size, "serving file");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, size.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&name)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// POST /create-zip - Bundle artifacts into a zip
#[utoipa::path(
    post,
    path = "/api/create-zip",
    tag = "files",
    request_body = CreateZipRequest,
    responses(
        (status = 200, description = "Bundle created"),
        (status = 404, description = "No files found to zip", body = crate::error::ApiError)
    )
)]
pub async fn create_zip(
    State(state): State<AppState>,
    Json(request): Json<CreateZipRequest>,
) -> Result<impl IntoResponse, Error> {
    let bundle = state.relay.create_zip(&request.file_ids).await?;

    Ok(Json(json!({
        "success": true,
        "zip_url": format!("/api/download-file/{}", bundle.zip_id),
        "zip_id": bundle.zip_id,
        "files_count": bundle.files_count,
    })))
}

/// POST /cleanup - Run the age-based sweep now
#[utoipa::path(
    post,
    path = "/api/cleanup",
    tag = "files",
    responses(
        (status = 200, description = "Sweep finished", body = MessageResponse),
        (status = 500, description = "Sweep failed", body = crate::error::ApiError)
    )
)]
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<MessageResponse>, Error> {
    let removed = state.relay.cleanup().await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Cleanup completed, {removed} file(s) removed"),
    }))
}
