//! Media metadata handlers.

use super::{DownloadRequest, UrlRequest};
use crate::api::AppState;
use crate::error::Error;
use crate::types::{MediaInfo, PlaylistInfo};
use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

/// POST /video-info - Metadata and selectable formats
#[utoipa::path(
    post,
    path = "/api/video-info",
    tag = "media",
    request_body = UrlRequest,
    responses(
        (status = 200, description = "Title, duration and formats", body = MediaInfo),
        (status = 400, description = "Malformed URL", body = crate::error::ApiError),
        (status = 502, description = "Extractor failed", body = crate::error::ApiError)
    )
)]
pub async fn video_info(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> Result<Json<MediaInfo>, Error> {
    let info = state.relay.media_info(&request.url).await?;
    tracing::debug!(url = %request.url, formats = info.formats.len(), "media info resolved");
    Ok(Json(info))
}

/// POST /playlist-info - Flat playlist listing
#[utoipa::path(
    post,
    path = "/api/playlist-info",
    tag = "media",
    request_body = UrlRequest,
    responses(
        (status = 200, description = "Playlist entries", body = PlaylistInfo),
        (status = 400, description = "Malformed URL", body = crate::error::ApiError),
        (status = 502, description = "Extractor failed", body = crate::error::ApiError)
    )
)]
pub async fn playlist_info(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> Result<Json<PlaylistInfo>, Error> {
    Ok(Json(state.relay.playlist_info(&request.url).await?))
}

/// POST /direct-link - Direct stream URL without downloading
#[utoipa::path(
    post,
    path = "/api/direct-link",
    tag = "media",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "Direct media URL"),
        (status = 400, description = "Malformed URL", body = crate::error::ApiError),
        (status = 502, description = "No direct URL available", body = crate::error::ApiError)
    )
)]
pub async fn direct_link(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse, Error> {
    let link = state
        .relay
        .direct_link(&request.url, request.format_id.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "direct_url": link.direct_url,
        "title": link.title,
        "ext": link.ext,
    })))
}
