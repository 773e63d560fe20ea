//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - submission, progress, cancellation
//! - [`media`] - metadata, playlists, direct links
//! - [`files`] - file streaming, zip bundles, cleanup
//! - [`delivery`] - delivery options and delivery
//! - [`system`] - health, events, OpenAPI

use crate::error::Error;
use crate::types::JobId;
use serde::{Deserialize, Serialize};

mod delivery;
mod files;
mod jobs;
mod media;
mod system;

pub use delivery::*;
pub use files::*;
pub use jobs::*;
pub use media::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /download and POST /direct-link
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadRequest {
    /// Media page URL (http or https)
    pub url: String,
    /// Extractor format id; omitted means best available
    #[serde(default)]
    pub format_id: Option<String>,
}

/// Request body for POST /video-info and POST /playlist-info
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UrlRequest {
    /// Media page URL
    pub url: String,
}

/// Request body for POST /batch-download
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct BatchDownloadRequest {
    /// URLs to retrieve
    pub urls: Vec<String>,
    /// Format id applied to every URL
    #[serde(default)]
    pub format_id: Option<String>,
}

/// Request body for POST /create-zip
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateZipRequest {
    /// Job ids whose artifacts go into the bundle
    pub file_ids: Vec<String>,
}

/// Request body for POST /delivery/:id
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DeliverRequest {
    /// Option picked from GET /delivery/:id/options
    pub option: crate::delivery::DeliveryOption,
    /// Chat of the requesting user
    pub chat_id: String,
}

/// Response for POST /download
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    /// Always true; failures are error responses
    pub success: bool,
    /// Job id to poll
    pub file_id: JobId,
    /// Human-readable status
    pub message: String,
}

/// Generic acknowledgement
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    /// Whether the action took effect
    pub success: bool,
    /// Human-readable status
    pub message: String,
}

/// Parse a path id, rejecting anything that is not a job id
fn parse_id(raw: &str) -> Result<JobId, Error> {
    JobId::parse(raw)
}
