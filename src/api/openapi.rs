//! OpenAPI documentation and schema generation
//!
//! The document is built at compile time by utoipa and served at
//! `/api/openapi.json` (and through Swagger UI when enabled).

use utoipa::OpenApi;

/// OpenAPI documentation for the media-relay REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-relay REST API",
        version = "0.1.0",
        description = "Remote media retrieval with live progress, cancellation and chat delivery",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_download,
        crate::api::routes::batch_download,
        crate::api::routes::get_progress,
        crate::api::routes::cancel_download,

        // Media
        crate::api::routes::video_info,
        crate::api::routes::playlist_info,
        crate::api::routes::direct_link,

        // Files
        crate::api::routes::download_file,
        crate::api::routes::create_zip,
        crate::api::routes::cleanup,

        // Delivery
        crate::api::routes::delivery_options,
        crate::api::routes::deliver,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            crate::types::JobId,
            crate::types::JobStatus,
            crate::types::JobSnapshot,
            crate::types::MediaInfo,
            crate::types::FormatInfo,
            crate::types::PlaylistInfo,
            crate::types::PlaylistEntry,
            crate::types::DirectLink,
            crate::types::Event,
            crate::service::BatchItem,
            crate::archive::ZipBundle,
            crate::delivery::DeliveryOption,
            crate::delivery::DeliveryPhase,
            crate::delivery::FailureKind,
            crate::delivery::DeliveryOutcome,
            crate::delivery::StrategyDecision,
            crate::delivery::Rejection,
            crate::api::routes::DownloadRequest,
            crate::api::routes::UrlRequest,
            crate::api::routes::BatchDownloadRequest,
            crate::api::routes::CreateZipRequest,
            crate::api::routes::DeliverRequest,
            crate::api::routes::DownloadResponse,
            crate::api::routes::MessageResponse,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "jobs", description = "Retrieval jobs: submit, poll, cancel"),
        (name = "media", description = "Media metadata without downloading"),
        (name = "files", description = "Finished files, bundles and cleanup"),
        (name = "delivery", description = "Delivery of finished files to chat"),
        (name = "system", description = "Health, events and documentation")
    )
)]
pub struct ApiDoc;
