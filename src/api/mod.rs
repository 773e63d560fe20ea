//! REST API server module
//!
//! JSON endpoints for submitting retrievals, polling progress, cancelling,
//! fetching finished files and triggering chat delivery, plus an SSE event
//! stream and an OpenAPI document.

use crate::{Config, MediaRelay, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /api/download` - Submit a retrieval
/// - `POST /api/batch-download` - Submit several retrievals
/// - `GET /api/progress/:id` - Poll job progress
/// - `POST /api/cancel/:id` - Cancel a running job
///
/// ## Media
/// - `POST /api/video-info` - Metadata and selectable formats
/// - `POST /api/playlist-info` - Flat playlist listing
/// - `POST /api/direct-link` - Direct stream URL without downloading
///
/// ## Files
/// - `GET /api/download-file/:id` - Stream a finished artifact or bundle
/// - `POST /api/create-zip` - Bundle artifacts into a zip
/// - `POST /api/cleanup` - Run the age-based sweep now
///
/// ## Delivery
/// - `GET /api/delivery/:id/options` - Options on offer for an artifact
/// - `POST /api/delivery/:id` - Deliver with the chosen option
///
/// ## System
/// - `GET /api/health` - Health check
/// - `GET /api/openapi.json` - OpenAPI specification
/// - `GET /api/events` - Server-sent events stream
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
pub fn create_router(relay: Arc<MediaRelay>, config: Arc<Config>) -> Router {
    let state = AppState::new(relay, config.clone());

    let router = Router::new()
        // Jobs
        .route("/api/download", post(routes::submit_download))
        .route("/api/batch-download", post(routes::batch_download))
        .route("/api/progress/:id", get(routes::get_progress))
        .route("/api/cancel/:id", post(routes::cancel_download))
        // Media
        .route("/api/video-info", post(routes::video_info))
        .route("/api/playlist-info", post(routes::playlist_info))
        .route("/api/direct-link", post(routes::direct_link))
        // Files
        .route("/api/download-file/:id", get(routes::download_file))
        .route("/api/create-zip", post(routes::create_zip))
        .route("/api/cleanup", post(routes::cleanup))
        // Delivery
        .route("/api/delivery/:id/options", get(routes::delivery_options))
        .route("/api/delivery/:id", post(routes::deliver))
        // System
        .route("/api/health", get(routes::health_check))
        .route("/api/openapi.json", get(routes::openapi_spec))
        .route("/api/events", get(routes::event_stream));

    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer from the configured origins (`*` allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API on the configured bind address until `shutdown` is cancelled
///
/// # Example
///
/// ```no_run
/// use media_relay::{Config, MediaRelay};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let relay = Arc::new(MediaRelay::new((*config).clone()).await?);
///
/// media_relay::api::start_api_server(relay.clone(), config, relay.shutdown_token()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    relay: Arc<MediaRelay>,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> Result<()> {
    let bind_address = config.api.bind_address;
    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(relay, config);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
