//! Delivery handlers.

use super::{DeliverRequest, parse_id};
use crate::api::AppState;
use crate::delivery::{DeliveryOutcome, DeliveryTarget, FailureKind, StrategyDecision};
use crate::error::Error;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// Status for a failed delivery, mirroring the matching error variant
fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::Rejected => StatusCode::BAD_GATEWAY,
        FailureKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::ArtifactMissing => StatusCode::NOT_FOUND,
        FailureKind::NoViableStrategy => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /delivery/:id/options - Options on offer for an artifact
#[utoipa::path(
    get,
    path = "/api/delivery/{id}/options",
    tag = "delivery",
    params(
        ("id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Offered options and rejection reasons", body = StrategyDecision),
        (status = 400, description = "Invalid id or job has not completed", body = crate::error::ApiError),
        (status = 404, description = "Unknown job or artifact gone", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn delivery_options(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StrategyDecision>, Error> {
    let id = parse_id(&id)?;
    Ok(Json(state.relay.delivery_options(&id).await?))
}

/// POST /delivery/:id - Deliver with the chosen option
///
/// Failures answer with the outcome body (reason plus suggested fallback)
/// and a status that reflects the failure class.
#[utoipa::path(
    post,
    path = "/api/delivery/{id}",
    tag = "delivery",
    params(
        ("id" = String, Path, description = "Job id")
    ),
    request_body = DeliverRequest,
    responses(
        (status = 200, description = "Delivered, or link handed out", body = DeliveryOutcome),
        (status = 400, description = "Invalid id, empty chat_id or job not completed", body = crate::error::ApiError),
        (status = 404, description = "Artifact gone (unknown jobs answer with an ApiError body)", body = DeliveryOutcome),
        (status = 422, description = "Option not offered for this file", body = DeliveryOutcome),
        (status = 500, description = "Upload failed for another reason", body = DeliveryOutcome),
        (status = 502, description = "Destination rejected the upload", body = DeliveryOutcome),
        (status = 503, description = "Delivery channel unavailable", body = DeliveryOutcome),
        (status = 504, description = "Upload timed out", body = DeliveryOutcome)
    )
)]
pub async fn deliver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DeliverRequest>,
) -> Result<impl IntoResponse, Error> {
    let id = parse_id(&id)?;
    if request.chat_id.trim().is_empty() {
        return Err(Error::Validation("chat_id must not be empty".into()));
    }

    let outcome = state
        .relay
        .deliver(
            &id,
            request.option,
            DeliveryTarget {
                chat_id: request.chat_id,
            },
            None,
        )
        .await?;

    let status = match &outcome {
        DeliveryOutcome::Failed { kind, .. } => failure_status(*kind),
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
