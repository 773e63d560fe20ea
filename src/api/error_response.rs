//! HTTP error responses
//!
//! Domain errors become a status code plus the JSON [`ApiError`] envelope.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status_code.is_server_error() {
            tracing::warn!(code = self.error_code(), error = %self, "request failed");
        }

        let api_error: ApiError = self.into();
        (status_code, Json(api_error)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Without the originating Error there is no better status to pick
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_is_bad_request() {
        let response = Error::Validation("bad url".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "validation_error");
        assert!(api_error.error.message.contains("bad url"));
    }

    #[tokio::test]
    async fn timeout_carries_budget_and_fallback() {
        let response = Error::TransferTimeout {
            timeout: Duration::from_secs(360),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let details = body_of(response).await.error.details.unwrap();
        assert_eq!(details["timeout_secs"], 360);
        assert_eq!(details["fallback"], "link");
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found_with_path() {
        let response = Error::ArtifactMissing {
            path: PathBuf::from("/downloads/abc.mp4"),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let details = body_of(response).await.error.details.unwrap();
        assert!(details["path"].as_str().unwrap().ends_with("abc.mp4"));
    }

    #[tokio::test]
    async fn unavailable_channel_names_precondition() {
        let response = Error::ChannelUnavailable {
            channel: "large".into(),
            reason: "credentials missing".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "channel_unavailable");
        assert_eq!(api_error.error.details.unwrap()["reason"], "credentials missing");
    }
}
