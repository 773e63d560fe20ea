//! Error types for media-relay
//!
//! Domain failures of retrieval and delivery, plus the ambient I/O, network
//! and serialization errors. Each variant maps to an HTTP status and a
//! machine-readable code so the API layer never has to guess.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any job is created
    #[error("invalid request: {0}")]
    Validation(String),

    /// Extraction or download failure reported by the extractor
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Cancelled by a caller
    #[error("cancelled by user")]
    Cancelled,

    /// Expected output file is absent
    #[error("artifact missing at {}", path.display())]
    ArtifactMissing {
        /// Where the file was expected
        path: PathBuf,
    },

    /// Delivery channel not configured or not connected
    #[error("{channel} channel unavailable: {reason}")]
    ChannelUnavailable {
        /// Channel name (e.g. "direct", "large")
        channel: String,
        /// The missing precondition
        reason: String,
    },

    /// Upload exceeded its computed time budget
    #[error("transfer timed out after {}s", timeout.as_secs())]
    TransferTimeout {
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// The destination refused the upload
    #[error("channel rejected upload: {0}")]
    ChannelRejected(String),

    /// No delivery option fits the artifact
    #[error("no viable delivery strategy: {0}")]
    NoViableStrategy(String),

    /// Job or file not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration error with the offending key
    #[error("configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
        /// The configuration key that caused the error (e.g., "delivery.chunk_size")
        key: Option<String>,
    },

    /// External tool (yt-dlp) missing or misbehaving
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// ZIP bundling failed
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress, no new jobs accepted
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether offering the retrievable link instead is a sensible next step
    ///
    /// A missing artifact leaves nothing to link to.
    pub fn suggests_link_fallback(&self) -> bool {
        matches!(
            self,
            Error::TransferTimeout { .. }
                | Error::ChannelRejected(_)
                | Error::ChannelUnavailable { .. }
                | Error::NoViableStrategy(_)
                | Error::Network(_)
                | Error::Io(_)
                | Error::Other(_)
        )
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "transfer_timeout",
///     "message": "transfer timed out after 360s",
///     "details": { "timeout_secs": 360 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Validation(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::ArtifactMissing { .. } => 404,

            // 409 Conflict - job already ended that way
            Error::Cancelled => 409,

            // 422 Unprocessable Entity
            Error::NoViableStrategy(_) => 422,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Archive(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - upstream said no
            Error::Retrieval(_) => 502,
            Error::ChannelRejected(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ChannelUnavailable { .. } => 503,
            Error::ExternalTool(_) => 503,
            Error::ShuttingDown => 503,

            // 504 Gateway Timeout
            Error::TransferTimeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Retrieval(_) => "retrieval_error",
            Error::Cancelled => "cancelled",
            Error::ArtifactMissing { .. } => "artifact_missing",
            Error::ChannelUnavailable { .. } => "channel_unavailable",
            Error::TransferTimeout { .. } => "transfer_timeout",
            Error::ChannelRejected(_) => "channel_rejected",
            Error::NoViableStrategy(_) => "no_viable_strategy",
            Error::NotFound(_) => "not_found",
            Error::Config { .. } => "config_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Archive(_) => "archive_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::ArtifactMissing { path } => Some(serde_json::json!({
                "path": path,
            })),
            Error::ChannelUnavailable { channel, reason } => Some(serde_json::json!({
                "channel": channel,
                "reason": reason,
                "fallback": "link",
            })),
            Error::TransferTimeout { timeout } => Some(serde_json::json!({
                "timeout_secs": timeout.as_secs(),
                "fallback": "link",
            })),
            Error::ChannelRejected(_) | Error::NoViableStrategy(_) => Some(serde_json::json!({
                "fallback": "link",
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (Error::Validation("empty url".into()), 400, "validation_error"),
            (
                Error::Config {
                    message: "chunk too big".into(),
                    key: Some("delivery.chunk_size".into()),
                },
                400,
                "config_error",
            ),
            (Error::NotFound("job abc".into()), 404, "not_found"),
            (
                Error::ArtifactMissing {
                    path: PathBuf::from("/tmp/x.mp4"),
                },
                404,
                "artifact_missing",
            ),
            (Error::Cancelled, 409, "cancelled"),
            (
                Error::NoViableStrategy("too large".into()),
                422,
                "no_viable_strategy",
            ),
            (
                Error::Io(std::io::Error::other("disk")),
                500,
                "io_error",
            ),
            (Error::ApiServerError("bind".into()), 500, "api_server_error"),
            (Error::Other("boom".into()), 500, "internal_error"),
            (
                Error::Archive(zip::result::ZipError::FileNotFound),
                500,
                "archive_error",
            ),
            (Error::Retrieval("404 from origin".into()), 502, "retrieval_error"),
            (
                Error::ChannelRejected("file too big".into()),
                502,
                "channel_rejected",
            ),
            (
                Error::ChannelUnavailable {
                    channel: "large".into(),
                    reason: "credentials missing".into(),
                },
                503,
                "channel_unavailable",
            ),
            (
                Error::ExternalTool("yt-dlp not found".into()),
                503,
                "external_tool_error",
            ),
            (Error::ShuttingDown, 503, "shutting_down"),
            (
                Error::TransferTimeout {
                    timeout: Duration::from_secs(360),
                },
                504,
                "transfer_timeout",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            assert_eq!(
                error.status_code(),
                expected_status,
                "status for {expected_code}"
            );
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[test]
    fn timeout_and_rejection_are_distinct() {
        let timeout = Error::TransferTimeout {
            timeout: Duration::from_secs(300),
        };
        let rejected = Error::ChannelRejected("413".into());
        assert_ne!(timeout.error_code(), rejected.error_code());
        assert_ne!(timeout.status_code(), rejected.status_code());
    }

    #[test]
    fn timeout_details_offer_link_fallback() {
        let api: ApiError = Error::TransferTimeout {
            timeout: Duration::from_secs(420),
        }
        .into();

        let details = api.error.details.expect("should have details");
        assert_eq!(details["timeout_secs"], 420);
        assert_eq!(details["fallback"], "link");
        assert!(api.error.message.contains("420s"));
    }

    #[test]
    fn channel_unavailable_details_carry_reason() {
        let api: ApiError = Error::ChannelUnavailable {
            channel: "large".into(),
            reason: "connection not established".into(),
        }
        .into();

        let details = api.error.details.unwrap();
        assert_eq!(details["channel"], "large");
        assert_eq!(details["reason"], "connection not established");
    }

    #[test]
    fn io_errors_have_no_details() {
        let api: ApiError = Error::Io(std::io::Error::other("disk fail")).into();
        assert_eq!(api.error.code, "io_error");
        assert!(api.error.details.is_none());
    }

    #[test]
    fn link_fallback_is_suggested_while_the_artifact_exists() {
        assert!(Error::ChannelRejected("x".into()).suggests_link_fallback());
        assert!(Error::Other("connection reset by peer".into()).suggests_link_fallback());
        assert!(Error::Io(std::io::Error::other("disk full")).suggests_link_fallback());
        assert!(
            Error::TransferTimeout {
                timeout: Duration::from_secs(1)
            }
            .suggests_link_fallback()
        );
        assert!(!Error::Cancelled.suggests_link_fallback());
        assert!(
            !Error::ArtifactMissing {
                path: PathBuf::from("x")
            }
            .suggests_link_fallback()
        );
    }

    #[test]
    fn api_error_without_details_omits_details_in_json() {
        let api = ApiError::new("test_code", "test message");
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&api).unwrap()).unwrap();

        assert_eq!(parsed["error"]["code"], "test_code");
        assert!(parsed["error"].get("details").is_none());
    }

    #[test]
    fn api_error_factories() {
        assert_eq!(ApiError::not_found("Job 1").error.message, "Job 1 not found");
        assert_eq!(ApiError::validation("bad").error.code, "validation_error");
        assert_eq!(ApiError::internal("oops").error.code, "internal_error");
    }
}
