//! Delivery of finished artifacts
//!
//! [`strategy`] decides how an artifact may be sent, [`splitter`] cuts
//! oversized files into parts, [`progress`] throttles upload notifications,
//! [`channel`] wraps the destinations and [`orchestrator`] drives one
//! delivery attempt through `selecting → (splitting) → uploading → done | failed`.

pub mod caption;
pub mod channel;
pub mod orchestrator;
pub mod progress;
pub mod splitter;
pub mod strategy;

pub use channel::{
    BotApiChannel, ChannelSet, DeliveryChannel, DeliveryReceipt, DeliveryTarget, message_link,
};
pub use orchestrator::{DeliveryOrchestrator, DeliveryOutcome, DeliveryRequest, download_url};
pub use progress::{
    ProgressSink, ProgressTracker, UploadNotifier, UploadReporter, UploadSnapshot,
};
pub use splitter::{Part, part_name, plan_parts, write_part};
pub use strategy::{
    ChannelAvailability, LargeChannelState, Rejection, StrategyDecision, Unavailability, select,
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How an artifact can be delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
    /// Send the file through the small-payload (bot) channel
    Direct,
    /// Send the file through the large-payload channel
    LargePayload,
    /// Split into parts and send each through the large-payload channel
    SplitUpload,
    /// Hand out a retrievable link to this service
    Link,
}

impl DeliveryOption {
    /// Short label used in logs and button callbacks
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOption::Direct => "direct",
            DeliveryOption::LargePayload => "large_payload",
            DeliveryOption::SplitUpload => "split_upload",
            DeliveryOption::Link => "link",
        }
    }
}

impl std::fmt::Display for DeliveryOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of one delivery attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DeliveryPhase {
    /// Consulting the strategy selector
    Selecting,
    /// Cutting the artifact into parts
    Splitting,
    /// Uploading part `part` of `total` (1-indexed; `1 of 1` when unsplit)
    Uploading {
        /// Current part
        part: usize,
        /// Number of parts
        total: usize,
    },
    /// Delivered
    Done,
    /// Gave up
    Failed,
}

/// Why a delivery attempt failed, so callers can decide on a fallback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upload exceeded its time budget
    Timeout,
    /// The destination refused the upload
    Rejected,
    /// The channel is not configured or not connected
    Unavailable,
    /// The artifact or a part vanished from disk
    ArtifactMissing,
    /// The chosen option is not offered for this artifact
    NoViableStrategy,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Classify an error raised during delivery
    pub fn of(error: &crate::Error) -> Self {
        use crate::Error;
        match error {
            Error::TransferTimeout { .. } => FailureKind::Timeout,
            Error::ChannelRejected(_) => FailureKind::Rejected,
            Error::ChannelUnavailable { .. } => FailureKind::Unavailable,
            Error::ArtifactMissing { .. } => FailureKind::ArtifactMissing,
            Error::NoViableStrategy(_) => FailureKind::NoViableStrategy,
            _ => FailureKind::Other,
        }
    }
}
