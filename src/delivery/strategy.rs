//! Transfer strategy selection
//!
//! A pure function of artifact size, channel availability and the size
//! limits. Connectivity is probed by the caller, never here.

use super::DeliveryOption;
use crate::config::DeliveryConfig;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Why the large-payload channel cannot be used
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Unavailability {
    /// No large-payload server endpoint is configured
    LibraryAbsent,
    /// Endpoint configured but the bot token or application credentials are missing
    CredentialsMissing,
    /// Configured, but the server did not answer
    NotConnected,
}

impl Unavailability {
    /// Diagnostic text shown to users
    pub fn describe(&self) -> &'static str {
        match self {
            Unavailability::LibraryAbsent => "large-payload server is not configured",
            Unavailability::CredentialsMissing => {
                "large-payload credentials missing (bot token, API id or API hash)"
            }
            Unavailability::NotConnected => "large-payload server is not connected",
        }
    }
}

/// State of the large-payload channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LargeChannelState {
    /// Nothing about a large-payload channel is configured
    NotConfigured,
    /// Configured but unusable
    Unavailable(Unavailability),
    /// Ready to accept uploads
    Ready,
}

/// Availability of every delivery channel, as probed by the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChannelAvailability {
    /// Small-payload (bot) channel usable
    pub direct: bool,
    /// Large-payload channel state
    pub large: LargeChannelState,
}

/// An option that was considered and turned down
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Rejection {
    /// The rejected option
    pub option: DeliveryOption,
    /// Why it was rejected
    pub reason: String,
}

/// Result of strategy selection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StrategyDecision {
    /// Artifact size the decision was made for
    pub size: u64,
    /// Offered options, most preferred first; always ends with `link`
    pub options: Vec<DeliveryOption>,
    /// Options that were turned down, with reasons
    pub rejections: Vec<Rejection>,
}

impl StrategyDecision {
    /// Whether `option` is offered
    pub fn offers(&self, option: DeliveryOption) -> bool {
        self.options.contains(&option)
    }

    /// Whether only the link is left
    pub fn is_link_only(&self) -> bool {
        self.options == [DeliveryOption::Link]
    }

    /// Whether some send-as-file option is offered
    pub fn has_file_option(&self) -> bool {
        self.options.iter().any(|o| *o != DeliveryOption::Link)
    }

    /// Rejection reason recorded for `option`, if any
    pub fn rejection_for(&self, option: DeliveryOption) -> Option<&str> {
        self.rejections
            .iter()
            .find(|r| r.option == option)
            .map(|r| r.reason.as_str())
    }
}

fn large_rejection(state: LargeChannelState) -> Option<String> {
    match state {
        LargeChannelState::Ready => None,
        LargeChannelState::NotConfigured => {
            Some("channel unavailable: large-payload channel not configured".to_string())
        }
        LargeChannelState::Unavailable(why) => {
            Some(format!("channel unavailable: {}", why.describe()))
        }
    }
}

fn mib(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}

/// Decide which delivery options to offer for an artifact of `size` bytes
///
/// | size | offered |
/// |---|---|
/// | `<= small_limit` | direct, plus large-payload when ready |
/// | `<= large_limit` | large-payload when ready |
/// | `<= max_split_total` | split upload when large-payload is ready |
/// | larger | nothing |
///
/// `link` is appended to every decision.
pub fn select(
    size: u64,
    availability: &ChannelAvailability,
    limits: &DeliveryConfig,
) -> StrategyDecision {
    let mut options = Vec::new();
    let mut rejections = Vec::new();
    let mut reject = |option, reason: String| rejections.push(Rejection { option, reason });
    let large = large_rejection(availability.large);

    if size <= limits.small_limit {
        if availability.direct {
            options.push(DeliveryOption::Direct);
        } else {
            reject(
                DeliveryOption::Direct,
                "channel unavailable: bot token not configured".to_string(),
            );
        }
        match large {
            None => options.push(DeliveryOption::LargePayload),
            // Nothing configured is not worth reporting when direct send works
            Some(_) if availability.large == LargeChannelState::NotConfigured => {}
            Some(reason) => reject(DeliveryOption::LargePayload, reason),
        }
    } else if size <= limits.large_limit {
        reject(
            DeliveryOption::Direct,
            format!(
                "file exceeds the {} MB direct-send limit",
                mib(limits.small_limit)
            ),
        );
        match large {
            None => options.push(DeliveryOption::LargePayload),
            Some(reason) => reject(DeliveryOption::LargePayload, reason),
        }
    } else if size <= limits.max_split_total {
        reject(
            DeliveryOption::LargePayload,
            format!(
                "file exceeds the {} MB single-file ceiling",
                mib(limits.large_limit)
            ),
        );
        match large {
            None => options.push(DeliveryOption::SplitUpload),
            Some(reason) => reject(DeliveryOption::SplitUpload, reason),
        }
    } else {
        reject(
            DeliveryOption::SplitUpload,
            format!(
                "file exceeds the {} MB limit for split uploads",
                mib(limits.max_split_total)
            ),
        );
    }

    options.push(DeliveryOption::Link);
    StrategyDecision {
        size,
        options,
        rejections,
    }
}
