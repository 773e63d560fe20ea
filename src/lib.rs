//! # media-relay
//!
//! Fetches media from a remote URL with a yt-dlp style extractor, reports
//! live progress, supports cancellation, and delivers the finished file to
//! a chat platform: directly, through a large-payload channel, split into
//! parts, or as a retrievable link.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - [`MediaRelay`] owns every component; the REST API
//!   and the chat bot are thin front ends over it
//! - **Event-driven** - job and delivery events are broadcast to subscribers
//! - **Failures carry a next step** - every delivery failure says whether the
//!   link is still on offer
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_relay::{Config, MediaRelay};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = MediaRelay::new(Config::default()).await?;
//!
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = relay.submit("https://www.youtube.com/watch?v=dQw4w9WgXcQ", None).await?;
//!     println!("{:?}", relay.progress(&id));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// ZIP bundling of finished artifacts
pub mod archive;
/// Chat bot front end
pub mod bot;
/// Configuration types
pub mod config;
/// Strategy selection, splitting, progress and channels for delivery
pub mod delivery;
/// Error types
pub mod error;
/// Media extraction service interface and the yt-dlp implementation
pub mod extractor;
/// Retrieval runner
pub mod retrieval;
/// The `MediaRelay` facade
pub mod service;
/// Artifact directory helpers and the age-based sweeper
pub mod storage;
/// Job store
pub mod store;
/// Bot API HTTP client
pub mod telegram;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use bot::ChatBot;
pub use config::Config;
pub use delivery::{DeliveryOption, DeliveryOutcome, FailureKind, StrategyDecision};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use service::MediaRelay;
pub use types::{
    DeliveryArtifact, Event, FormatInfo, JobId, JobSnapshot, JobStatus, MediaInfo, PlaylistInfo,
};

/// Wait for a termination signal, then shut the relay down gracefully
///
/// - **Unix:** SIGTERM or SIGINT; falls back to Ctrl+C when the handlers
///   cannot be registered.
/// - **Other platforms:** Ctrl+C.
///
/// Shutdown cancels the relay's [`shutdown_token`](MediaRelay::shutdown_token),
/// so an API server or chat bot started with that token stops as well.
///
/// # Example
///
/// ```no_run
/// use media_relay::{Config, MediaRelay, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let relay = MediaRelay::new(Config::default()).await?;
///     run_with_shutdown(relay).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(relay: MediaRelay) -> Result<()> {
    wait_for_signal().await;
    relay.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut terminate), Ok(mut interrupt)) => {
            tokio::select! {
                _ = terminate.recv() => tracing::info!(signal = "SIGTERM", "shutdown signal received"),
                _ = interrupt.recv() => tracing::info!(signal = "SIGINT", "shutdown signal received"),
            }
        }
        (terminate, interrupt) => {
            if let Some(e) = terminate.as_ref().err().or(interrupt.as_ref().err()) {
                tracing::warn!(error = %e, "signal handler registration failed, falling back to ctrl_c");
            }
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
