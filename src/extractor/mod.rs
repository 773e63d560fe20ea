//! Media extraction service interface
//!
//! The extractor is an external collaborator: it resolves metadata and writes
//! bytes to disk, reporting progress through a [`ProgressHook`]. The hook may
//! veto further progress by returning an error, which aborts the retrieval.

mod formats;
mod unavailable;
mod ytdlp;

pub use formats::{
    RawFormat, RawMediaInfo, RawPlaylist, RawPlaylistEntry, build_media_info, build_playlist_info,
};
pub use unavailable::UnavailableExtractor;
pub use ytdlp::YtDlpExtractor;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::types::{DirectLink, MediaInfo, PlaylistInfo};

/// What to retrieve and where to put it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalRequest {
    /// Source URL
    pub url: String,
    /// Format selector; `None` lets the extractor pick the best single file
    pub format: Option<String>,
    /// Directory the output lands in
    pub output_dir: PathBuf,
    /// Filename stem; every file the extractor writes starts with it
    pub file_stem: String,
}

/// Result of a finished retrieval
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalOutcome {
    /// Media title
    pub title: String,
    /// Final container extension
    pub ext: String,
    /// Final path, when the extractor reports it
    pub path: Option<PathBuf>,
}

/// One progress report from the extractor
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressSample {
    /// Bytes written so far
    pub downloaded: u64,
    /// Exact total, if known
    pub total: Option<u64>,
    /// Estimated total, used when the exact one is missing
    pub total_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
}

impl ProgressSample {
    /// Best known total, zero when nothing is known
    pub fn best_total(&self) -> u64 {
        self.total.or(self.total_estimate).unwrap_or(0)
    }
}

/// Receives progress while bytes arrive
///
/// Returning an error from [`on_progress`](ProgressHook::on_progress) aborts
/// the retrieval with that error.
pub trait ProgressHook: Send + Sync {
    /// Called for every progress report
    fn on_progress(&self, sample: &ProgressSample) -> Result<()>;

    /// Called when the extractor finished writing a file
    fn on_finished(&self) {}
}

/// External media extraction service
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Fetch metadata and the raw format list without downloading
    async fn probe(&self, url: &str) -> Result<RawMediaInfo>;

    /// Flat listing of a playlist
    async fn playlist(&self, url: &str) -> Result<RawPlaylist>;

    /// Resolve a direct stream URL without downloading
    async fn direct_link(&self, url: &str, format: Option<&str>) -> Result<DirectLink>;

    /// Download to disk, reporting progress through `hook`
    async fn retrieve(
        &self,
        request: &RetrievalRequest,
        hook: &dyn ProgressHook,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Probe `url` and shape the result for display
pub async fn media_info(extractor: &dyn MediaExtractor, url: &str) -> Result<MediaInfo> {
    let raw = extractor.probe(url).await?;
    Ok(build_media_info(raw))
}

/// List `url` as a playlist (a single video becomes a one-entry listing)
pub async fn playlist_info(
    extractor: &dyn MediaExtractor,
    url: &str,
) -> Result<PlaylistInfo> {
    let raw = extractor.playlist(url).await?;
    Ok(build_playlist_info(raw, url))
}

/// Selector that merges the chosen format with the best audio track
///
/// Falls back to the format on its own when it already carries audio.
pub fn with_best_audio(format_id: &str) -> String {
    format!("{format_id}+bestaudio/{format_id}")
}

/// Pick an extractor for `config`
///
/// Uses the configured binary, then PATH; without either every call fails
/// with [`Error::ExternalTool`](crate::Error::ExternalTool).
pub fn select_extractor(config: &ExtractorConfig) -> Arc<dyn MediaExtractor> {
    if let Some(path) = &config.ytdlp_path {
        tracing::info!(path = %path.display(), "using configured yt-dlp binary");
        return Arc::new(YtDlpExtractor::new(path.clone(), config.clone()));
    }
    if config.search_path
        && let Some(extractor) = YtDlpExtractor::from_path(config.clone())
    {
        tracing::info!("using yt-dlp from PATH");
        return Arc::new(extractor);
    }
    tracing::warn!("yt-dlp not found, media retrieval is disabled");
    Arc::new(UnavailableExtractor)
}
