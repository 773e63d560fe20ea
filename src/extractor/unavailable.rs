//! Extractor used when no yt-dlp binary can be found

use super::{
    MediaExtractor, ProgressHook, RawMediaInfo, RawPlaylist, RetrievalOutcome, RetrievalRequest,
};
use crate::error::{Error, Result};
use crate::types::DirectLink;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Extractor that fails every call with [`Error::ExternalTool`]
///
/// Keeps the service and API up (health, cleanup, delivery of existing
/// artifacts) on hosts without yt-dlp.
pub struct UnavailableExtractor;

fn missing() -> Error {
    Error::ExternalTool(
        "media retrieval requires the yt-dlp binary. \
         Configure extractor.ytdlp_path or ensure yt-dlp is in PATH."
            .into(),
    )
}

#[async_trait]
impl MediaExtractor for UnavailableExtractor {
    async fn probe(&self, _url: &str) -> Result<RawMediaInfo> {
        Err(missing())
    }

    async fn playlist(&self, _url: &str) -> Result<RawPlaylist> {
        Err(missing())
    }

    async fn direct_link(&self, _url: &str, _format: Option<&str>) -> Result<DirectLink> {
        Err(missing())
    }

    async fn retrieve(
        &self,
        _request: &RetrievalRequest,
        _hook: &dyn ProgressHook,
        _cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome> {
        Err(missing())
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
