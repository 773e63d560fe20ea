//! Common test utilities for media-relay integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use media_relay::delivery::{
    ChannelSet, DeliveryChannel, DeliveryReceipt, DeliveryTarget, ProgressSink,
};
use media_relay::extractor::{
    MediaExtractor, ProgressHook, ProgressSample, RawMediaInfo, RawPlaylist, RetrievalOutcome,
    RetrievalRequest,
};
use media_relay::types::DirectLink;
use media_relay::{Config, Error, JobId, JobSnapshot, MediaRelay, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Extractor that writes `payload` in four progress steps
///
/// With `hold` set it stops after the first step, leaves a `.part` file
/// behind and waits for cancellation.
pub struct FakeExtractor {
    pub payload: Vec<u8>,
    pub hold: bool,
}

impl FakeExtractor {
    pub fn writing(payload: Vec<u8>) -> Self {
        Self {
            payload,
            hold: false,
        }
    }

    pub fn holding() -> Self {
        Self {
            payload: vec![7; 64],
            hold: true,
        }
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn probe(&self, _url: &str) -> Result<RawMediaInfo> {
        Ok(RawMediaInfo {
            title: Some("Fake".into()),
            ..Default::default()
        })
    }

    async fn playlist(&self, _url: &str) -> Result<RawPlaylist> {
        Ok(RawPlaylist::default())
    }

    async fn direct_link(&self, _url: &str, _format: Option<&str>) -> Result<DirectLink> {
        Err(Error::Retrieval("no direct URL".into()))
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest,
        hook: &dyn ProgressHook,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome> {
        let total = self.payload.len() as u64;
        let target = request.output_dir.join(format!("{}.mp4", request.file_stem));

        if self.hold {
            let partial = request
                .output_dir
                .join(format!("{}.mp4.part", request.file_stem));
            tokio::fs::write(&partial, &self.payload[..total as usize / 4]).await?;
            hook.on_progress(&ProgressSample {
                downloaded: total / 4,
                total: Some(total),
                ..Default::default()
            })?;
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }

        for step in 1..=4u64 {
            hook.on_progress(&ProgressSample {
                downloaded: total * step / 4,
                total: Some(total),
                speed: Some(1024.0),
                eta: Some(4 - step),
                ..Default::default()
            })?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        hook.on_finished();
        tokio::fs::write(&target, &self.payload).await?;

        Ok(RetrievalOutcome {
            title: "Fake".into(),
            ext: "mp4".into(),
            path: Some(target),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// One upload seen by a [`CollectingChannel`]
#[derive(Clone, Debug)]
pub struct Collected {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// `.part` files present in the directory at upload time
    pub parts_on_disk: Vec<String>,
}

/// Channel that keeps a copy of everything uploaded to it
#[derive(Default)]
pub struct CollectingChannel {
    uploads: Mutex<Vec<Collected>>,
}

impl CollectingChannel {
    pub fn uploads(&self) -> Vec<Collected> {
        self.uploads.lock().unwrap().clone()
    }
}

pub fn part_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.contains(".part"))
        .collect();
    names.sort();
    names
}

#[async_trait]
impl DeliveryChannel for CollectingChannel {
    fn name(&self) -> &'static str {
        "collecting"
    }

    async fn send(
        &self,
        target: &DeliveryTarget,
        file: &Path,
        file_name: &str,
        _caption: &str,
        progress: ProgressSink,
    ) -> Result<DeliveryReceipt> {
        let bytes = tokio::fs::read(file).await?;
        progress.report(bytes.len() as u64, bytes.len() as u64);
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(Collected {
            file_name: file_name.to_string(),
            bytes,
            parts_on_disk: part_files(file.parent().unwrap()),
        });
        Ok(DeliveryReceipt {
            chat_id: target.chat_id.clone(),
            message_id: uploads.len() as i64,
            link: None,
        })
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Config rooted at `dir` with tiny delivery limits
///
/// small 10 B, large 50 B, chunk 40 B, split total 1000 B.
pub fn tiny_limits(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.downloads_dir = dir.to_path_buf();
    config.telegram.public_base_url = "https://relay.example".into();
    config.delivery.small_limit = 10;
    config.delivery.large_limit = 50;
    config.delivery.chunk_size = 40;
    config.delivery.max_split_total = 1000;
    config.delivery.pause_between_parts = Duration::ZERO;
    config
}

pub async fn relay(
    config: Config,
    extractor: impl MediaExtractor + 'static,
    channels: ChannelSet,
) -> MediaRelay {
    MediaRelay::with_components(config, Arc::new(extractor), channels)
        .await
        .unwrap()
}

/// Poll until the job is terminal, collecting every snapshot seen
pub async fn poll_until_terminal(relay: &MediaRelay, id: &JobId) -> Vec<JobSnapshot> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        loop {
            let snapshot = relay.progress(id);
            let done = snapshot.status.is_terminal();
            seen.push(snapshot);
            if done {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("job never reached a terminal state")
}
