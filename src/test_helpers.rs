//! Shared fakes for unit tests: a scripted extractor and a recording channel

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::delivery::{DeliveryChannel, DeliveryReceipt, DeliveryTarget, ProgressSink};
use crate::error::{Error, Result};
use crate::extractor::{
    MediaExtractor, ProgressHook, ProgressSample, RawFormat, RawMediaInfo, RawPlaylist,
    RawPlaylistEntry, RetrievalOutcome, RetrievalRequest,
};
use crate::store::JobStore;
use crate::types::{DirectLink, JobId, JobSnapshot};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One step a [`ScriptedExtractor`] plays back during `retrieve`
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Report `downloaded` of `total` bytes (`0` = unknown total)
    Progress(u64, u64),
    /// Signal that one file finished downloading
    Finish,
    /// Write the final `<stem>.mp4`
    Write(Vec<u8>),
    /// Write an in-progress `<stem>.mp4.part`
    Partial(Vec<u8>),
    /// Fail with a retrieval error
    Fail(String),
    /// Block until the job's cancellation token trips
    WaitForCancel,
    /// Block until [`ScriptedExtractor::resume`] is called
    Pause,
}

struct ScriptInner {
    steps: Vec<ScriptStep>,
    paused: Notify,
    resumed: Notify,
}

/// Extractor that plays back a fixed script instead of running yt-dlp
#[derive(Clone)]
pub struct ScriptedExtractor {
    inner: Arc<ScriptInner>,
}

impl ScriptedExtractor {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                steps,
                paused: Notify::new(),
                resumed: Notify::new(),
            }),
        }
    }

    /// Wait until the script reaches a [`ScriptStep::Pause`]
    pub async fn wait_paused(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.inner.paused.notified())
            .await
            .expect("script never paused");
    }

    /// Let a paused script continue
    pub fn resume(&self) {
        self.inner.resumed.notify_one();
    }
}

/// Metadata returned by [`ScriptedExtractor::probe`]
pub fn sample_media_info() -> RawMediaInfo {
    RawMediaInfo {
        title: Some("Scripted clip".into()),
        thumbnail: Some("https://img.example/clip.jpg".into()),
        duration: Some(125.0),
        formats: vec![
            RawFormat {
                format_id: Some("137".into()),
                format_note: Some("1080p".into()),
                ext: Some("mp4".into()),
                vcodec: Some("avc1".into()),
                acodec: Some("none".into()),
                width: Some(1920),
                height: Some(1080),
                fps: Some(30.0),
                filesize: Some(50 * 1024 * 1024),
                filesize_approx: None,
            },
            RawFormat {
                format_id: Some("140".into()),
                format_note: Some("medium".into()),
                ext: Some("m4a".into()),
                vcodec: Some("none".into()),
                acodec: Some("mp4a".into()),
                filesize_approx: Some(3 * 1024 * 1024),
                ..Default::default()
            },
        ],
    }
}

#[async_trait]
impl MediaExtractor for ScriptedExtractor {
    async fn probe(&self, url: &str) -> Result<RawMediaInfo> {
        if url.contains("missing") {
            return Err(Error::Retrieval("Video unavailable".into()));
        }
        Ok(sample_media_info())
    }

    async fn playlist(&self, _url: &str) -> Result<RawPlaylist> {
        Ok(RawPlaylist {
            id: Some("PL1".into()),
            title: Some("Scripted list".into()),
            entries: Some(vec![
                Some(RawPlaylistEntry {
                    id: Some("a1".into()),
                    title: Some("First".into()),
                    duration: Some(10.0),
                    ..Default::default()
                }),
                None,
                Some(RawPlaylistEntry {
                    id: Some("b2".into()),
                    title: Some("Second".into()),
                    url: Some("https://www.youtube.com/watch?v=b2".into()),
                    ..Default::default()
                }),
            ]),
            ..Default::default()
        })
    }

    async fn direct_link(&self, _url: &str, _format: Option<&str>) -> Result<DirectLink> {
        Ok(DirectLink {
            direct_url: "https://cdn.example/stream.mp4".into(),
            title: "Scripted clip".into(),
            ext: "mp4".into(),
        })
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest,
        hook: &dyn ProgressHook,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome> {
        let mut path = None;
        for step in &self.inner.steps {
            match step {
                ScriptStep::Progress(downloaded, total) => {
                    hook.on_progress(&ProgressSample {
                        downloaded: *downloaded,
                        total: (*total > 0).then_some(*total),
                        speed: Some(1024.0),
                        eta: Some(1),
                        ..Default::default()
                    })?;
                }
                ScriptStep::Finish => hook.on_finished(),
                ScriptStep::Write(bytes) => {
                    let file = request
                        .output_dir
                        .join(format!("{}.mp4", request.file_stem));
                    tokio::fs::write(&file, bytes).await?;
                    path = Some(file);
                }
                ScriptStep::Partial(bytes) => {
                    let file = request
                        .output_dir
                        .join(format!("{}.mp4.part", request.file_stem));
                    tokio::fs::write(&file, bytes).await?;
                }
                ScriptStep::Fail(message) => return Err(Error::Retrieval(message.clone())),
                ScriptStep::WaitForCancel => cancel.cancelled().await,
                ScriptStep::Pause => {
                    self.inner.paused.notify_one();
                    self.inner.resumed.notified().await;
                }
            }
        }
        Ok(RetrievalOutcome {
            title: "Scripted clip".into(),
            ext: "mp4".into(),
            path,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Poll `store` until the job reaches a terminal state
pub async fn wait_for_terminal(store: &dyn JobStore, id: &JobId) -> JobSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = store.get(id);
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job never reached a terminal state")
}

/// How a [`RecordingChannel`] answers uploads
#[derive(Clone, Copy, Debug)]
pub enum ChannelBehavior {
    /// Accept every upload
    Accept,
    /// Reject the n-th upload (1-based) and every one after it
    RejectFrom(usize),
    /// Fail the n-th upload (1-based) with a connection error
    DropFrom(usize),
    /// Never answer
    Hang,
    /// Fail the reachability probe
    Unreachable,
}

/// One upload seen by a [`RecordingChannel`]
#[derive(Clone, Debug)]
pub struct RecordedUpload {
    pub chat_id: String,
    pub file_name: String,
    pub caption: String,
    pub size: u64,
    /// Split parts present next to the uploaded file at upload time
    pub parts_on_disk: Vec<String>,
}

/// In-memory delivery channel that records what it was sent
pub struct RecordingChannel {
    name: &'static str,
    behavior: ChannelBehavior,
    uploads: Mutex<Vec<RecordedUpload>>,
    next_message: AtomicI64,
}

impl RecordingChannel {
    pub fn new(name: &'static str, behavior: ChannelBehavior) -> Self {
        Self {
            name,
            behavior,
            uploads: Mutex::new(Vec::new()),
            next_message: AtomicI64::new(1),
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

fn parts_next_to(file: &Path) -> Vec<String> {
    let Some(dir) = file.parent() else {
        return Vec::new();
    };
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .filter(|name| name.contains(".part"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(
        &self,
        target: &DeliveryTarget,
        file: &Path,
        file_name: &str,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<DeliveryReceipt> {
        let size = tokio::fs::metadata(file)
            .await
            .map_err(|_| Error::ArtifactMissing {
                path: file.to_path_buf(),
            })?
            .len();
        let attempt = {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(RecordedUpload {
                chat_id: target.chat_id.clone(),
                file_name: file_name.to_string(),
                caption: caption.to_string(),
                size,
                parts_on_disk: parts_next_to(file),
            });
            uploads.len()
        };

        match self.behavior {
            ChannelBehavior::RejectFrom(n) if attempt >= n => {
                Err(Error::ChannelRejected("Request Entity Too Large".into()))
            }
            ChannelBehavior::DropFrom(n) if attempt >= n => {
                Err(Error::Other("connection reset by peer".into()))
            }
            ChannelBehavior::Hang => std::future::pending().await,
            _ => {
                progress.report(size / 2, size);
                progress.report(size, size);
                Ok(DeliveryReceipt {
                    chat_id: target.chat_id.clone(),
                    message_id: self.next_message.fetch_add(1, Ordering::SeqCst),
                    link: None,
                })
            }
        }
    }

    async fn probe(&self) -> Result<()> {
        match self.behavior {
            ChannelBehavior::Unreachable => Err(Error::ChannelUnavailable {
                channel: self.name.to_string(),
                reason: "connection refused".into(),
            }),
            _ => Ok(()),
        }
    }
}
