//! Delivery orchestrator
//!
//! Drives one delivery attempt: consult the selector, split when the
//! artifact is above the single-file ceiling, upload each file under a
//! size-scaled timeout, and report a terminal outcome. Parts are uploaded
//! strictly in order and each is removed right after its own upload.

use super::caption::upload_caption;
use super::channel::{ChannelSet, DeliveryChannel, DeliveryReceipt, DeliveryTarget};
use super::progress::{ProgressTracker, UploadNotifier, UploadReporter, UploadSnapshot};
use super::splitter::{Part, plan_parts, write_part};
use super::strategy::{StrategyDecision, select};
use super::{DeliveryOption, DeliveryPhase, FailureKind};
use crate::config::DeliveryConfig;
use crate::error::{Error, Result};
use crate::types::{DeliveryArtifact, Event, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Retrievable link for a job's artifact
pub fn download_url(public_base_url: &str, id: &JobId) -> String {
    format!(
        "{}/api/download-file/{}",
        public_base_url.trim_end_matches('/'),
        id
    )
}

/// One delivery attempt
pub struct DeliveryRequest {
    /// What to deliver
    pub artifact: DeliveryArtifact,
    /// The option the user picked
    pub option: DeliveryOption,
    /// Who asked
    pub target: DeliveryTarget,
    /// Extra receiver of upload progress (e.g. a chat status message)
    pub notifier: Option<Arc<dyn UploadNotifier>>,
}

/// Terminal result of a delivery attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The file (or every part) was uploaded
    Delivered {
        /// Option used
        option: DeliveryOption,
        /// Link into the destination, when it has one
        link: Option<String>,
        /// Number of uploads (1 unless split)
        parts: usize,
        /// Bytes delivered
        size: u64,
    },
    /// A retrievable link was handed out
    Link {
        /// Download URL served by this service
        url: String,
    },
    /// Delivery failed
    Failed {
        /// Failure class
        kind: FailureKind,
        /// Human-readable reason
        reason: String,
        /// Suggested next action, when one exists
        fallback: Option<DeliveryOption>,
        /// Parts already delivered before the failure
        parts_delivered: usize,
    },
}

impl DeliveryOutcome {
    /// Whether the attempt succeeded
    pub fn is_success(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed { .. })
    }
}

struct EventNotifier {
    id: JobId,
    event_tx: broadcast::Sender<Event>,
}

#[async_trait]
impl UploadNotifier for EventNotifier {
    async fn notify(&self, snapshot: &UploadSnapshot) {
        self.event_tx
            .send(Event::UploadProgress {
                id: self.id.clone(),
                uploaded: snapshot.uploaded,
                total: snapshot.total,
                percentage: snapshot.percentage,
            })
            .ok();
    }
}

/// Sequences strategy selection, splitting and uploads
pub struct DeliveryOrchestrator {
    channels: Arc<ChannelSet>,
    config: DeliveryConfig,
    public_base_url: String,
    event_tx: broadcast::Sender<Event>,
}

struct UploadFile<'a> {
    path: &'a Path,
    name: &'a str,
    caption: String,
    size: u64,
    part: usize,
    parts: usize,
}

struct Failure {
    error: Error,
    parts_delivered: usize,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            parts_delivered: 0,
        }
    }
}

impl DeliveryOrchestrator {
    /// Create an orchestrator over `channels`
    pub fn new(
        channels: Arc<ChannelSet>,
        config: DeliveryConfig,
        public_base_url: String,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            channels,
            config,
            public_base_url,
            event_tx,
        }
    }

    /// Options on offer for an artifact of `size` bytes, probing channels now
    pub async fn decide(&self, size: u64) -> StrategyDecision {
        let availability = self.channels.availability().await;
        select(size, &availability, &self.config)
    }

    /// Retrievable link for `id`
    pub fn link_for(&self, id: &JobId) -> String {
        download_url(&self.public_base_url, id)
    }

    fn phase(&self, id: &JobId, option: DeliveryOption, phase: DeliveryPhase) {
        debug!(job_id = %id, option = %option, phase = ?phase, "delivery phase");
        self.event_tx
            .send(Event::DeliveryPhaseChanged {
                id: id.clone(),
                option,
                phase,
            })
            .ok();
    }

    /// Run one delivery attempt to a terminal outcome
    ///
    /// Never falls back to another option on its own; a failure carries the
    /// suggested fallback instead.
    pub async fn deliver(&self, request: DeliveryRequest) -> DeliveryOutcome {
        let id = request.artifact.job_id.clone();
        let option = request.option;

        self.phase(&id, option, DeliveryPhase::Selecting);
        let decision = self.decide(request.artifact.size).await;

        let result = if !decision.offers(option) {
            let reason = decision
                .rejection_for(option)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{option} is not offered for this file"));
            Err(Failure::from(Error::NoViableStrategy(reason)))
        } else {
            match option {
                DeliveryOption::Link => Ok(DeliveryOutcome::Link {
                    url: self.link_for(&id),
                }),
                DeliveryOption::Direct | DeliveryOption::LargePayload => {
                    self.upload_single(&request).await.map_err(Failure::from)
                }
                DeliveryOption::SplitUpload => self.upload_split(&request).await,
            }
        };

        match result {
            Ok(outcome) => {
                self.phase(&id, option, DeliveryPhase::Done);
                let link = match &outcome {
                    DeliveryOutcome::Delivered { link, .. } => link.clone(),
                    DeliveryOutcome::Link { url } => Some(url.clone()),
                    DeliveryOutcome::Failed { .. } => None,
                };
                info!(job_id = %id, option = %option, "delivery complete");
                self.event_tx
                    .send(Event::DeliveryComplete {
                        id: id.clone(),
                        link,
                    })
                    .ok();
                outcome
            }
            Err(Failure {
                error,
                parts_delivered,
            }) => {
                self.phase(&id, option, DeliveryPhase::Failed);
                let kind = FailureKind::of(&error);
                let reason = error.to_string();
                let fallback = (option != DeliveryOption::Link && error.suggests_link_fallback())
                    .then_some(DeliveryOption::Link);
                warn!(job_id = %id, option = %option, kind = ?kind, error = %reason, parts_delivered, "delivery failed");
                self.event_tx
                    .send(Event::DeliveryFailed {
                        id: id.clone(),
                        kind,
                        reason: reason.clone(),
                    })
                    .ok();
                DeliveryOutcome::Failed {
                    kind,
                    reason,
                    fallback,
                    parts_delivered,
                }
            }
        }
    }

    fn notifiers(&self, request: &DeliveryRequest) -> Vec<Arc<dyn UploadNotifier>> {
        let mut notifiers: Vec<Arc<dyn UploadNotifier>> = vec![Arc::new(EventNotifier {
            id: request.artifact.job_id.clone(),
            event_tx: self.event_tx.clone(),
        })];
        if let Some(extra) = &request.notifier {
            notifiers.push(extra.clone());
        }
        notifiers
    }

    /// Upload one file under its size-scaled timeout
    async fn upload_file(
        &self,
        channel: &dyn DeliveryChannel,
        request: &DeliveryRequest,
        file: UploadFile<'_>,
    ) -> Result<DeliveryReceipt> {
        let tracker = ProgressTracker::new(self.config.notify_interval, Instant::now())
            .for_part(file.part, file.parts);
        let reporter = UploadReporter::spawn(tracker, self.notifiers(request));
        let timeout = self.config.upload_timeout(file.size);

        let result = tokio::time::timeout(
            timeout,
            channel.send(
                &request.target,
                file.path,
                file.name,
                &file.caption,
                reporter.sink(),
            ),
        )
        .await;
        reporter.finish().await;

        match result {
            Ok(receipt) => receipt,
            Err(_) => Err(Error::TransferTimeout { timeout }),
        }
    }

    async fn upload_single(&self, request: &DeliveryRequest) -> Result<DeliveryOutcome> {
        let artifact = &request.artifact;
        let channel = self.channels.channel_for(request.option)?;
        if !tokio::fs::try_exists(&artifact.path).await.unwrap_or(false) {
            return Err(Error::ArtifactMissing {
                path: artifact.path.clone(),
            });
        }

        self.phase(
            &artifact.job_id,
            request.option,
            DeliveryPhase::Uploading { part: 1, total: 1 },
        );
        let file = UploadFile {
            path: &artifact.path,
            name: &artifact.display_name,
            caption: upload_caption(&artifact.display_name, artifact.size, None),
            size: artifact.size,
            part: 1,
            parts: 1,
        };
        let receipt = self.upload_file(channel.as_ref(), request, file).await?;

        Ok(DeliveryOutcome::Delivered {
            option: request.option,
            link: receipt.link,
            parts: 1,
            size: artifact.size,
        })
    }

    async fn upload_split(
        &self,
        request: &DeliveryRequest,
    ) -> std::result::Result<DeliveryOutcome, Failure> {
        let artifact = &request.artifact;
        let channel = self.channels.channel_for(request.option)?;
        if !tokio::fs::try_exists(&artifact.path).await.unwrap_or(false) {
            return Err(Error::ArtifactMissing {
                path: artifact.path.clone(),
            }
            .into());
        }

        self.phase(&artifact.job_id, request.option, DeliveryPhase::Splitting);
        let parts = plan_parts(&artifact.path, artifact.size, self.config.chunk_size)?;
        let count = parts.len();
        info!(job_id = %artifact.job_id, parts = count, chunk_size = self.config.chunk_size, "splitting artifact");

        let mut first_link = None;
        for part in &parts {
            let delivered = part.index - 1;
            self.send_part(channel.as_ref(), request, part)
                .await
                .map(|receipt| {
                    if first_link.is_none() {
                        first_link = receipt.link;
                    }
                })
                .map_err(|error| {
                    warn!(job_id = %artifact.job_id, part = part.index, count, delivered, error = %error, "part upload failed");
                    Failure {
                        error: match error {
                            Error::ChannelRejected(reason) => Error::ChannelRejected(format!(
                                "part {}/{} failed after {} delivered: {}",
                                part.index, count, delivered, reason
                            )),
                            other => other,
                        },
                        parts_delivered: delivered,
                    }
                })?;

            if part.index < count && !self.config.pause_between_parts.is_zero() {
                tokio::time::sleep(self.config.pause_between_parts).await;
            }
        }

        Ok(DeliveryOutcome::Delivered {
            option: request.option,
            link: first_link,
            parts: count,
            size: artifact.size,
        })
    }

    /// Write, upload and remove one part
    async fn send_part(
        &self,
        channel: &dyn DeliveryChannel,
        request: &DeliveryRequest,
        part: &Part,
    ) -> Result<DeliveryReceipt> {
        let artifact = &request.artifact;
        write_part(&artifact.path, part).await?;

        self.phase(
            &artifact.job_id,
            request.option,
            DeliveryPhase::Uploading {
                part: part.index,
                total: part.count,
            },
        );
        let file_name = part
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("part")
            .to_string();
        let file = UploadFile {
            path: &part.path,
            name: &file_name,
            caption: upload_caption(
                &artifact.display_name,
                part.size,
                Some((part.index, part.count)),
            ),
            size: part.size,
            part: part.index,
            parts: part.count,
        };
        let receipt = self.upload_file(channel, request, file).await?;

        if let Err(e) = tokio::fs::remove_file(&part.path).await {
            warn!(path = ?part.path, error = %e, "failed to remove uploaded part");
        }
        debug!(job_id = %artifact.job_id, part = part.index, count = part.count, "part delivered");
        Ok(receipt)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ChannelBehavior, RecordingChannel};
    use std::time::Duration;

    fn artifact(dir: &Path, size: usize) -> DeliveryArtifact {
        let path = dir.join("job1.mp4");
        std::fs::write(&path, vec![7u8; size]).unwrap();
        DeliveryArtifact {
            job_id: JobId::parse("job1").unwrap(),
            path,
            display_name: "Clip.mp4".into(),
            size: size as u64,
            ext: "mp4".into(),
        }
    }

    fn limits() -> DeliveryConfig {
        DeliveryConfig {
            small_limit: 10,
            large_limit: 100,
            chunk_size: 40,
            max_split_total: 1000,
            pause_between_parts: Duration::ZERO,
            ..Default::default()
        }
    }

    fn orchestrator(
        direct: Option<Arc<RecordingChannel>>,
        large: Option<Arc<RecordingChannel>>,
        config: DeliveryConfig,
    ) -> (DeliveryOrchestrator, broadcast::Receiver<Event>) {
        let (tx, rx) = broadcast::channel(256);
        let set = ChannelSet::new(
            direct.map(|c| c as Arc<dyn DeliveryChannel>),
            large.map(|c| c as Arc<dyn DeliveryChannel>),
        );
        (
            DeliveryOrchestrator::new(Arc::new(set), config, "http://relay.example/".into(), tx),
            rx,
        )
    }

    fn request(artifact: DeliveryArtifact, option: DeliveryOption) -> DeliveryRequest {
        DeliveryRequest {
            artifact,
            option,
            target: DeliveryTarget {
                chat_id: "42".into(),
            },
            notifier: None,
        }
    }

    #[tokio::test]
    async fn small_file_goes_direct() {
        let dir = tempfile::tempdir().unwrap();
        let direct = Arc::new(RecordingChannel::new("direct", ChannelBehavior::Accept));
        let (orch, _rx) = orchestrator(Some(direct.clone()), None, limits());

        let outcome = orch
            .deliver(request(artifact(dir.path(), 8), DeliveryOption::Direct))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Delivered {
                option: DeliveryOption::Direct,
                link: None,
                parts: 1,
                size: 8
            }
        );
        assert_eq!(direct.uploads().len(), 1);
        // The artifact itself is kept for later link delivery
        assert!(dir.path().join("job1.mp4").exists());
    }

    #[tokio::test]
    async fn link_option_needs_no_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _rx) = orchestrator(None, None, limits());

        let outcome = orch
            .deliver(request(artifact(dir.path(), 50), DeliveryOption::Link))
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Link {
                url: "http://relay.example/api/download-file/job1".into()
            }
        );
    }

    #[tokio::test]
    async fn unoffered_option_fails_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let direct = Arc::new(RecordingChannel::new("direct", ChannelBehavior::Accept));
        let (orch, _rx) = orchestrator(Some(direct.clone()), None, limits());

        let outcome = orch
            .deliver(request(artifact(dir.path(), 25), DeliveryOption::Direct))
            .await;

        match outcome {
            DeliveryOutcome::Failed { kind, fallback, .. } => {
                assert_eq!(kind, FailureKind::NoViableStrategy);
                assert_eq!(fallback, Some(DeliveryOption::Link));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(direct.uploads().is_empty());
    }

    #[tokio::test]
    async fn split_uploads_in_order_and_removes_each_part() {
        let dir = tempfile::tempdir().unwrap();
        let large = Arc::new(RecordingChannel::new("large", ChannelBehavior::Accept));
        let (orch, _rx) = orchestrator(None, Some(large.clone()), limits());

        let outcome = orch
            .deliver(request(artifact(dir.path(), 105), DeliveryOption::SplitUpload))
            .await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered { parts: 3, size: 105, .. }
        ));
        let uploads = large.uploads();
        let names: Vec<&str> = uploads.iter().map(|u| u.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["job1.part001.mp4", "job1.part002.mp4", "job1.part003.mp4"]
        );
        let sizes: Vec<u64> = uploads.iter().map(|u| u.size).collect();
        assert_eq!(sizes, vec![40, 40, 25]);
        // At each upload only the current part was on disk
        for upload in &uploads {
            assert_eq!(upload.parts_on_disk, vec![upload.file_name.clone()]);
        }
        assert!(!dir.path().join("job1.part003.mp4").exists());
    }

    #[tokio::test]
    async fn split_failure_reports_delivered_parts() {
        let dir = tempfile::tempdir().unwrap();
        let large = Arc::new(RecordingChannel::new(
            "large",
            ChannelBehavior::RejectFrom(2),
        ));
        let (orch, _rx) = orchestrator(None, Some(large.clone()), limits());

        let outcome = orch
            .deliver(request(artifact(dir.path(), 105), DeliveryOption::SplitUpload))
            .await;

        match outcome {
            DeliveryOutcome::Failed {
                kind,
                parts_delivered,
                fallback,
                ..
            } => {
                assert_eq!(kind, FailureKind::Rejected);
                assert_eq!(parts_delivered, 1);
                assert_eq!(fallback, Some(DeliveryOption::Link));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!dir.path().join("job1.part001.mp4").exists());
        assert!(dir.path().join("job1.part002.mp4").exists());
        assert_eq!(large.uploads().len(), 2);
    }

    #[tokio::test]
    async fn generic_part_failure_keeps_its_kind() {
        let dir = tempfile::tempdir().unwrap();
        let large = Arc::new(RecordingChannel::new("large", ChannelBehavior::DropFrom(1)));
        let (orch, _rx) = orchestrator(None, Some(large.clone()), limits());
        let split = orch
            .deliver(request(artifact(dir.path(), 105), DeliveryOption::SplitUpload))
            .await;

        let other_dir = tempfile::tempdir().unwrap();
        let single_channel = Arc::new(RecordingChannel::new("large", ChannelBehavior::DropFrom(1)));
        let (orch, _rx) = orchestrator(None, Some(single_channel), limits());
        let single = orch
            .deliver(request(
                artifact(other_dir.path(), 50),
                DeliveryOption::LargePayload,
            ))
            .await;

        match (split, single) {
            (
                DeliveryOutcome::Failed {
                    kind: split_kind,
                    reason,
                    fallback,
                    parts_delivered,
                },
                DeliveryOutcome::Failed {
                    kind: single_kind, ..
                },
            ) => {
                assert_eq!(split_kind, FailureKind::Other);
                assert_eq!(split_kind, single_kind);
                assert_eq!(reason, "connection reset by peer");
                assert_eq!(parts_delivered, 0);
                assert_eq!(fallback, Some(DeliveryOption::Link));
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }
        assert_eq!(large.uploads().len(), 1);
    }

    #[tokio::test]
    async fn rejected_part_names_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let large = Arc::new(RecordingChannel::new(
            "large",
            ChannelBehavior::RejectFrom(3),
        ));
        let (orch, _rx) = orchestrator(None, Some(large), limits());

        let outcome = orch
            .deliver(request(artifact(dir.path(), 105), DeliveryOption::SplitUpload))
            .await;

        match outcome {
            DeliveryOutcome::Failed {
                kind,
                reason,
                parts_delivered,
                ..
            } => {
                assert_eq!(kind, FailureKind::Rejected);
                assert!(reason.contains("part 3/3 failed after 2 delivered"));
                assert_eq!(parts_delivered, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let large = Arc::new(RecordingChannel::new("large", ChannelBehavior::Hang));
        let config = DeliveryConfig {
            base_timeout: Duration::from_millis(50),
            max_timeout: Duration::from_millis(50),
            ..limits()
        };
        let (orch, mut rx) = orchestrator(None, Some(large), config);

        let outcome = orch
            .deliver(request(artifact(dir.path(), 50), DeliveryOption::LargePayload))
            .await;

        match outcome {
            DeliveryOutcome::Failed { kind, fallback, .. } => {
                assert_eq!(kind, FailureKind::Timeout);
                assert_eq!(fallback, Some(DeliveryOption::Link));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::DeliveryFailed { kind, .. } = event {
                assert_eq!(kind, FailureKind::Timeout);
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn missing_artifact_offers_no_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let direct = Arc::new(RecordingChannel::new("direct", ChannelBehavior::Accept));
        let (orch, _rx) = orchestrator(Some(direct), None, limits());
        let artifact = artifact(dir.path(), 5);
        std::fs::remove_file(&artifact.path).unwrap();

        let outcome = orch
            .deliver(request(artifact, DeliveryOption::Direct))
            .await;
        assert!(matches!(
            outcome,
            DeliveryOutcome::Failed {
                kind: FailureKind::ArtifactMissing,
                fallback: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn upload_progress_reaches_event_stream() {
        let dir = tempfile::tempdir().unwrap();
        let direct = Arc::new(RecordingChannel::new("direct", ChannelBehavior::Accept));
        let (orch, mut rx) = orchestrator(Some(direct), None, limits());

        orch.deliver(request(artifact(dir.path(), 8), DeliveryOption::Direct))
            .await;

        let mut complete = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::UploadProgress { uploaded, total, .. } = event {
                complete |= uploaded == total;
            }
        }
        assert!(complete);
    }
}
