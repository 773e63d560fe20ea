//! `MediaRelay`: the facade the REST API, the chat bot and embedders call
//!
//! Owns the job store, the retrieval runner, the delivery orchestrator and
//! the background sweeper. Cloning is cheap; every field is shared.

use crate::archive::{self, ZipBundle};
use crate::config::Config;
use crate::delivery::{
    ChannelSet, DeliveryOption, DeliveryOrchestrator, DeliveryOutcome, DeliveryRequest,
    DeliveryTarget, FailureKind, StrategyDecision, UploadNotifier,
};
use crate::error::{Error, Result};
use crate::extractor::{self, MediaExtractor};
use crate::retrieval::{self, JobRequest, RetrievalRunner};
use crate::storage;
use crate::store::{InMemoryJobStore, JobStore};
use crate::types::{
    DeliveryArtifact, DirectLink, Event, JobId, JobSnapshot, MediaInfo, PlaylistInfo,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Broadcast buffer; slow subscribers lag rather than block producers
const EVENT_BUFFER: usize = 1000;

/// How long shutdown waits for cancelled jobs to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Result for one URL of a batch submission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchItem {
    /// The submitted URL
    pub url: String,
    /// Job id when accepted
    pub file_id: Option<JobId>,
    /// Why the URL was rejected
    pub error: Option<String>,
}

/// Main service instance (cloneable, all fields shared)
#[derive(Clone)]
pub struct MediaRelay {
    config: Arc<Config>,
    store: Arc<dyn JobStore>,
    extractor: Arc<dyn MediaExtractor>,
    runner: RetrievalRunner,
    orchestrator: Arc<DeliveryOrchestrator>,
    event_tx: broadcast::Sender<Event>,
    active: Arc<Mutex<HashMap<JobId, JoinHandle<()>>>>,
    accepting_new: Arc<AtomicBool>,
    background: CancellationToken,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MediaRelay {
    /// Build the service from configuration
    ///
    /// Picks yt-dlp from the configured path or `PATH`, builds the delivery
    /// channels from the chat settings and starts the age-based sweeper.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let extractor = extractor::select_extractor(&config.extractor);
        let channels = ChannelSet::from_config(&config.telegram);
        Self::with_components(config, extractor, channels).await
    }

    /// Build the service around explicit collaborators
    pub async fn with_components(
        config: Config,
        extractor: Arc<dyn MediaExtractor>,
        channels: ChannelSet,
    ) -> Result<Self> {
        let downloads_dir = &config.storage.downloads_dir;
        storage::ensure_dir(downloads_dir).await.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to create downloads directory '{}': {}",
                downloads_dir.display(),
                e
            )))
        })?;

        let (event_tx, _rx) = broadcast::channel(EVENT_BUFFER);
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let runner = RetrievalRunner::new(
            extractor.clone(),
            store.clone(),
            downloads_dir.clone(),
            event_tx.clone(),
        );
        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            Arc::new(channels),
            config.delivery.clone(),
            config.telegram.public_base_url.clone(),
            event_tx.clone(),
        ));

        let background = CancellationToken::new();
        let sweeper = storage::spawn_sweeper(
            downloads_dir.clone(),
            storage::validity(config.storage.file_validity_days),
            config.storage.sweep_interval,
            background.child_token(),
        );

        info!(
            downloads_dir = %downloads_dir.display(),
            extractor = extractor.name(),
            "media relay ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            extractor,
            runner,
            orchestrator,
            event_tx,
            active: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            background,
            sweeper: Arc::new(Mutex::new(Some(sweeper))),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory artifacts land in
    pub fn downloads_dir(&self) -> &Path {
        &self.config.storage.downloads_dir
    }

    /// The job store, for read-only consumers
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Subscribe to job and delivery events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Submit a retrieval; returns the job id before any network I/O
    ///
    /// When `clear_before_new_job` is set every file of earlier jobs is
    /// removed first.
    pub async fn submit(&self, url: &str, format: Option<&str>) -> Result<JobId> {
        let request = self.prepare(url, format)?;
        if self.config.storage.clear_before_new_job {
            self.clear_downloads().await;
        }
        Ok(self.launch(request).await)
    }

    /// Submit several URLs; one result per URL in input order
    ///
    /// The downloads directory is cleared at most once, before the first job.
    pub async fn submit_batch(
        &self,
        urls: &[String],
        format: Option<&str>,
    ) -> Result<Vec<BatchItem>> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let prepared: Vec<(String, Result<JobRequest>)> = urls
            .iter()
            .map(|url| (url.clone(), self.prepare(url, format)))
            .collect();

        if self.config.storage.clear_before_new_job && prepared.iter().any(|(_, r)| r.is_ok()) {
            self.clear_downloads().await;
        }

        let mut items = Vec::with_capacity(prepared.len());
        for (url, request) in prepared {
            items.push(match request {
                Ok(request) => BatchItem {
                    url,
                    file_id: Some(self.launch(request).await),
                    error: None,
                },
                Err(e) => BatchItem {
                    url,
                    file_id: None,
                    error: Some(e.to_string()),
                },
            });
        }
        info!(
            submitted = items.iter().filter(|i| i.file_id.is_some()).count(),
            rejected = items.iter().filter(|i| i.error.is_some()).count(),
            "batch submitted"
        );
        Ok(items)
    }

    fn prepare(&self, url: &str, format: Option<&str>) -> Result<JobRequest> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let url = retrieval::validate_url(url)?;
        if let Some(format) = format {
            retrieval::validate_format(format)?;
        }
        Ok(JobRequest {
            id: JobId::generate(),
            url: url.to_string(),
            format: format.map(str::to_string),
        })
    }

    async fn clear_downloads(&self) {
        match storage::clear_all(self.downloads_dir()).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "cleared downloads before new job"),
            Err(e) => warn!(error = %e, "failed to clear downloads before new job"),
        }
    }

    async fn launch(&self, request: JobRequest) -> JobId {
        let handle = self.runner.start(request);
        let mut active = self.active.lock().await;
        active.retain(|_, task| !task.is_finished());
        active.insert(handle.id.clone(), handle.task);
        handle.id
    }

    /// Current snapshot, or the `unknown` sentinel
    pub fn progress(&self, id: &JobId) -> JobSnapshot {
        self.store.get(id)
    }

    /// Request cancellation; returns whether the job existed
    pub fn cancel(&self, id: &JobId) -> bool {
        let existed = self.store.cancel(id);
        if existed {
            info!(job_id = %id, "cancellation requested");
        }
        existed
    }

    /// The finished artifact of a completed job
    pub async fn artifact(&self, id: &JobId) -> Result<DeliveryArtifact> {
        retrieval::resolve_artifact(self.store.as_ref(), self.downloads_dir(), id).await
    }

    /// Any file served under `id`: a job's artifact or a bundle
    pub async fn file_path(&self, id: &JobId) -> Result<PathBuf> {
        storage::find_by_prefix(self.downloads_dir(), id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {id}")))
    }

    /// Delivery options on offer for a completed job
    pub async fn delivery_options(&self, id: &JobId) -> Result<StrategyDecision> {
        let artifact = self.artifact(id).await?;
        Ok(self.orchestrator.decide(artifact.size).await)
    }

    /// Deliver a completed job's artifact with the chosen option
    ///
    /// Unknown or unfinished jobs are errors; a vanished artifact is a
    /// terminal failure outcome like any other delivery failure.
    pub async fn deliver(
        &self,
        id: &JobId,
        option: DeliveryOption,
        target: DeliveryTarget,
        notifier: Option<Arc<dyn UploadNotifier>>,
    ) -> Result<DeliveryOutcome> {
        let artifact = match self.artifact(id).await {
            Ok(artifact) => artifact,
            Err(e @ Error::ArtifactMissing { .. }) => {
                warn!(job_id = %id, error = %e, "artifact vanished before delivery");
                return Ok(DeliveryOutcome::Failed {
                    kind: FailureKind::ArtifactMissing,
                    reason: e.to_string(),
                    fallback: None,
                    parts_delivered: 0,
                });
            }
            Err(e) => return Err(e),
        };

        Ok(self
            .orchestrator
            .deliver(DeliveryRequest {
                artifact,
                option,
                target,
                notifier,
            })
            .await)
    }

    /// Retrievable link for `id`
    pub fn link_for(&self, id: &JobId) -> String {
        self.orchestrator.link_for(id)
    }

    /// Metadata and selectable formats of `url`
    pub async fn media_info(&self, url: &str) -> Result<MediaInfo> {
        let url = retrieval::validate_url(url)?;
        extractor::media_info(self.extractor.as_ref(), url.as_str()).await
    }

    /// Flat listing of a playlist URL
    pub async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo> {
        let url = retrieval::validate_url(url)?;
        extractor::playlist_info(self.extractor.as_ref(), url.as_str()).await
    }

    /// Direct stream URL, resolved without downloading
    pub async fn direct_link(&self, url: &str, format: Option<&str>) -> Result<DirectLink> {
        let url = retrieval::validate_url(url)?;
        if let Some(format) = format {
            retrieval::validate_format(format)?;
        }
        self.extractor.direct_link(url.as_str(), format).await
    }

    /// Bundle the artifacts of `ids` into one zip
    pub async fn create_zip(&self, ids: &[String]) -> Result<ZipBundle> {
        archive::create_zip(self.downloads_dir(), ids).await
    }

    /// Run the age-based sweep now; returns the number of files removed
    pub async fn cleanup(&self) -> Result<usize> {
        storage::sweep_older_than(
            self.downloads_dir(),
            storage::validity(self.config.storage.file_validity_days),
        )
        .await
    }

    /// Stop accepting jobs, cancel running ones and stop background tasks
    pub async fn shutdown(&self) -> Result<()> {
        info!("initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        let tasks: Vec<(JobId, JoinHandle<()>)> = self.active.lock().await.drain().collect();
        for (id, task) in &tasks {
            if !task.is_finished() {
                self.store.cancel(id);
            }
        }

        let wait = async {
            for (id, task) in tasks {
                if let Err(e) = task.await {
                    warn!(job_id = %id, error = %e, "job task ended abnormally");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, wait).await.is_err() {
            warn!("timed out waiting for jobs to stop, proceeding with shutdown");
        }

        self.background.cancel();
        if let Some(sweeper) = self.sweeper.lock().await.take()
            && let Err(e) = sweeper.await
        {
            warn!(error = %e, "sweeper ended abnormally");
        }

        self.event_tx.send(Event::Shutdown).ok();
        info!("shutdown complete");
        Ok(())
    }

    /// Token cancelled when [`shutdown`](Self::shutdown) stops background work
    pub fn shutdown_token(&self) -> CancellationToken {
        self.background.clone()
    }
}
