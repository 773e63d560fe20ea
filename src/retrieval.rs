//! Retrieval runner: one background task per job
//!
//! The task owns the job's record in the [`JobStore`]. Progress flows from the
//! extractor through [`StoreHook`], which is also where cancellation is
//! observed. Failures never escape the task: they end as a terminal record.

use crate::error::{Error, Result};
use crate::extractor::{MediaExtractor, ProgressHook, ProgressSample, RetrievalRequest};
use crate::storage;
use crate::store::JobStore;
use crate::types::{DeliveryArtifact, Event, JobId, JobStatus, JobUpdate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_FORMAT_LEN: usize = 256;

/// Reject anything but absolute http(s) URLs
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| Error::Validation(format!("invalid URL {raw:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Validation(format!(
                "unsupported URL scheme {other:?}, expected http or https"
            )));
        }
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::Validation(format!("URL {raw:?} has no host")));
    }
    Ok(parsed)
}

/// Reject selectors that could not be a yt-dlp format expression
pub fn validate_format(format: &str) -> Result<()> {
    if format.is_empty() || format.len() > MAX_FORMAT_LEN {
        return Err(Error::Validation(format!(
            "format selector must be 1-{MAX_FORMAT_LEN} characters"
        )));
    }
    if format.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Validation(format!(
            "format selector {format:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}

/// A retrieval to run
#[derive(Clone, Debug)]
pub struct JobRequest {
    /// Job identifier
    pub id: JobId,
    /// Source URL
    pub url: String,
    /// Format selector
    pub format: Option<String>,
}

/// Handle to a started job
#[derive(Debug)]
pub struct JobHandle {
    /// Job identifier, returned to the caller immediately
    pub id: JobId,
    /// The background task; dropping it does not stop the job
    pub task: JoinHandle<()>,
}

/// Progress hook that writes samples into the job store
///
/// Byte counts are offset by the sizes of files the extractor already
/// finished (separate video and audio streams) so readers observe a
/// non-decreasing `downloaded_bytes`.
struct StoreHook {
    id: JobId,
    store: Arc<dyn JobStore>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
    completed_files_bytes: AtomicU64,
    current_file_bytes: AtomicU64,
    high_water: AtomicU64,
}

impl ProgressHook for StoreHook {
    fn on_progress(&self, sample: &ProgressSample) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let base = self.completed_files_bytes.load(Ordering::Acquire);
        let file_total = sample.best_total().max(sample.downloaded);
        self.current_file_bytes.store(file_total, Ordering::Release);

        let reported = base + sample.downloaded;
        let previous = self.high_water.fetch_max(reported, Ordering::AcqRel);
        let downloaded = previous.max(reported);
        let total = if sample.best_total() == 0 {
            0
        } else {
            (base + file_total).max(downloaded)
        };

        let update = JobUpdate::downloading(
            downloaded,
            total,
            sample.speed.unwrap_or(0.0),
            sample.eta.unwrap_or(0),
        );
        let percentage = update.percentage.unwrap_or(0.0);
        self.store.update(&self.id, update);

        self.event_tx
            .send(Event::JobProgress {
                id: self.id.clone(),
                percentage,
                downloaded_bytes: downloaded,
                total_bytes: total,
                speed: sample.speed.unwrap_or(0.0),
            })
            .ok();
        Ok(())
    }

    fn on_finished(&self) {
        let finished = self.current_file_bytes.swap(0, Ordering::AcqRel);
        self.completed_files_bytes
            .fetch_add(finished, Ordering::AcqRel);
        self.store.update(&self.id, JobUpdate::finished());
        debug!(job_id = %self.id, file_bytes = finished, "extractor finished a file");
    }
}

/// Runs retrieval jobs on background tasks
#[derive(Clone)]
pub struct RetrievalRunner {
    extractor: Arc<dyn MediaExtractor>,
    store: Arc<dyn JobStore>,
    downloads_dir: PathBuf,
    event_tx: broadcast::Sender<Event>,
}

impl RetrievalRunner {
    /// Create a runner writing into `downloads_dir`
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        store: Arc<dyn JobStore>,
        downloads_dir: PathBuf,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            extractor,
            store,
            downloads_dir,
            event_tx,
        }
    }

    /// Record the job as `starting` and run it in the background
    ///
    /// Returns before any network I/O happens.
    pub fn start(&self, request: JobRequest) -> JobHandle {
        let cancel = self.store.create(&request.id);
        self.event_tx
            .send(Event::JobQueued {
                id: request.id.clone(),
                url: request.url.clone(),
            })
            .ok();

        let id = request.id.clone();
        let runner = self.clone();
        let task = tokio::spawn(async move { runner.run(request, cancel).await });
        JobHandle { id, task }
    }

    async fn run(&self, request: JobRequest, cancel: CancellationToken) {
        let JobRequest { id, url, format } = request;
        info!(job_id = %id, url = %url, format = ?format, extractor = self.extractor.name(), "retrieval started");

        let hook = StoreHook {
            id: id.clone(),
            store: self.store.clone(),
            cancel: cancel.clone(),
            event_tx: self.event_tx.clone(),
            completed_files_bytes: AtomicU64::new(0),
            current_file_bytes: AtomicU64::new(0),
            high_water: AtomicU64::new(0),
        };
        let retrieval = RetrievalRequest {
            url,
            format,
            output_dir: self.downloads_dir.clone(),
            file_stem: id.to_string(),
        };

        let result = match storage::ensure_dir(&self.downloads_dir).await {
            Ok(()) => self.retrieve(&id, &retrieval, &hook, &cancel).await,
            Err(e) => Err(e),
        };

        match result {
            Ok((filename, ext, filesize)) => {
                info!(job_id = %id, filename = %filename, size_bytes = filesize, "retrieval completed");
                self.store
                    .update(&id, JobUpdate::completed(filename.clone(), ext, filesize));
                self.event_tx
                    .send(Event::JobCompleted {
                        id,
                        filename,
                        filesize,
                    })
                    .ok();
            }
            Err(e) => self.fail(&id, e, &cancel).await,
        }
    }

    async fn retrieve(
        &self,
        id: &JobId,
        request: &RetrievalRequest,
        hook: &StoreHook,
        cancel: &CancellationToken,
    ) -> Result<(String, String, u64)> {
        let outcome = self.extractor.retrieve(request, hook, cancel).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let path = resolve_output(&self.downloads_dir, id, outcome.path.as_deref(), &outcome.ext)
            .await?;
        let filesize = tokio::fs::metadata(&path).await?.len();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(&outcome.ext)
            .to_string();
        Ok((format!("{}.{}", outcome.title, ext), ext, filesize))
    }

    async fn fail(&self, id: &JobId, error: Error, cancel: &CancellationToken) {
        match storage::remove_with_prefix(&self.downloads_dir, id).await {
            Ok(removed) if removed > 0 => {
                debug!(job_id = %id, removed, "removed partial output");
            }
            Ok(_) => {}
            Err(e) => warn!(job_id = %id, error = %e, "failed to remove partial output"),
        }

        if cancel.is_cancelled() || matches!(error, Error::Cancelled) {
            info!(job_id = %id, "retrieval cancelled");
            self.store.update(id, JobUpdate::cancelled());
            self.event_tx
                .send(Event::JobCancelled { id: id.clone() })
                .ok();
        } else {
            warn!(job_id = %id, error = %error, "retrieval failed");
            let message = error.to_string();
            self.store.update(id, JobUpdate::failed(message.clone()));
            self.event_tx
                .send(Event::JobFailed {
                    id: id.clone(),
                    error: message,
                })
                .ok();
        }
    }
}

/// Find the file the extractor produced
///
/// Tries the reported path, then `<id>.<ext>`, then any non-transient file
/// owned by the job (the container may differ after merging).
async fn resolve_output(
    dir: &Path,
    id: &JobId,
    reported: Option<&Path>,
    ext: &str,
) -> Result<PathBuf> {
    if let Some(path) = reported
        && tokio::fs::try_exists(path).await.unwrap_or(false)
    {
        return Ok(path.to_path_buf());
    }
    let expected = dir.join(format!("{id}.{ext}"));
    if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
        return Ok(expected);
    }
    storage::find_by_prefix(dir, id.as_str())
        .await?
        .ok_or(Error::ArtifactMissing { path: expected })
}

/// Resolve the artifact of a completed job
///
/// Fails with [`Error::NotFound`] for unknown jobs, [`Error::Validation`]
/// for jobs that have not completed, and [`Error::ArtifactMissing`] when the
/// file is gone (typically swept or cleared by a newer job).
pub async fn resolve_artifact(
    store: &dyn JobStore,
    downloads_dir: &Path,
    id: &JobId,
) -> Result<DeliveryArtifact> {
    let snapshot = store.get(id);
    match snapshot.status {
        JobStatus::Completed => {}
        JobStatus::Unknown => return Err(Error::NotFound(format!("job {id}"))),
        other => {
            return Err(Error::Validation(format!(
                "job {id} is {} and has no artifact yet",
                serde_json::to_value(other)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default()
            )));
        }
    }

    let path = storage::find_by_prefix(downloads_dir, id.as_str())
        .await?
        .ok_or_else(|| Error::ArtifactMissing {
            path: downloads_dir.join(format!("{id}.{}", snapshot.ext)),
        })?;
    let metadata = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::ArtifactMissing { path: path.clone() },
        _ => Error::Io(e),
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(&snapshot.ext)
        .to_string();

    Ok(DeliveryArtifact {
        job_id: id.clone(),
        display_name: if snapshot.filename.is_empty() {
            format!("{id}.{ext}")
        } else {
            snapshot.filename
        },
        path,
        size: metadata.len(),
        ext,
    })
}
