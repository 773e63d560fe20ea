//! Core types for media-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

use crate::delivery::{DeliveryOption, DeliveryPhase, FailureKind};
use crate::error::{Error, Result};

/// Opaque identifier of a retrieval job
///
/// Job identifiers double as the filename prefix of every file a job writes,
/// so only ASCII alphanumerics, `-` and `_` are accepted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh, never-reused identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied identifier
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > 128 {
            return Err(Error::Validation(format!(
                "job id must be 1-128 characters, got {}",
                raw.len()
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Validation(format!(
                "job id {raw:?} contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a retrieval job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, no bytes reported yet
    Starting,
    /// Bytes are arriving
    Downloading,
    /// The extractor finished writing, result not yet resolved
    Finished,
    /// Artifact is on disk and ready for delivery
    Completed,
    /// Retrieval failed
    Error,
    /// Cancelled by a caller
    Cancelled,
    /// Sentinel returned when polling an id the store does not know
    Unknown,
}

impl JobStatus {
    /// Whether the job can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

/// Point-in-time view of a job, as returned by progress polling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobSnapshot {
    /// Current state
    pub status: JobStatus,
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Total bytes, zero while unknown
    pub total_bytes: u64,
    /// Derived completion percentage (0.0 to 100.0)
    pub percentage: f64,
    /// Instantaneous speed in bytes per second
    pub speed: f64,
    /// Estimated seconds remaining
    pub eta: u64,
    /// Display filename (title + extension), set once completed
    pub filename: String,
    /// File extension of the artifact
    pub ext: String,
    /// Final size on disk, set once completed
    pub filesize: u64,
    /// Whether cancellation was requested
    pub cancelled: bool,
    /// Failure reason for `error` and `cancelled` jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Fresh record for a newly submitted job
    pub fn starting() -> Self {
        Self {
            status: JobStatus::Starting,
            downloaded_bytes: 0,
            total_bytes: 0,
            percentage: 0.0,
            speed: 0.0,
            eta: 0,
            filename: String::new(),
            ext: "mp4".to_string(),
            filesize: 0,
            cancelled: false,
            error: None,
        }
    }

    /// Snapshot returned for ids the store has never seen
    pub fn unknown() -> Self {
        Self {
            status: JobStatus::Unknown,
            ..Self::starting()
        }
    }
}

/// Partial update merged into a [`JobSnapshot`] field by field
///
/// `None` leaves the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub percentage: Option<f64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
    pub filename: Option<String>,
    pub ext: Option<String>,
    pub filesize: Option<u64>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// A progress sample while bytes are arriving
    pub fn downloading(downloaded: u64, total: u64, speed: f64, eta: u64) -> Self {
        Self {
            status: Some(JobStatus::Downloading),
            downloaded_bytes: Some(downloaded),
            total_bytes: Some(total),
            percentage: Some(percentage_of(downloaded, total)),
            speed: Some(speed),
            eta: Some(eta),
            ..Default::default()
        }
    }

    /// The extractor reported that it finished writing
    pub fn finished() -> Self {
        Self {
            status: Some(JobStatus::Finished),
            ..Default::default()
        }
    }

    /// Final result of a successful retrieval
    pub fn completed(filename: String, ext: String, filesize: u64) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            filename: Some(filename),
            ext: Some(ext),
            filesize: Some(filesize),
            percentage: Some(100.0),
            ..Default::default()
        }
    }

    /// Terminal failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Terminal cancellation
    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            error: Some("Download cancelled".to_string()),
            ..Default::default()
        }
    }

    /// Merge into a snapshot, last write wins per field
    pub fn apply_to(self, snapshot: &mut JobSnapshot) {
        if let Some(v) = self.status {
            snapshot.status = v;
        }
        if let Some(v) = self.downloaded_bytes {
            snapshot.downloaded_bytes = v;
        }
        if let Some(v) = self.total_bytes {
            snapshot.total_bytes = v;
        }
        if let Some(v) = self.percentage {
            snapshot.percentage = v;
        }
        if let Some(v) = self.speed {
            snapshot.speed = v;
        }
        if let Some(v) = self.eta {
            snapshot.eta = v;
        }
        if let Some(v) = self.filename {
            snapshot.filename = v;
        }
        if let Some(v) = self.ext {
            snapshot.ext = v;
        }
        if let Some(v) = self.filesize {
            snapshot.filesize = v;
        }
        if let Some(v) = self.error {
            snapshot.error = Some(v);
        }
    }
}

/// `downloaded * 100 / max(total, 1)`, clamped to 100
pub fn percentage_of(downloaded: u64, total: u64) -> f64 {
    let pct = downloaded as f64 * 100.0 / total.max(1) as f64;
    pct.clamp(0.0, 100.0)
}

/// Finished output of a completed job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryArtifact {
    /// Owning job
    pub job_id: JobId,
    /// Absolute path on disk
    #[schema(value_type = String)]
    pub path: PathBuf,
    /// Human-facing name (title + extension)
    pub display_name: String,
    /// Size in bytes
    pub size: u64,
    /// File extension without the dot
    pub ext: String,
}

/// Metadata about a remote media item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaInfo {
    /// Media title
    pub title: String,
    /// Thumbnail URL (empty when unavailable)
    pub thumbnail: String,
    /// Duration in seconds
    pub duration: u64,
    /// Selectable formats, best first
    pub formats: Vec<FormatInfo>,
}

/// One selectable format of a media item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FormatInfo {
    /// Extractor format identifier, passed back as the format selector
    pub format_id: String,
    /// Quality label (format note)
    pub quality: String,
    /// `WxH`, `Hp`, `audio only` or `unknown`
    pub resolution: String,
    /// Container extension
    pub ext: String,
    /// Exact or approximate size in bytes, zero when unknown
    pub filesize: u64,
    /// Frames per second
    pub fps: Option<f64>,
    /// Video codec
    pub vcodec: Option<String>,
    /// Audio codec
    pub acodec: Option<String>,
    /// Whether the format carries video
    pub has_video: bool,
    /// Whether the format carries audio
    pub has_audio: bool,
    /// Video height in pixels
    pub height: Option<u32>,
}

/// Flat listing of a playlist (or a single video presented as one)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlaylistInfo {
    /// Whether the URL pointed at a playlist
    pub is_playlist: bool,
    /// Playlist (or video) title
    pub title: String,
    /// Number of entries, only set for playlists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_count: Option<usize>,
    /// Entries in playlist order
    pub videos: Vec<PlaylistEntry>,
}

/// One entry of a [`PlaylistInfo`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlaylistEntry {
    /// Extractor-specific video id
    pub id: Option<String>,
    /// Title
    pub title: String,
    /// Watch URL
    pub url: String,
    /// Thumbnail URL
    pub thumbnail: String,
    /// Duration in seconds
    pub duration: u64,
}

/// A stream URL resolved without downloading
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DirectLink {
    /// Direct media URL
    pub direct_url: String,
    /// Media title
    pub title: String,
    /// Container extension
    pub ext: String,
}

/// Event broadcast to subscribers (SSE, bot, embedders)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A retrieval job was accepted
    JobQueued {
        /// Job id
        id: JobId,
        /// Source URL
        url: String,
    },

    /// Progress sample of a running retrieval
    JobProgress {
        /// Job id
        id: JobId,
        /// Percentage (0.0 to 100.0)
        percentage: f64,
        /// Bytes written so far
        downloaded_bytes: u64,
        /// Total bytes (zero while unknown)
        total_bytes: u64,
        /// Bytes per second
        speed: f64,
    },

    /// Retrieval completed
    JobCompleted {
        /// Job id
        id: JobId,
        /// Display filename
        filename: String,
        /// Size in bytes
        filesize: u64,
    },

    /// Retrieval failed
    JobFailed {
        /// Job id
        id: JobId,
        /// Failure reason
        error: String,
    },

    /// Retrieval was cancelled
    JobCancelled {
        /// Job id
        id: JobId,
    },

    /// Delivery moved to a new phase
    DeliveryPhaseChanged {
        /// Job id
        id: JobId,
        /// Chosen option
        option: DeliveryOption,
        /// New phase
        phase: DeliveryPhase,
    },

    /// Throttled upload progress
    UploadProgress {
        /// Job id
        id: JobId,
        /// Bytes uploaded of the current file
        uploaded: u64,
        /// Size of the current file
        total: u64,
        /// Percentage (0.0 to 100.0)
        percentage: f64,
    },

    /// Delivery succeeded
    DeliveryComplete {
        /// Job id
        id: JobId,
        /// Destination reference, when the channel produced one
        #[serde(skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },

    /// Delivery failed
    DeliveryFailed {
        /// Job id
        id: JobId,
        /// Failure class
        kind: FailureKind,
        /// Human-readable reason
        reason: String,
    },

    /// Service is shutting down
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_parse_back() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert_eq!(JobId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn job_id_rejects_path_characters() {
        assert!(JobId::parse("../etc/passwd").is_err());
        assert!(JobId::parse("a/b").is_err());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("job_42-x").is_ok());
    }

    #[test]
    fn percentage_never_divides_by_zero() {
        assert_eq!(percentage_of(0, 0), 0.0);
        assert_eq!(percentage_of(5, 0), 100.0);
        assert_eq!(percentage_of(50, 200), 25.0);
    }

    #[test]
    fn percentage_is_clamped_when_estimate_is_low() {
        assert_eq!(percentage_of(300, 200), 100.0);
    }

    #[test]
    fn update_merges_only_present_fields() {
        let mut snap = JobSnapshot::starting();
        JobUpdate::downloading(10, 100, 5.0, 18).apply_to(&mut snap);
        JobUpdate::completed("clip.webm".into(), "webm".into(), 100).apply_to(&mut snap);

        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.downloaded_bytes, 10);
        assert_eq!(snap.speed, 5.0);
        assert_eq!(snap.percentage, 100.0);
        assert_eq!(snap.ext, "webm");
        assert_eq!(snap.filesize, 100);
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Finished.is_terminal());
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn snapshot_serializes_lowercase_status() {
        let json = serde_json::to_value(JobSnapshot::unknown()).unwrap();
        assert_eq!(json["status"], "unknown");
        assert!(json.get("error").is_none());
    }
}
