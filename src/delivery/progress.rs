//! Upload progress reporting
//!
//! Channels report `(uploaded, total)` through a [`ProgressSink`] from
//! whatever context their native callback runs in; the sink never blocks.
//! A dedicated notifier task owns the [`ProgressTracker`] and decides which
//! samples become user-visible notifications.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const MIN_ELAPSED_FOR_SPEED: Duration = Duration::from_secs(1);

/// Progress of one upload at one instant
#[derive(Clone, Debug, PartialEq)]
pub struct UploadSnapshot {
    /// Bytes sent
    pub uploaded: u64,
    /// Bytes to send
    pub total: u64,
    /// 0.0 to 100.0
    pub percentage: f64,
    /// Bytes per second; `None` while still calculating
    pub speed: Option<f64>,
    /// Seconds remaining; `None` while speed is unknown
    pub eta: Option<u64>,
    /// Time since the first non-zero sample
    pub elapsed: Duration,
    /// Current part (1 when unsplit)
    pub part: usize,
    /// Number of parts (1 when unsplit)
    pub parts: usize,
}

impl UploadSnapshot {
    /// Whether every byte has been sent
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.uploaded >= self.total
    }
}

/// Throttling state of one upload
///
/// Pure: every decision takes `now` explicitly.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    created: Instant,
    started: Option<Instant>,
    last_notified: Option<Instant>,
    last_bucket: u64,
    last_uploaded: Option<u64>,
    tail_notified: bool,
    complete: bool,
    part: usize,
    parts: usize,
}

impl ProgressTracker {
    /// Tracker emitting at least every `interval` while samples arrive
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            created: now,
            started: None,
            last_notified: None,
            last_bucket: 0,
            last_uploaded: None,
            tail_notified: false,
            complete: false,
            part: 1,
            parts: 1,
        }
    }

    /// Label snapshots with a part position
    pub fn for_part(mut self, part: usize, parts: usize) -> Self {
        self.part = part;
        self.parts = parts;
        self
    }

    /// Derive speed and ETA without changing throttling state
    pub fn snapshot(&self, uploaded: u64, total: u64, now: Instant) -> UploadSnapshot {
        let percentage = if total == 0 {
            0.0
        } else {
            (uploaded as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
        };
        let elapsed = self
            .started
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();

        let speed = (elapsed >= MIN_ELAPSED_FOR_SPEED)
            .then(|| uploaded as f64 / elapsed.as_secs_f64());
        let eta = speed
            .filter(|s| *s > 0.0)
            .map(|s| (total.saturating_sub(uploaded) as f64 / s).round() as u64);

        UploadSnapshot {
            uploaded,
            total,
            percentage,
            speed,
            eta,
            elapsed,
            part: self.part,
            parts: self.parts,
        }
    }

    /// Feed one sample; returns a snapshot when it should be shown
    ///
    /// A sample is shown when `interval` has passed since the last
    /// notification, when it crosses a 10% boundary, the first time it
    /// reaches 99%, or when the upload completes.
    pub fn observe(&mut self, uploaded: u64, total: u64, now: Instant) -> Option<UploadSnapshot> {
        if self.complete {
            return None;
        }
        if self.started.is_none() && uploaded > 0 {
            self.started = Some(now);
        }

        let snapshot = self.snapshot(uploaded, total, now);
        let bucket = (snapshot.percentage / 10.0).floor() as u64;
        let since = now.saturating_duration_since(self.last_notified.unwrap_or(self.created));

        let due = since >= self.interval;
        let crossed = bucket > self.last_bucket;
        let tail = snapshot.percentage >= 99.0 && !self.tail_notified;
        let complete = snapshot.is_complete();

        if !(due || crossed || tail || complete) {
            return None;
        }
        self.mark(&snapshot, bucket, now);
        Some(snapshot)
    }

    /// Final snapshot for the last seen sample, unless it was already shown
    pub fn flush(&mut self, uploaded: u64, total: u64, now: Instant) -> Option<UploadSnapshot> {
        if self.complete || self.last_uploaded == Some(uploaded) {
            return None;
        }
        if self.started.is_none() && uploaded > 0 {
            self.started = Some(now);
        }
        let snapshot = self.snapshot(uploaded, total, now);
        let bucket = (snapshot.percentage / 10.0).floor() as u64;
        self.mark(&snapshot, bucket, now);
        Some(snapshot)
    }

    fn mark(&mut self, snapshot: &UploadSnapshot, bucket: u64, now: Instant) {
        self.last_notified = Some(now);
        self.last_bucket = bucket;
        self.last_uploaded = Some(snapshot.uploaded);
        self.tail_notified |= snapshot.percentage >= 99.0;
        self.complete = snapshot.is_complete();
    }
}

/// Receiver of throttled upload notifications
#[async_trait]
pub trait UploadNotifier: Send + Sync {
    /// Show `snapshot` to whoever is watching
    async fn notify(&self, snapshot: &UploadSnapshot);
}

/// Non-blocking entry point for a channel's progress callback
///
/// Keeps only the latest sample; the notifier task picks it up when it
/// gets to run.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Arc<watch::Sender<Option<(u64, u64)>>>,
}

impl ProgressSink {
    /// Record a sample
    pub fn report(&self, uploaded: u64, total: u64) {
        self.tx.send_replace(Some((uploaded, total)));
    }

    /// A sink nobody listens to
    pub fn detached() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    #[cfg(test)]
    pub(crate) fn from_sender(tx: watch::Sender<Option<(u64, u64)>>) -> Self {
        Self { tx: Arc::new(tx) }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("latest", &*self.tx.borrow())
            .finish()
    }
}

/// A running notifier task for one upload
pub struct UploadReporter {
    sink: ProgressSink,
    done: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl UploadReporter {
    /// Start the notifier task
    pub fn spawn(mut tracker: ProgressTracker, notifiers: Vec<Arc<dyn UploadNotifier>>) -> Self {
        let (tx, mut rx) = watch::channel::<Option<(u64, u64)>>(None);
        let done = CancellationToken::new();
        let stop = done.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let sample = *rx.borrow_and_update();
                        if let Some((uploaded, total)) = sample
                            && let Some(snapshot) = tracker.observe(uploaded, total, Instant::now())
                        {
                            for notifier in &notifiers {
                                notifier.notify(&snapshot).await;
                            }
                        }
                    }
                    _ = stop.cancelled() => break,
                }
            }

            let last = *rx.borrow();
            if let Some((uploaded, total)) = last
                && let Some(snapshot) = tracker.flush(uploaded, total, Instant::now())
            {
                for notifier in &notifiers {
                    notifier.notify(&snapshot).await;
                }
            }
        });

        Self {
            sink: ProgressSink { tx: Arc::new(tx) },
            done,
            task,
        }
    }

    /// Sink to hand to the delivery channel
    pub fn sink(&self) -> ProgressSink {
        self.sink.clone()
    }

    /// Stop the task after flushing the last sample
    pub async fn finish(self) {
        self.done.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "upload notifier task failed");
        }
    }
}
