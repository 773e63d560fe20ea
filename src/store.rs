//! Job store: the single source of truth for progress polling and cancellation
//!
//! Each job has exactly one writer (its retrieval task). Other callers may only
//! read snapshots or request cancellation, and cancellation is write-once.

use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::types::{JobId, JobSnapshot, JobStatus, JobUpdate};

/// Storage for job state, shared by the retrieval runner, the API and the bot
pub trait JobStore: Send + Sync {
    /// Insert a fresh `starting` record, superseding any previous one with the same id
    ///
    /// Returns the token the retrieval task must watch for cancellation.
    fn create(&self, id: &JobId) -> CancellationToken;

    /// Merge `update` into the record
    ///
    /// Returns `false` when the job is unknown or already terminal, in which
    /// case nothing changes.
    fn update(&self, id: &JobId, update: JobUpdate) -> bool;

    /// Current snapshot, or the `unknown` sentinel
    fn get(&self, id: &JobId) -> JobSnapshot;

    /// Whether a record exists for `id`
    fn contains(&self, id: &JobId) -> bool;

    /// Request cancellation; returns whether the job existed
    fn cancel(&self, id: &JobId) -> bool;

    /// Number of records held
    fn len(&self) -> usize;

    /// Whether the store holds no records
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct JobRecord {
    snapshot: JobSnapshot,
    cancel: CancellationToken,
}

/// In-memory [`JobStore`]; records live for the process lifetime
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, id: &JobId) -> CancellationToken {
        let token = CancellationToken::new();
        let record = JobRecord {
            snapshot: JobSnapshot::starting(),
            cancel: token.clone(),
        };
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = jobs.insert(id.clone(), record) {
            // A superseded record must not keep a task running unobserved
            previous.cancel.cancel();
        }
        token
    }

    fn update(&self, id: &JobId, update: JobUpdate) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.get_mut(id) {
            Some(record) if !record.snapshot.status.is_terminal() => {
                update.apply_to(&mut record.snapshot);
                true
            }
            _ => false,
        }
    }

    fn get(&self, id: &JobId) -> JobSnapshot {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(id)
            .map(|record| record.snapshot.clone())
            .unwrap_or_else(JobSnapshot::unknown)
    }

    fn contains(&self, id: &JobId) -> bool {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.contains_key(id)
    }

    fn cancel(&self, id: &JobId) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = jobs.get_mut(id) else {
            return false;
        };
        if !record.snapshot.status.is_terminal() {
            record.snapshot.cancelled = true;
            record.cancel.cancel();
        }
        true
    }

    fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Convenience: is the job in a state where its artifact can be delivered
pub fn is_deliverable(store: &dyn JobStore, id: &JobId) -> bool {
    store.get(id).status == JobStatus::Completed
}
