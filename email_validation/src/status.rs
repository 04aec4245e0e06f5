use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::FailureDetail;

/// Caller-visible handle for one validation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(Uuid);

impl TrackingId {
    pub fn new() -> Self {
        TrackingId(Uuid::new_v4())
    }
}

impl Default for TrackingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TrackingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TrackingId)
    }
}

/// Final report for a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_records: u64,
    pub processed_records: u64,
    pub failed_records: u64,
    pub details: Vec<FailureDetail>,
}

impl Summary {
    pub fn new(total_records: u64, details: Vec<FailureDetail>) -> Self {
        let failed_records = details.len() as u64;
        Summary {
            total_records,
            processed_records: total_records.saturating_sub(failed_records),
            failed_records,
            details,
        }
    }
}

/// Latest published state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Processing { progress: u8 },
    Completed { progress: u8, summary: Summary },
    Failed { error: String },
}

impl JobStatus {
    pub fn completed(summary: Summary) -> Self {
        JobStatus::Completed {
            progress: 100,
            summary,
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            JobStatus::Processing { progress } | JobStatus::Completed { progress, .. } => {
                Some(*progress)
            }
            JobStatus::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing { .. })
    }
}

/// `round(processed / total * 100)`, with an empty total counted as 1.
pub fn progress_percent(processed: u64, total: u64) -> u8 {
    let total = u128::from(total.max(1));
    let processed = u128::from(processed.min(total as u64));
    // Round half up, as integer arithmetic.
    ((processed * 200 + total) / (total * 2)) as u8
}

/// Process-wide map of tracking id to the latest [`JobStatus`].
///
/// Every write replaces the whole snapshot for its key, so readers see
/// either the previous status or the new one.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    jobs: Arc<DashMap<TrackingId, JobStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        StatusStore {
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub fn set(&self, id: TrackingId, status: JobStatus) {
        self.jobs.insert(id, status);
    }

    pub fn get(&self, id: &TrackingId) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Sets `status` only if `id` has nothing published yet.
    /// Returns whether it was written.
    pub fn init(&self, id: TrackingId, status: JobStatus) -> bool {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(status);
                true
            }
        }
    }

    pub fn clear(&self) {
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
