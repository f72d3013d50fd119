use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use uuid::{ContextV7, Timestamp, Uuid};

pub type JobId = Uuid;

static V7_CONTEXT: OnceLock<Mutex<ContextV7>> = OnceLock::new();

/// Time-ordered (v7) ids, so the default id-descending sort is newest-first.
/// A shared counter context keeps ids generated within the same millisecond
/// in order.
pub fn new_job_id() -> JobId {
    let context = V7_CONTEXT.get_or_init(|| Mutex::new(ContextV7::new()));
    Uuid::new_v7(Timestamp::now(context))
}

/// Lifecycle status of a job.
///
/// `Completed`, `Failed` and `Cancelled` are terminal: the engine never
/// transitions out of them. `Cancelled` is only ever set from outside the
/// dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStatus {
    Pending,
    Processing,
    RetryPending,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// The persisted wire token. External tooling depends on these exact
    /// strings, so they are part of the public contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::RetryPending => "RETRY_PENDING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "RETRY_PENDING" => Ok(JobStatus::RetryPending),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Recorded outcome of a delivery. Success payloads and error descriptions
/// are kept apart so one can never silently clobber the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Output(Bytes),
    Error(String),
}

/// A persisted job row. `id`, `binding` and `payload` are immutable after
/// creation; each timestamp is written exactly once, at the lifecycle point
/// it names.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub binding: String,
    pub payload: Bytes,
    pub status: JobStatus,
    pub attempts: u32,
    pub result: Option<JobOutcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time: Option<Duration>,
}

impl Job {
    pub fn new(binding: impl Into<String>, payload: Bytes) -> Self {
        Self {
            id: new_job_id(),
            binding: binding.into(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            completed_at: None,
            processing_time: None,
        }
    }
}

/// Snapshot of a job carried in a transport message. Only `id`, `binding`
/// and `payload` are recovered from it; the authoritative status lives in
/// the store.
#[derive(Debug, Clone)]
pub struct JobRef {
    pub id: JobId,
    pub binding: String,
    pub payload: Bytes,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            binding: job.binding.clone(),
            payload: job.payload.clone(),
        }
    }
}
