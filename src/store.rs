use std::cmp::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::types::{Job, JobId, JobOutcome, JobStatus};

/// Row predicate used by listing and by the sweep.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Match any of these bindings. `None` matches all.
    pub bindings: Option<Vec<String>>,
    /// Match any of these statuses. `None` matches all.
    pub statuses: Option<Vec<JobStatus>>,
    /// Match rows created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(self, binding: impl Into<String>) -> Self {
        self.bindings([binding])
    }

    pub fn bindings<I, S>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bindings = Some(bindings.into_iter().map(Into::into).collect());
        self
    }

    pub fn status(self, status: JobStatus) -> Self {
        self.statuses([status])
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(ref bindings) = self.bindings {
            if !bindings.iter().any(|b| *b == job.binding) {
                return false;
            }
        }
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&job.status) {
                return false;
            }
        }
        if let Some(cutoff) = self.created_before {
            if job.created_at >= cutoff {
                return false;
            }
        }
        true
    }
}

/// Sortable job fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Binding,
    Status,
    Attempts,
    CreatedAt,
    StartedAt,
    FinishedAt,
}

/// Sort order for listings. Ties always break by id descending, so pages
/// are stable regardless of the chosen field.
#[derive(Debug, Clone, Copy)]
pub struct JobSort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for JobSort {
    fn default() -> Self {
        // Newest first, matching the id-descending default of the listing API.
        Self {
            field: SortField::Id,
            descending: true,
        }
    }
}

impl JobSort {
    pub fn by(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn compare(&self, a: &Job, b: &Job) -> Ordering {
        let ord = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Binding => a.binding.cmp(&b.binding),
            SortField::Status => a.status.cmp(&b.status),
            SortField::Attempts => a.attempts.cmp(&b.attempts),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::StartedAt => a.started_at.cmp(&b.started_at),
            SortField::FinishedAt => a.finished_at.cmp(&b.finished_at),
        };
        let ord = if self.descending { ord.reverse() } else { ord };
        ord.then_with(|| b.id.cmp(&a.id))
    }
}

/// Offset/limit page window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Patch applied to a job row; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub attempts: Option<u32>,
    pub result: Option<JobOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time: Option<Duration>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn result(mut self, result: JobOutcome) -> Self {
        self.result = Some(result);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = Some(elapsed);
        self
    }

    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(attempts) = self.attempts {
            job.attempts = attempts;
        }
        if let Some(ref result) = self.result {
            job.result = Some(result.clone());
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            job.finished_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(elapsed) = self.processing_time {
            job.processing_time = Some(elapsed);
        }
    }
}

/// Durable record of jobs and their state. The single source of truth for
/// status: the engine re-reads and re-writes it on every transition rather
/// than caching job state across deliveries.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Pending` row and return it.
    async fn create(&self, binding: &str, payload: Bytes) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Apply a patch to an existing row and return the updated row.
    async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, StoreError>;

    /// Matching rows for one page window, plus the total match count
    /// computed independently of the window.
    async fn find_many(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        page: Page,
    ) -> Result<(Vec<Job>, u64), StoreError>;

    /// Delete all matching rows, returning how many were removed.
    async fn delete_many(&self, filter: &JobFilter) -> Result<u64, StoreError>;
}
