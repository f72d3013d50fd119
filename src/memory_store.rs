use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::StoreError;
use crate::store::{JobFilter, JobSort, JobStore, JobUpdate, Page};
use crate::types::{Job, JobId};

/// In-memory [`JobStore`] backed by a locked row map. Suitable for tests,
/// development, and single-process deployments that can afford to lose
/// history on restart.
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    #[instrument(skip_all, fields(binding = binding, payload_size = payload.len()))]
    async fn create(&self, binding: &str, payload: Bytes) -> Result<Job, StoreError> {
        let job = Job::new(binding, payload);

        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());

        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;

        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update.apply(job);

        Ok(job.clone())
    }

    async fn find_many(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        page: Page,
    ) -> Result<(Vec<Job>, u64), StoreError> {
        let jobs = self.jobs.read().await;

        let mut matching: Vec<Job> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        let total = matching.len() as u64;

        matching.sort_by(|a, b| sort.compare(a, b));

        let rows = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();

        Ok((rows, total))
    }

    #[instrument(skip_all, err, ret)]
    async fn delete_many(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;

        let before = jobs.len();
        jobs.retain(|_, job| !filter.matches(job));

        Ok((before - jobs.len()) as u64)
    }
}
