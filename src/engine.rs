use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures_util::future::join_all;
use tracing::instrument;

use crate::config::QueueConfig;
use crate::error::{EnqueueError, HandlerError, StoreError, TransportError};
use crate::handler::{HandlerRegistry, JobContext, JobHandler};
use crate::store::{JobFilter, JobSort, JobStore, JobUpdate, Page};
use crate::transport::{DeliveryBatch, DeliveryHandle, Transport};
use crate::types::{Job, JobId, JobOutcome, JobRef, JobStatus};

enum Decision {
    Ack,
    Retry,
}

/// The job lifecycle engine. Accepts new jobs on the enqueue path and
/// drives delivery batches through the state machine; `sweep` reclaims old
/// terminal rows.
///
/// Holds the store and transport behind their trait seams and the handler
/// registry explicitly; nothing is resolved through ambient state.
pub struct JobEngine {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    config: QueueConfig,
    bincode_config: bincode::config::Configuration,
}

impl JobEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            transport,
            registry,
            config: QueueConfig::default(),
            bincode_config: bincode::config::standard(),
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a typed payload under the handler's binding name.
    #[instrument(skip_all, err, ret, fields(binding = J::NAME, payload_size))]
    pub async fn enqueue<J: JobHandler>(&self, payload: J::Payload) -> Result<JobId, EnqueueError> {
        let payload = bincode::encode_to_vec(&payload, self.bincode_config)?;

        tracing::Span::current().record("payload_size", payload.len());

        self.enqueue_raw(J::NAME, payload.into()).await
    }

    /// Enqueue an already-encoded payload under an arbitrary binding name.
    ///
    /// Creates a `Pending` row, then hands a reference to the transport.
    /// Infrastructure errors propagate to the caller unmodified; a partially
    /// enqueued job (row written, send failed) is not rolled back here.
    pub async fn enqueue_raw(&self, binding: &str, payload: Bytes) -> Result<JobId, EnqueueError> {
        if binding.is_empty() {
            return Err(EnqueueError::EmptyBinding);
        }

        let job = self.store.create(binding, payload).await?;
        self.transport.send(JobRef::from(&job)).await?;

        tracing::info!(job_id = %job.id, binding = %job.binding, "enqueued job");
        Ok(job.id)
    }

    /// Process one delivery batch: every delivery is dispatched concurrently
    /// and settles independently, then the batch as a whole is acknowledged.
    ///
    /// The batch-level ack is issued even for deliveries that asked for a
    /// retry: redelivery is signalled per message, not by withholding the
    /// batch ack. Every delivery has its own ack-or-retry decision finalized
    /// before this returns.
    #[instrument(skip_all, fields(batch_size))]
    pub async fn dispatch<B: DeliveryBatch>(&self, mut batch: B) -> Result<(), TransportError> {
        let deliveries = batch.drain();
        tracing::Span::current().record("batch_size", deliveries.len());

        join_all(
            deliveries
                .into_iter()
                .map(|delivery| self.process_delivery(delivery)),
        )
        .await;

        batch.ack_all().await
    }

    /// Drive a single delivery through the state machine. Never fails out:
    /// handler errors become status transitions, and persistence errors are
    /// logged while the ack/retry decision is still issued. The decision is
    /// authoritative for whether the job runs again, the store for what we
    /// report.
    #[instrument(
        skip_all,
        fields(
            job_id = %delivery.job_ref().id,
            binding = %delivery.job_ref().binding,
            attempts = delivery.attempts(),
        )
    )]
    async fn process_delivery<D: DeliveryHandle>(&self, delivery: D) {
        let job_ref = delivery.job_ref().clone();
        let attempts = delivery.attempts();

        match self.store.get(job_ref.id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                // Terminal rows (externally cancelled included) never
                // transition again; drop the delivery without running the
                // handler.
                tracing::debug!(status = %job.status, "dropping delivery for terminal job");
                if let Err(error) = delivery.ack().await {
                    tracing::error!(%error, "failed to ack dropped delivery");
                }
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("dropping delivery for unknown job");
                if let Err(error) = delivery.ack().await {
                    tracing::error!(%error, "failed to ack dropped delivery");
                }
                return;
            }
            // Status unreadable: proceed anyway. The updates below will log
            // their own failures, and the decision must still be issued.
            Err(error) => tracing::error!(%error, "failed to read job before processing"),
        }

        let started_at = Utc::now();
        let processing = JobUpdate::new()
            .status(JobStatus::Processing)
            .started_at(started_at)
            .attempts(attempts);
        if let Err(error) = self.store.update(job_ref.id, processing).await {
            tracing::error!(%error, "failed to persist processing transition");
        }

        tracing::debug!("processing job");
        let outcome = self.invoke(&job_ref, attempts).await;
        let finished_at = Utc::now();

        let mut update = JobUpdate::new().finished_at(finished_at);
        let decision = match outcome {
            Ok(output) => {
                update = update
                    .status(JobStatus::Completed)
                    .completed_at(finished_at)
                    .processing_time(finished_at - started_at)
                    .result(JobOutcome::Output(output));
                tracing::info!("completed job");
                Decision::Ack
            }
            Err(error) => {
                if self.config.retryable(attempts) {
                    update = update
                        .status(JobStatus::RetryPending)
                        .result(JobOutcome::Error(error.to_string()));
                    tracing::info!(%error, "retrying job");
                    Decision::Retry
                } else {
                    update = update
                        .status(JobStatus::Failed)
                        .result(JobOutcome::Error(error.to_string()));
                    tracing::info!(%error, "failed job");
                    Decision::Ack
                }
            }
        };

        // Single finalization write for both branches. Its failure must not
        // block the decision below, but it is never swallowed silently.
        if let Err(error) = self.store.update(job_ref.id, update).await {
            tracing::error!(%error, "failed to persist delivery outcome");
        }

        let decided = match decision {
            Decision::Ack => delivery.ack().await,
            Decision::Retry => delivery.retry().await,
        };
        if let Err(error) = decided {
            tracing::error!(%error, "failed to settle delivery");
        }
    }

    async fn invoke(&self, job_ref: &JobRef, attempts: u32) -> Result<Bytes, HandlerError> {
        let handler = self
            .registry
            .resolve(&job_ref.binding)
            .ok_or_else(|| HandlerError::UnknownBinding(job_ref.binding.clone()))?;

        let ctx = JobContext {
            job_id: job_ref.id,
            attempts,
        };

        let invocation = handler.perform(ctx, job_ref.payload.clone());
        match self.config.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .map_err(|_| HandlerError::TimedOut(limit))?,
            None => invocation.await,
        }
    }

    /// Delete terminal jobs older than the retention window. Idempotent;
    /// returns how many rows were removed.
    #[instrument(skip_all, err, ret)]
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - self.config.retention;
        let filter = JobFilter::new()
            .statuses([JobStatus::Completed, JobStatus::Failed])
            .created_before(cutoff);

        self.store.delete_many(&filter).await
    }

    pub async fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.store.get(id).await
    }

    /// Listing projection over the job table; see [`JobStore::find_many`].
    pub async fn list(
        &self,
        filter: &JobFilter,
        sort: JobSort,
        page: Page,
    ) -> Result<(Vec<Job>, u64), StoreError> {
        self.store.find_many(filter, sort, page).await
    }
}
