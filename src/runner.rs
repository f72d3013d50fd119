use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::JobEngine;
use crate::memory_transport::MemoryTransport;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// In-process consumer loop for a [`MemoryTransport`]: feeds delivery
/// batches to the engine and triggers the retention sweep on a timer.
///
/// A broker-backed deployment would replace this with the broker's own
/// consumer, calling [`JobEngine::dispatch`] per batch and
/// [`JobEngine::sweep`] from its scheduler.
pub struct Runner {
    engine: Arc<JobEngine>,
    transport: Arc<MemoryTransport>,
    batch_size: usize,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(engine: Arc<JobEngine>, transport: Arc<MemoryTransport>) -> Self {
        Self {
            engine,
            transport,
            batch_size: DEFAULT_BATCH_SIZE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token is cancelled. Dispatch and sweep
    /// failures are logged and the loop keeps going.
    pub async fn run(self) {
        let mut sweep_tick = tokio::time::interval(self.sweep_interval);
        sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick would sweep at startup; spend it here.
        sweep_tick.tick().await;

        tracing::info!(batch_size = self.batch_size, "runner started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("runner shutting down");
                    break;
                }
                batch = self.transport.recv_batch(self.batch_size) => {
                    let Some(batch) = batch else {
                        tracing::info!("transport closed, runner stopping");
                        break;
                    };
                    if let Err(error) = self.engine.dispatch(batch).await {
                        tracing::error!(%error, "batch dispatch failed");
                    }
                }
                _ = sweep_tick.tick() => {
                    match self.engine.sweep().await {
                        Ok(removed) if removed > 0 => {
                            tracing::info!(removed, "swept terminal jobs");
                        }
                        Ok(_) => {}
                        Err(error) => tracing::error!(%error, "sweep failed"),
                    }
                }
            }
        }
    }
}
