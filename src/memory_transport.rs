use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::TransportError;
use crate::transport::{DeliveryBatch, DeliveryHandle, Transport};
use crate::types::JobRef;

#[derive(Debug)]
struct Envelope {
    job_ref: JobRef,
    attempts: u32,
}

/// In-memory [`Transport`] over an unbounded channel. Messages are popped on
/// receive, so per-message `ack` and the batch-level `ack_all` have nothing
/// left to remove; `retry` re-sends the envelope with its attempt count
/// incremented. Redelivery only happens at decision time, which is what
/// gives the engine its one-in-flight-delivery-per-job guarantee.
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Inject a delivery with a pre-existing attempt count. Used when
    /// bridging messages in from an external channel, and by tests that need
    /// a delivery already deep into its retry budget.
    pub fn send_with_attempts(&self, job_ref: JobRef, attempts: u32) -> Result<(), TransportError> {
        self.tx
            .send(Envelope { job_ref, attempts })
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }

    /// Wait for at least one queued message, then drain up to `max_size`
    /// without waiting for more. Returns `None` once the channel is closed.
    pub async fn recv_batch(&self, max_size: usize) -> Option<MemoryBatch> {
        let mut rx = self.rx.lock().await;
        let first = rx.recv().await?;

        let mut deliveries = vec![self.delivery(first)];
        while deliveries.len() < max_size {
            match rx.try_recv() {
                Ok(envelope) => deliveries.push(self.delivery(envelope)),
                Err(_) => break,
            }
        }

        Some(MemoryBatch { deliveries })
    }

    /// Non-blocking variant of [`recv_batch`](Self::recv_batch): `None` when
    /// nothing is queued right now.
    pub fn try_recv_batch(&self, max_size: usize) -> Option<MemoryBatch> {
        let mut rx = self.rx.try_lock().ok()?;

        let mut deliveries = Vec::new();
        while deliveries.len() < max_size {
            match rx.try_recv() {
                Ok(envelope) => deliveries.push(self.delivery(envelope)),
                Err(_) => break,
            }
        }

        if deliveries.is_empty() {
            None
        } else {
            Some(MemoryBatch { deliveries })
        }
    }

    fn delivery(&self, envelope: Envelope) -> MemoryDelivery {
        MemoryDelivery {
            envelope,
            tx: self.tx.clone(),
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, job_ref: JobRef) -> Result<(), TransportError> {
        self.send_with_attempts(job_ref, 0)
    }
}

pub struct MemoryDelivery {
    envelope: Envelope,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[async_trait]
impl DeliveryHandle for MemoryDelivery {
    fn job_ref(&self) -> &JobRef {
        &self.envelope.job_ref
    }

    fn attempts(&self) -> u32 {
        self.envelope.attempts
    }

    async fn ack(self) -> Result<(), TransportError> {
        // Popped on receive; dropping the handle is the removal.
        Ok(())
    }

    async fn retry(self) -> Result<(), TransportError> {
        self.tx
            .send(Envelope {
                job_ref: self.envelope.job_ref,
                attempts: self.envelope.attempts + 1,
            })
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

pub struct MemoryBatch {
    deliveries: Vec<MemoryDelivery>,
}

#[async_trait]
impl DeliveryBatch for MemoryBatch {
    type Delivery = MemoryDelivery;

    fn drain(&mut self) -> Vec<MemoryDelivery> {
        std::mem::take(&mut self.deliveries)
    }

    async fn ack_all(self) -> Result<(), TransportError> {
        Ok(())
    }
}
