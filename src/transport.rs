use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::JobRef;

/// Producer side of the at-least-once delivery channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand a job reference to the channel for eventual delivery.
    async fn send(&self, job_ref: JobRef) -> Result<(), TransportError>;
}

/// One delivery attempt of a job, with its settlement handle.
///
/// `ack` and `retry` consume the handle, so a delivery gets exactly one of
/// the two decisions. `ack` removes the message permanently; `retry` asks
/// the transport to redeliver later with an incremented attempt count. The
/// transport guarantees the next delivery of the same job id only happens
/// after one of these is called.
#[async_trait]
pub trait DeliveryHandle: Send {
    fn job_ref(&self) -> &JobRef;

    /// Number of prior deliveries of this job, as counted by the transport.
    /// The first delivery carries 0.
    fn attempts(&self) -> u32;

    async fn ack(self) -> Result<(), TransportError>;

    async fn retry(self) -> Result<(), TransportError>;
}

/// A batch of deliveries plus the batch-level acknowledgment.
///
/// `ack_all` is what stops the transport from redelivering the batch as a
/// whole, so it must only be issued once every delivery in the batch has had
/// its individual ack-or-retry decision; per-message redelivery is signalled
/// through `retry`, not by withholding the batch ack.
#[async_trait]
pub trait DeliveryBatch: Send {
    type Delivery: DeliveryHandle + Send + 'static;

    /// Detach the individual deliveries, leaving the batch-level handle.
    fn drain(&mut self) -> Vec<Self::Delivery>;

    async fn ack_all(self) -> Result<(), TransportError>;
}
