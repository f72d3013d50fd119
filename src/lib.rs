//! Minimal background-job queue.
//!
//! Callers enqueue a named job with a payload, the dispatch loop later
//! delivers it to the handler registered under that name (its "binding"),
//! and the outcome is recorded on a persistent job row. Failed deliveries
//! retry until the attempt budget is exhausted; old terminal rows are
//! reclaimed by a periodic sweep. Delivery is at-least-once and each job is
//! processed independently.
//!
//! ```text
//! enqueue ──► JobStore.create ──► Transport.send(JobRef)
//!                                      │ (async delivery)
//!                                      ▼
//!              JobEngine.dispatch(batch) ──► HandlerRegistry ──► perform
//!                                      │
//!                                      ▼
//!              JobStore.update(outcome) + delivery ack/retry
//! ```
//!
//! The storage and broker technologies live behind the [`JobStore`] and
//! [`Transport`] seams; in-memory implementations of both ship in this
//! crate.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use adjutant::{
//!     HandlerError, HandlerRegistry, JobContext, JobEngine, JobHandler,
//!     MemoryJobStore, MemoryTransport, Runner,
//! };
//! use async_trait::async_trait;
//! use bincode::{Decode, Encode};
//!
//! #[derive(Encode, Decode)]
//! struct Email { to: String }
//!
//! struct SendEmail;
//!
//! #[async_trait]
//! impl JobHandler for SendEmail {
//!     const NAME: &'static str = "send_email";
//!     type Payload = Email;
//!     type Output = String;
//!
//!     async fn perform(
//!         &self,
//!         _ctx: JobContext,
//!         email: Email,
//!     ) -> Result<String, HandlerError> {
//!         // deliver the email
//!         Ok(format!("sent to {}", email.to))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryJobStore::new());
//!     let transport = Arc::new(MemoryTransport::new());
//!
//!     let mut registry = HandlerRegistry::new();
//!     registry.register(SendEmail);
//!
//!     let engine = Arc::new(JobEngine::new(
//!         store,
//!         transport.clone(),
//!         Arc::new(registry),
//!     ));
//!
//!     engine
//!         .enqueue::<SendEmail>(Email { to: "user@example.com".into() })
//!         .await
//!         .unwrap();
//!
//!     Runner::new(engine, transport).run().await;
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod memory_store;
pub mod memory_transport;
pub mod runner;
pub mod store;
pub mod transport;
pub mod types;

pub use config::QueueConfig;
pub use engine::JobEngine;
pub use error::{EnqueueError, HandlerError, StoreError, TransportError};
pub use handler::{BindingHandler, HandlerRegistry, JobContext, JobHandler};
pub use memory_store::MemoryJobStore;
pub use memory_transport::{MemoryBatch, MemoryDelivery, MemoryTransport};
pub use runner::Runner;
pub use store::{JobFilter, JobSort, JobStore, JobUpdate, Page, SortField};
pub use transport::{DeliveryBatch, DeliveryHandle, Transport};
pub use types::{new_job_id, Job, JobId, JobOutcome, JobRef, JobStatus};
