use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bincode::{Decode, Encode};
use bytes::Bytes;

use crate::error::HandlerError;
use crate::types::JobId;

/// Execution context handed to a handler alongside its payload.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    /// Prior deliveries of this job, as reported by the transport.
    pub attempts: u32,
}

/// A typed job handler, registered under [`JobHandler::NAME`].
///
/// Payloads are bincode-encoded at enqueue and decoded back here before
/// `perform` runs; the output is encoded and stored on the job row.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// The binding name jobs are enqueued under.
    const NAME: &'static str;

    type Payload: Encode + Decode + Send + Sync;
    type Output: Encode + Send + Sync;

    async fn perform(
        &self,
        ctx: JobContext,
        payload: Self::Payload,
    ) -> Result<Self::Output, HandlerError>;
}

/// A type-erased handler bound to a binding name: decodes the raw payload,
/// runs the typed handler, encodes the output.
#[async_trait]
pub trait BindingHandler: Send + Sync {
    async fn perform(&self, ctx: JobContext, payload: Bytes) -> Result<Bytes, HandlerError>;
}

struct Erased<J> {
    handler: J,
    bincode_config: bincode::config::Configuration,
}

#[async_trait]
impl<J: JobHandler> BindingHandler for Erased<J> {
    async fn perform(&self, ctx: JobContext, payload: Bytes) -> Result<Bytes, HandlerError> {
        let (payload, _) = bincode::decode_from_slice(&payload, self.bincode_config)?;
        let output = self.handler.perform(ctx, payload).await?;
        let output = bincode::encode_to_vec(&output, self.bincode_config)?;
        Ok(output.into())
    }
}

/// Name-keyed handler registry, built at process start and then immutable.
///
/// The dispatch loop receives it explicitly; bindings are never resolved
/// through ambient state.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn BindingHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its binding name. A later registration for
    /// the same name replaces the earlier one.
    pub fn register<J: JobHandler>(&mut self, handler: J) -> &mut Self {
        self.handlers.insert(
            J::NAME.to_string(),
            Arc::new(Erased {
                handler,
                bincode_config: bincode::config::standard(),
            }),
        );
        self
    }

    pub fn resolve(&self, binding: &str) -> Option<Arc<dyn BindingHandler>> {
        self.handlers.get(binding).cloned()
    }

    /// Names with a registered handler.
    pub fn bindings(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
