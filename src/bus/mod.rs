//! Request/reply message-bus adapter.
//!
//! Every cross-tier interaction is a bus round-trip with an explicit
//! timeout. Subjects are per-resource-kind (`ec2.<Operation>`) or
//! per-instance (`ec2.cmd.<instanceId>`, `ebs.snapshot.<volumeId>`), with
//! exactly one responder per subject. The only transport outcome with
//! semantic weight is "no responders": on a per-instance subject it means
//! the instance does not exist.

pub mod rpc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("no responders on subject {0}")]
    NoResponders(String),

    #[error("request on subject {0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A subscribed responder: raw request payload in, raw reply payload out.
pub type BusHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Vec<u8>> + Send + Sync>;

/// The bus seam. The production implementation is the platform message
/// bus; `MemoryBus` collapses both tiers into one process for embedding
/// and tests.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Sends a request and waits up to `timeout` for the reply.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError>;

    /// Installs the responder for a subject, replacing any previous one.
    async fn subscribe(&self, subject: &str, handler: BusHandler) -> Result<(), BusError>;
}

/// In-process bus: a subject table of responders.
#[derive(Default)]
pub struct MemoryBus {
    handlers: RwLock<HashMap<String, BusHandler>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a responder, leaving the subject with no listeners. Used by
    /// tests to simulate a vanished instance daemon.
    pub fn unsubscribe(&self, subject: &str) {
        self.handlers.write().remove(subject);
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError> {
        let handler = self.handlers.read().get(subject).cloned();
        let handler = handler.ok_or_else(|| BusError::NoResponders(subject.to_string()))?;
        tokio::time::timeout(timeout, handler(payload))
            .await
            .map_err(|_| BusError::Timeout(subject.to_string(), timeout))
    }

    async fn subscribe(&self, subject: &str, handler: BusHandler) -> Result<(), BusError> {
        self.handlers.write().insert(subject.to_string(), handler);
        Ok(())
    }
}
