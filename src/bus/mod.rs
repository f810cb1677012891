//! Event bus
//!
//! Publish/subscribe channel shared with the rest of the saga. The relay
//! publishes outcomes through it and the saga consumer reads commands from it.
//!
//! - **NatsBus**: NATS core pub/sub, used in deployments
//! - **InMemoryBus**: tokio broadcast channel for development and tests

mod memory;
mod nats;

pub use memory::InMemoryBus;
pub use nats::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject this message was published to
    pub subject: String,
    /// Raw message body
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
        }
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    Publish(String),

    #[error("failed to subscribe to subject: {0}")]
    Subscribe(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Publish/subscribe channel abstraction
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message. Returns only once the backend accepted it, so a
    /// successful return is safe to treat as "delivered to the channel".
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a subject. The stream ends when the bus shuts down.
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}
