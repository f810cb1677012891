//! NATS-backed event bus

use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use super::{BusError, BusMessage, BusResult, EventBus};

/// EventBus over NATS core pub/sub
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server
    pub async fn connect(url: &str) -> BusResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        // publish() only buffers; flush surfaces connection failures here
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let stream = subscriber
            .map(|msg| BusMessage::new(msg.subject.to_string(), msg.payload.to_vec()));

        Ok(stream.boxed())
    }
}
