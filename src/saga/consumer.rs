//! Saga command consumer task

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

use crate::bus::{BusError, BusMessage, EventBus};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::handlers::{OrderCreatedCommand, TransactionProcessor};

use super::SagaCommand;

/// Target of decoded saga commands
#[async_trait]
pub trait SagaCommandHandler: Send + Sync + 'static {
    async fn handle_order_created(
        &self,
        command: OrderCreatedCommand,
        context: &OperationContext,
    ) -> Result<(), AppError>;
}

#[async_trait]
impl SagaCommandHandler for TransactionProcessor {
    async fn handle_order_created(
        &self,
        command: OrderCreatedCommand,
        context: &OperationContext,
    ) -> Result<(), AppError> {
        self.process_order_created(command, context).await.map(|_| ())
    }
}

pub struct SagaConsumer;

impl SagaConsumer {
    /// Subscribe to `subject` and start handling commands in the background.
    ///
    /// Each message is handled on its own task. When `shutdown` flips to `true`
    /// the consumer stops reading and waits for in-flight messages to finish.
    /// The task also finishes if the bus closes the subscription; it does not
    /// resubscribe, so callers should treat that as fatal.
    pub async fn start<H: SagaCommandHandler>(
        bus: Arc<dyn EventBus>,
        handler: Arc<H>,
        subject: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut stream = bus.subscribe(subject).await?;
        let subject = subject.to_string();
        tracing::info!(subject = %subject, "Saga consumer subscribed");

        Ok(tokio::spawn(async move {
            let mut in_flight = JoinSet::new();

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                    next = stream.next() => match next {
                        Some(msg) => {
                            in_flight.spawn(handle_message(handler.clone(), msg));
                        }
                        None => {
                            tracing::error!(subject = %subject, "Saga command stream ended");
                            break;
                        }
                    },
                }
            }

            while in_flight.join_next().await.is_some() {}
            tracing::info!(subject = %subject, "Saga consumer stopped");
        }))
    }
}

async fn handle_message<H: SagaCommandHandler>(handler: Arc<H>, msg: BusMessage) {
    let command = match SagaCommand::parse(&msg.payload) {
        Ok(Some(command)) => command,
        Ok(None) => {
            tracing::debug!(subject = %msg.subject, "Ignoring saga message of unhandled type");
            return;
        }
        Err(e) => {
            tracing::warn!(subject = %msg.subject, error = %e, "Dropping malformed saga message");
            return;
        }
    };

    match command {
        SagaCommand::OrderCreated {
            message_id,
            command,
        } => {
            let context = OperationContext::saga(&message_id);
            let span = tracing::info_span!(
                "saga_command",
                command = "ORDER_CREATED",
                order_id = command.order_id,
                message_id = %message_id,
                correlation_id = %context.correlation_id,
            );

            async {
                if let Err(e) = handler.handle_order_created(command, &context).await {
                    // The failure event is already staged in the outbox
                    tracing::error!(error = %e, "ORDER_CREATED handling failed");
                }
            }
            .instrument(span)
            .await;
        }
    }
}
