//! Saga Event Consumer
//!
//! Reads saga commands from the bus and hands them to the transaction
//! processor. Outcomes are never published from here; they reach the bus
//! through the outbox.

mod command;
mod consumer;

pub use command::{SagaCommand, SagaParseError};
pub use consumer::{SagaCommandHandler, SagaConsumer};
