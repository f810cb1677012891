//! Transactional Outbox
//!
//! Saga outcomes are written to `outbox_events` in the same database
//! transaction as the business rows they describe, then published by the
//! relay. The pair gives at-least-once delivery with per-order ordering.

mod error;
mod relay;
mod store;

pub use error::OutboxError;
pub use relay::{OutboxRelay, RelayConfig, RetryPolicy, SweepReport};
pub use store::{NewOutboxEvent, OutboxEvent, OutboxRepository, PgOutboxStore};
