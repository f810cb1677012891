//! Sales Saga Library
//!
//! Sales transaction participant of the order saga: records transactions with
//! voucher discounts and announces outcomes through a transactional outbox.

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod outbox;
pub mod saga;

mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, DomainError, OperationContext};
pub use error::AppError;
