//! Domain module
//!
//! Core domain types and business logic.

pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod transaction;
pub mod voucher;

pub use amount::{validate_max_discount, Amount, AmountError, DiscountPercent};
pub use context::{EntryPoint, OperationContext};
pub use error::DomainError;
pub use events::{OrderCreatedData, SagaEvent, SagaEventType, SalesCompletedData, SalesFailedData};
pub use transaction::{SalesTransaction, SalesTransactionView, TransactionStatus};
pub use voucher::{Pricing, Voucher};
