//! Command Handlers module
//!
//! Handlers own the database units behind each operation. Commands reach them
//! already validated, from the API layer or the saga consumer.

mod commands;
mod transaction_handler;
mod voucher_handler;

pub use commands::*;
pub use transaction_handler::TransactionProcessor;
pub use voucher_handler::VoucherService;
