//! Command definitions
//!
//! Commands represent intentions to change the system state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Amount, DiscountPercent};

/// Command to record a sales transaction from a direct request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTransactionCommand {
    pub order_id: i64,
    pub customer_id: i64,
    pub original_amount: Amount,
    /// Code of the voucher to apply. Blank codes count as no voucher.
    pub voucher_code: Option<String>,
}

impl ProcessTransactionCommand {
    pub fn new(order_id: i64, customer_id: i64, original_amount: Amount) -> Self {
        Self {
            order_id,
            customer_id,
            original_amount,
            voucher_code: None,
        }
    }

    pub fn with_voucher_code(mut self, code: impl Into<String>) -> Self {
        self.voucher_code = Some(code.into());
        self
    }

    /// Voucher code to look up, trimmed, or `None` when blank
    pub fn effective_voucher_code(&self) -> Option<&str> {
        self.voucher_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// Command derived from an inbound `ORDER_CREATED` saga message.
///
/// The total is taken as-is; the database is the only gate on it, so a bad
/// total surfaces as a failure event rather than being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedCommand {
    pub order_id: i64,
    pub customer_id: i64,
    pub total_amount: Decimal,
}

/// Command to issue a voucher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVoucherCommand {
    pub code: String,
    pub discount_percent: DiscountPercent,
    pub max_discount: Option<Decimal>,
}

impl CreateVoucherCommand {
    pub fn new(code: impl Into<String>, discount_percent: DiscountPercent) -> Self {
        Self {
            code: code.into(),
            discount_percent,
            max_discount: None,
        }
    }

    pub fn with_max_discount(mut self, max_discount: Decimal) -> Self {
        self.max_discount = Some(max_discount);
        self
    }
}
