//! Sales transactions
//!
//! Rows are written once by the transaction processor and never updated here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Status assigned at creation time.
///
/// Direct requests are fully specified and complete immediately; saga-triggered
/// transactions start as pending for later reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A recorded sales transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalesTransaction {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: i64,
    pub voucher_id: Option<i64>,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Transaction joined with the code of the voucher it used, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalesTransactionView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub transaction: SalesTransaction,
    pub voucher_code: Option<String>,
}
