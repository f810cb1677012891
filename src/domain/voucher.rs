//! Vouchers and discount pricing
//!
//! A voucher grants a percentage discount, optionally capped. Pricing is pure so
//! the processor can run it inside its atomic unit without any external call.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::amount::MONEY_SCALE;
use super::DomainError;

/// Voucher record. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub discount_percent: Decimal,
    pub max_discount: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    /// Discount this voucher grants on `amount`.
    ///
    /// The percentage is truncated to cents so the result never exceeds the
    /// exact product, then clamped to `max_discount` when one is set.
    pub fn discount_for(&self, amount: Decimal) -> Decimal {
        let raw = (amount * self.discount_percent / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero);

        match self.max_discount {
            Some(max) if raw > max => max,
            _ => raw,
        }
    }
}

/// Outcome of applying an optional voucher to an original amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub voucher_id: Option<i64>,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
}

impl Pricing {
    /// Price `original` with the voucher, if any.
    ///
    /// Callers pass `None` both when no code was given and when the code did not
    /// match an active voucher; both yield a zero discount.
    pub fn compute(original: Decimal, voucher: Option<&Voucher>) -> Result<Self, DomainError> {
        let discount = voucher.map_or(Decimal::ZERO, |v| v.discount_for(original));
        let final_amount = original - discount;

        if final_amount < Decimal::ZERO {
            return Err(DomainError::NegativeFinalAmount {
                original,
                discount,
            });
        }

        Ok(Self {
            voucher_id: voucher.map(|v| v.id),
            original_amount: original,
            discount_amount: discount,
            final_amount,
        })
    }

    /// Pricing for a saga-initiated transaction: no voucher, total as-is.
    pub fn without_discount(original: Decimal) -> Self {
        Self {
            voucher_id: None,
            original_amount: original,
            discount_amount: Decimal::ZERO,
            final_amount: original,
        }
    }
}
