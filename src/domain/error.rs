//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

/// Domain invariant failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Discount exceeded the original amount. Inputs are validated upstream, so
    /// reaching this is a programming error rather than a user error.
    #[error("Final amount would be negative: original {original}, discount {discount}")]
    NegativeFinalAmount { original: Decimal, discount: Decimal },

    /// Stored status string is not one this service writes
    #[error("Unknown transaction status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_final_amount_message() {
        let err = DomainError::NegativeFinalAmount {
            original: Decimal::new(10, 0),
            discount: Decimal::new(20, 0),
        };

        assert!(err.to_string().contains("original 10"));
        assert!(err.to_string().contains("discount 20"));
    }

    #[test]
    fn test_unknown_status_message() {
        let err = DomainError::UnknownStatus("refunded".to_string());
        assert_eq!(err.to_string(), "Unknown transaction status: refunded");
    }
}
