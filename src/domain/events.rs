//! Saga Events
//!
//! Wire representation of the messages exchanged with the rest of the saga.
//! Every message on the channel is a JSON envelope
//! `{id, type, order_id, data, timestamp}`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Saga event types this service consumes or emits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SagaEventType {
    /// Inbound: the order service created an order
    OrderCreated,
    /// Outbound: a sales transaction was recorded
    SalesTransactionCompleted,
    /// Outbound: recording the sales transaction failed
    SalesTransactionFailed,
    /// Anything else seen on the channel
    Unknown(String),
}

impl SagaEventType {
    pub fn as_str(&self) -> &str {
        match self {
            SagaEventType::OrderCreated => "ORDER_CREATED",
            SagaEventType::SalesTransactionCompleted => "SALES_TRANSACTION_COMPLETED",
            SagaEventType::SalesTransactionFailed => "SALES_TRANSACTION_FAILED",
            SagaEventType::Unknown(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "ORDER_CREATED" => SagaEventType::OrderCreated,
            "SALES_TRANSACTION_COMPLETED" => SagaEventType::SalesTransactionCompleted,
            "SALES_TRANSACTION_FAILED" => SagaEventType::SalesTransactionFailed,
            other => SagaEventType::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SagaEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SagaEventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SagaEventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(SagaEventType::parse(&name))
    }
}

/// Envelope for every message on the saga channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaEvent {
    /// Outbound events carry the outbox event UUID. Peers may send any string.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: SagaEventType,
    pub order_id: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Payload of `SALES_TRANSACTION_COMPLETED`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesCompletedData {
    pub transaction_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_amount: Decimal,
}

/// Payload of `SALES_TRANSACTION_FAILED`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesFailedData {
    pub error: String,
}

/// Payload of inbound `ORDER_CREATED`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub customer_id: i64,
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(SagaEventType::SalesTransactionCompleted).unwrap(),
            json!("SALES_TRANSACTION_COMPLETED")
        );
        assert_eq!(SagaEventType::parse("ORDER_CREATED"), SagaEventType::OrderCreated);
        assert_eq!(
            SagaEventType::parse("INVENTORY_RESERVED"),
            SagaEventType::Unknown("INVENTORY_RESERVED".to_string())
        );
    }

    #[test]
    fn test_order_created_from_order_service() {
        let raw = r#"{
            "id": "2c1f7a8e-6b0e-4f7a-9d53-3f1f0e0f9b11",
            "type": "ORDER_CREATED",
            "order_id": 42,
            "data": {"customer_id": 1, "total_amount": 250},
            "timestamp": "2026-01-01T10:00:00Z"
        }"#;

        let event: SagaEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, SagaEventType::OrderCreated);
        assert_eq!(event.order_id, 42);

        let data: OrderCreatedData = serde_json::from_value(event.data).unwrap();
        assert_eq!(data.customer_id, 1);
        assert_eq!(data.total_amount, dec!(250));
    }

    #[test]
    fn test_envelope_tolerates_missing_id_and_timestamp() {
        let event: SagaEvent =
            serde_json::from_str(r#"{"type": "ORDER_CREATED", "order_id": 1, "data": {}}"#).unwrap();
        assert!(event.id.is_empty());
    }

    #[test]
    fn test_completed_amounts_are_numbers() {
        let data = SalesCompletedData {
            transaction_id: 5,
            final_amount: dec!(90.00),
            discount_amount: dec!(10.00),
        };

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["final_amount"].as_f64(), Some(90.0));
        assert_eq!(json["discount_amount"].as_f64(), Some(10.0));
    }
}
