//! Inbound saga commands

use crate::domain::{OrderCreatedData, SagaEvent, SagaEventType};
use crate::handlers::OrderCreatedCommand;

/// Why an inbound message could not be understood
#[derive(Debug, thiserror::Error)]
pub enum SagaParseError {
    #[error("Malformed saga envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("Malformed {event_type} payload: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A saga command this service acts on
#[derive(Debug, Clone, PartialEq)]
pub enum SagaCommand {
    OrderCreated {
        /// Envelope `id`; empty when the sender omitted it
        message_id: String,
        command: OrderCreatedCommand,
    },
}

impl SagaCommand {
    /// Decode a raw bus message.
    ///
    /// Returns `Ok(None)` for well-formed envelopes of any other type.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, SagaParseError> {
        let envelope: SagaEvent =
            serde_json::from_slice(payload).map_err(SagaParseError::InvalidEnvelope)?;

        match envelope.event_type {
            SagaEventType::OrderCreated => {
                let data: OrderCreatedData = serde_json::from_value(envelope.data).map_err(
                    |source| SagaParseError::InvalidPayload {
                        event_type: SagaEventType::OrderCreated.to_string(),
                        source,
                    },
                )?;

                Ok(Some(SagaCommand::OrderCreated {
                    message_id: envelope.id,
                    command: OrderCreatedCommand {
                        order_id: envelope.order_id,
                        customer_id: data.customer_id,
                        total_amount: data.total_amount,
                    },
                }))
            }
            _ => Ok(None),
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            SagaCommand::OrderCreated { command, .. } => command.order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_order_created() {
        let raw = br#"{
            "id": "m-1",
            "type": "ORDER_CREATED",
            "order_id": 42,
            "data": {"customer_id": 1, "total_amount": 250},
            "timestamp": "2026-01-01T10:00:00Z"
        }"#;

        let command = SagaCommand::parse(raw).unwrap().unwrap();
        assert_eq!(command.order_id(), 42);
        assert_eq!(
            command,
            SagaCommand::OrderCreated {
                message_id: "m-1".to_string(),
                command: OrderCreatedCommand {
                    order_id: 42,
                    customer_id: 1,
                    total_amount: dec!(250),
                },
            }
        );
    }

    #[test]
    fn test_other_types_are_ignored() {
        let raw = br#"{"type": "INVENTORY_RESERVED", "order_id": 42, "data": {"items": []}}"#;
        assert!(SagaCommand::parse(raw).unwrap().is_none());

        // Our own outcomes may share the channel in some deployments
        let own = br#"{"type": "SALES_TRANSACTION_COMPLETED", "order_id": 42, "data": {}}"#;
        assert!(SagaCommand::parse(own).unwrap().is_none());
    }

    #[test]
    fn test_malformed_messages() {
        assert!(matches!(
            SagaCommand::parse(b"not json"),
            Err(SagaParseError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            SagaCommand::parse(br#"{"type": "ORDER_CREATED"}"#),
            Err(SagaParseError::InvalidEnvelope(_))
        ));

        let missing_total = br#"{"type": "ORDER_CREATED", "order_id": 1, "data": {"customer_id": 1}}"#;
        let err = SagaCommand::parse(missing_total).unwrap_err();
        assert!(matches!(err, SagaParseError::InvalidPayload { .. }));
        assert!(err.to_string().contains("ORDER_CREATED"));
    }
}
