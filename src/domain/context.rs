//! Operation Context
//!
//! Contains metadata about the current operation for tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an operation entered the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// Synchronous HTTP request
    Direct,
    /// Inbound saga command
    Saga,
}

/// Context for an operation, used for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    pub correlation_id: Uuid,

    pub entry_point: EntryPoint,

    /// Identifier of the inbound saga message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
}

impl OperationContext {
    /// Context for a direct request with a fresh correlation ID
    pub fn direct() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            entry_point: EntryPoint::Direct,
            causation_id: None,
        }
    }

    /// Context for a saga command. Reuses the message ID as correlation ID when
    /// it is a UUID.
    pub fn saga(message_id: &str) -> Self {
        let correlation_id = Uuid::parse_str(message_id).unwrap_or_else(|_| Uuid::new_v4());
        let causation_id = (!message_id.is_empty()).then(|| message_id.to_string());
        Self {
            correlation_id,
            entry_point: EntryPoint::Saga,
            causation_id,
        }
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}
