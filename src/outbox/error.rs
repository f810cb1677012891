//! Outbox Errors

use crate::bus::BusError;

/// Errors that can occur in the outbox store or relay
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Event payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Event bus rejected the publish
    #[error("Publish error: {0}")]
    Publish(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_message_keeps_cause() {
        let err = OutboxError::from(BusError::Publish("connection reset".to_string()));
        assert!(matches!(err, OutboxError::Publish(_)));
        assert!(err.to_string().contains("connection reset"));
    }
}
