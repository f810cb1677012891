//! Outbox Store
//!
//! Durable, append-only staging area for saga events awaiting publication.
//! A row becomes visible to the relay only once the unit that wrote it commits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{SagaEvent, SagaEventType, SalesCompletedData, SalesFailedData};

use super::OutboxError;

/// Event to be appended to the outbox
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_id: Uuid,
    pub event_type: SagaEventType,
    /// Correlation key (order ID)
    pub aggregate_id: i64,
    pub event_data: serde_json::Value,
}

impl NewOutboxEvent {
    /// Create an event with a fresh event ID
    pub fn new<T: Serialize>(
        event_type: SagaEventType,
        order_id: i64,
        data: &T,
    ) -> Result<Self, OutboxError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type,
            aggregate_id: order_id,
            event_data: serde_json::to_value(data)?,
        })
    }

    pub fn completed(order_id: i64, data: &SalesCompletedData) -> Result<Self, OutboxError> {
        Self::new(SagaEventType::SalesTransactionCompleted, order_id, data)
    }

    pub fn failed(order_id: i64, error: impl Into<String>) -> Result<Self, OutboxError> {
        let data = SalesFailedData {
            error: error.into(),
        };
        Self::new(SagaEventType::SalesTransactionFailed, order_id, &data)
    }
}

/// Stored outbox row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: i64,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Wire envelope for this row
    pub fn to_saga_event(&self) -> SagaEvent {
        SagaEvent {
            id: self.event_id.to_string(),
            event_type: SagaEventType::parse(&self.event_type),
            order_id: self.aggregate_id,
            data: self.event_data.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Read/acknowledge side of the outbox, as used by the relay
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// All unprocessed, non-dead-lettered rows in creation order. Rows are not
    /// locked or claimed.
    async fn fetch_unprocessed(&self) -> Result<Vec<OutboxEvent>, OutboxError>;

    /// Mark a row processed. Marking an already-processed row is a no-op.
    async fn mark_processed(&self, id: i64) -> Result<(), OutboxError>;

    /// Count a failed publish against a row, dead-lettering it when asked.
    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), OutboxError>;
}

/// PostgreSQL outbox store
#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append inside a caller-owned transaction. Never commits; the event is
    /// only durable if the caller's unit commits.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &NewOutboxEvent,
    ) -> Result<i64, OutboxError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_events (event_id, event_type, aggregate_id, event_data)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(event.event_id)
        .bind(event.event_type.as_str())
        .bind(event.aggregate_id)
        .bind(&event.event_data)
        .fetch_one(&mut **tx)
        .await?;

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            order_id = event.aggregate_id,
            "Event staged in outbox"
        );

        Ok(id)
    }

    /// Append as a standalone atomic unit on its own connection
    pub async fn append(&self, event: &NewOutboxEvent) -> Result<i64, OutboxError> {
        let mut tx = self.pool.begin().await?;
        let id = self.append_in_tx(&mut tx, event).await?;
        tx.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxStore {
    async fn fetch_unprocessed(&self) -> Result<Vec<OutboxEvent>, OutboxError> {
        let events = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, event_id, event_type, aggregate_id, event_data,
                   processed, attempts, created_at
            FROM outbox_events
            WHERE processed = FALSE AND dead_lettered = FALSE
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn mark_processed(&self, id: i64) -> Result<(), OutboxError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET processed = TRUE,
                processed_at = COALESCE(processed_at, NOW())
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), OutboxError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                last_error = $2,
                dead_lettered = dead_lettered OR $3
            WHERE id = $1 AND processed = FALSE
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(dead_letter)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
