//! Transaction processor, outbox and relay against PostgreSQL

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal_macros::dec;
use sales_saga::bus::{EventBus, InMemoryBus};
use sales_saga::domain::{Amount, DiscountPercent, OperationContext, SagaEvent, SagaEventType, TransactionStatus};
use sales_saga::handlers::{
    CreateVoucherCommand, OrderCreatedCommand, ProcessTransactionCommand, TransactionProcessor,
    VoucherService,
};
use sales_saga::outbox::{
    NewOutboxEvent, OutboxError, OutboxEvent, OutboxRelay, OutboxRepository, PgOutboxStore,
};
use sales_saga::AppError;

mod common;

/// Outbox store that only exposes one order's rows, so a relay sweep in one
/// test leaves the rows of concurrently running tests alone
struct SingleOrderStore {
    inner: PgOutboxStore,
    order_id: i64,
}

#[async_trait]
impl OutboxRepository for SingleOrderStore {
    async fn fetch_unprocessed(&self) -> Result<Vec<OutboxEvent>, OutboxError> {
        let events = self.inner.fetch_unprocessed().await?;
        Ok(events
            .into_iter()
            .filter(|e| e.aggregate_id == self.order_id)
            .collect())
    }

    async fn mark_processed(&self, id: i64) -> Result<(), OutboxError> {
        self.inner.mark_processed(id).await
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), OutboxError> {
        self.inner.record_failure(id, error, dead_letter).await
    }
}

async fn create_voucher(pool: &sqlx::PgPool, prefix: &str, percent: rust_decimal::Decimal) -> String {
    let code = common::unique_code(prefix);
    VoucherService::new(pool.clone())
        .create(CreateVoucherCommand::new(
            code.clone(),
            DiscountPercent::new(percent).unwrap(),
        ))
        .await
        .unwrap();
    code
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_voucher_applied_and_completed_event_staged() {
    let pool = common::setup_test_db().await;
    let processor = TransactionProcessor::new(pool.clone());
    let code = create_voucher(&pool, "SAVE10", dec!(10)).await;
    let order_id = common::unique_order_id();

    let command = ProcessTransactionCommand::new(order_id, 1, Amount::new(dec!(100)).unwrap())
        .with_voucher_code(code.clone());
    let tx = processor.process(command, &OperationContext::direct()).await.unwrap();

    assert_eq!(tx.final_amount, dec!(90));
    assert_eq!(tx.discount_amount, dec!(10));
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert!(tx.voucher_id.is_some());

    let rows = common::outbox_rows(&pool, order_id).await;
    assert_eq!(rows.len(), 1);
    let (event_type, data, _) = &rows[0];
    assert_eq!(event_type, "SALES_TRANSACTION_COMPLETED");
    assert_eq!(data["transaction_id"], tx.id);
    assert_eq!(data["final_amount"].as_f64(), Some(90.0));
    assert_eq!(data["discount_amount"].as_f64(), Some(10.0));

    let view = processor.find_by_order(order_id).await.unwrap().unwrap();
    assert_eq!(view.voucher_code.as_deref(), Some(code.as_str()));
    assert_eq!(view.transaction, tx);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_unknown_voucher_gives_no_discount() {
    let pool = common::setup_test_db().await;
    let processor = TransactionProcessor::new(pool.clone());
    let order_id = common::unique_order_id();

    let command = ProcessTransactionCommand::new(order_id, 1, Amount::new(dec!(75.50)).unwrap())
        .with_voucher_code("DOESNOTEXIST");
    let tx = processor.process(command, &OperationContext::direct()).await.unwrap();

    assert_eq!(tx.discount_amount, dec!(0));
    assert_eq!(tx.final_amount, dec!(75.50));
    assert!(tx.voucher_id.is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_inactive_voucher_gives_no_discount() {
    let pool = common::setup_test_db().await;
    let code = create_voucher(&pool, "RETIRED", dec!(50)).await;
    sqlx::query("UPDATE vouchers SET is_active = FALSE WHERE code = $1")
        .bind(&code)
        .execute(&pool)
        .await
        .unwrap();

    let order_id = common::unique_order_id();
    let command = ProcessTransactionCommand::new(order_id, 1, Amount::new(dec!(40)).unwrap())
        .with_voucher_code(code);
    let tx = TransactionProcessor::new(pool.clone())
        .process(command, &OperationContext::direct())
        .await
        .unwrap();

    assert_eq!(tx.final_amount, dec!(40));
    assert!(tx.voucher_id.is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_discount_capped_by_max_discount() {
    let pool = common::setup_test_db().await;
    let code = common::unique_code("HALF");
    VoucherService::new(pool.clone())
        .create(
            CreateVoucherCommand::new(code.clone(), DiscountPercent::new(dec!(50)).unwrap())
                .with_max_discount(dec!(20)),
        )
        .await
        .unwrap();

    let command = ProcessTransactionCommand::new(common::unique_order_id(), 1, Amount::new(dec!(100)).unwrap())
        .with_voucher_code(code);
    let tx = TransactionProcessor::new(pool)
        .process(command, &OperationContext::direct())
        .await
        .unwrap();

    assert_eq!(tx.discount_amount, dec!(20));
    assert_eq!(tx.final_amount, dec!(80));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_voucher_code_rejected() {
    let pool = common::setup_test_db().await;
    let code = create_voucher(&pool, "ONCE", dec!(5)).await;

    let err = VoucherService::new(pool.clone())
        .create(CreateVoucherCommand::new(code, DiscountPercent::new(dec!(5)).unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VoucherCodeTaken(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_insert_leaves_only_failed_event() {
    let pool = common::setup_test_db().await;
    let processor = TransactionProcessor::new(pool.clone());
    let order_id = common::unique_order_id();

    // customer_id violates the CHECK constraint
    let command = OrderCreatedCommand {
        order_id,
        customer_id: -1,
        total_amount: dec!(250),
    };
    let result = processor
        .process_order_created(command, &OperationContext::saga("m-fail"))
        .await;
    assert!(matches!(result, Err(AppError::Database(_))));

    assert_eq!(common::transaction_count(&pool, order_id).await, 0);

    let rows = common::outbox_rows(&pool, order_id).await;
    assert_eq!(rows.len(), 1, "exactly one outbox event expected");
    let (event_type, data, _) = &rows[0];
    assert_eq!(event_type, "SALES_TRANSACTION_FAILED");
    assert!(!data["error"].as_str().unwrap_or_default().is_empty());

    assert!(processor.find_by_order(order_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_order_created_relayed_to_saga_responses() {
    let pool = common::setup_test_db().await;
    let processor = TransactionProcessor::new(pool.clone());
    let order_id = common::unique_order_id();

    let tx = processor
        .process_order_created(
            OrderCreatedCommand {
                order_id,
                customer_id: 1,
                total_amount: dec!(250),
            },
            &OperationContext::saga(""),
        )
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.discount_amount, dec!(0));
    assert_eq!(tx.final_amount, dec!(250));

    let bus = Arc::new(InMemoryBus::new());
    let mut responses = bus.subscribe("saga_responses").await.unwrap();
    let store = SingleOrderStore {
        inner: PgOutboxStore::new(pool.clone()),
        order_id,
    };
    let relay = OutboxRelay::new(Arc::new(store), bus.clone());
    relay.sweep().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let msg = responses.next().await.expect("bus closed");
            let event: SagaEvent = serde_json::from_slice(&msg.payload).unwrap();
            if event.order_id == order_id {
                return event;
            }
        }
    })
    .await
    .expect("COMPLETED event not relayed");

    assert_eq!(event.event_type, SagaEventType::SalesTransactionCompleted);
    assert_eq!(event.data["transaction_id"], tx.id);
    assert_eq!(event.data["final_amount"].as_f64(), Some(250.0));

    let rows = common::outbox_rows(&pool, order_id).await;
    assert!(rows.iter().all(|(_, _, processed)| *processed));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_mark_processed_is_idempotent() {
    let pool = common::setup_test_db().await;
    let store = PgOutboxStore::new(pool.clone());
    let order_id = common::unique_order_id();

    let id = store
        .append(&NewOutboxEvent::failed(order_id, "test").unwrap())
        .await
        .unwrap();

    store.mark_processed(id).await.unwrap();
    let first: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT processed_at FROM outbox_events WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();

    store.mark_processed(id).await.unwrap();
    let second: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT processed_at FROM outbox_events WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
    assert!(store
        .fetch_unprocessed()
        .await
        .unwrap()
        .iter()
        .all(|e| e.id != id));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_fetch_unprocessed_keeps_creation_order() {
    let pool = common::setup_test_db().await;
    let store = PgOutboxStore::new(pool.clone());
    let order_id = common::unique_order_id();

    let first = store.append(&NewOutboxEvent::failed(order_id, "first").unwrap()).await.unwrap();
    let second = store.append(&NewOutboxEvent::failed(order_id, "second").unwrap()).await.unwrap();

    let ids: Vec<i64> = store
        .fetch_unprocessed()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.aggregate_id == order_id)
        .map(|e| e.id)
        .collect();

    assert_eq!(ids, vec![first, second]);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_outbox_append_failure_rolls_back_transaction() {
    let pool = common::setup_test_db().await;
    let processor = TransactionProcessor::new(pool.clone());
    let order_id = common::unique_order_id();

    // Reject the COMPLETED event of this order only
    let function = format!("reject_completed_{}", order_id);
    let trigger = format!("reject_completed_{}_trg", order_id);
    sqlx::query(&format!(
        r#"
        CREATE FUNCTION {function}() RETURNS trigger AS $$
        BEGIN
            IF NEW.event_type = 'SALES_TRANSACTION_COMPLETED' AND NEW.aggregate_id = {order_id} THEN
                RAISE EXCEPTION 'outbox rejected completed event';
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#
    ))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "CREATE TRIGGER {trigger} BEFORE INSERT ON outbox_events \
         FOR EACH ROW EXECUTE FUNCTION {function}()"
    ))
    .execute(&pool)
    .await
    .unwrap();

    let result = processor
        .process(
            ProcessTransactionCommand::new(order_id, 1, Amount::new(dec!(100)).unwrap()),
            &OperationContext::direct(),
        )
        .await;

    sqlx::query(&format!("DROP TRIGGER {trigger} ON outbox_events"))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&format!("DROP FUNCTION {function}()"))
        .execute(&pool)
        .await
        .unwrap();

    let err = result.unwrap_err();
    assert!(
        matches!(err, AppError::Outbox(OutboxError::Database(_))),
        "unexpected error: {}",
        err
    );
    assert!(err.to_string().contains("outbox rejected completed event"));

    // The transaction row went down with the rejected event
    assert_eq!(common::transaction_count(&pool, order_id).await, 0);
    assert!(processor.find_by_order(order_id).await.unwrap().is_none());

    let rows = common::outbox_rows(&pool, order_id).await;
    let types: Vec<&str> = rows.iter().map(|(t, _, _)| t.as_str()).collect();
    assert_eq!(types, vec!["SALES_TRANSACTION_FAILED"]);
    assert!(!rows[0].1["error"].as_str().unwrap_or_default().is_empty());
}
