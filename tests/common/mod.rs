//! Common test utilities

#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database and bring the schema up to date.
///
/// Tests share the database and run concurrently, so nothing is truncated;
/// every test works on its own order IDs and voucher codes instead.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sales_saga::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Order ID no other test uses
pub fn unique_order_id() -> i64 {
    (Uuid::new_v4().as_u128() % 1_000_000_000_000) as i64 + 1
}

/// Voucher code no other test uses
pub fn unique_code(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

/// (event_type, event_data, processed) for every outbox row of an order, oldest first
pub async fn outbox_rows(pool: &PgPool, order_id: i64) -> Vec<(String, serde_json::Value, bool)> {
    sqlx::query_as(
        r#"
        SELECT event_type, event_data, processed
        FROM outbox_events
        WHERE aggregate_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .expect("Failed to read outbox")
}

pub async fn transaction_count(pool: &PgPool, order_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM sales_transactions WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count transactions")
}
