//! Transaction Handler
//!
//! Records sales transactions together with their outcome event.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{
    OperationContext, Pricing, SalesCompletedData, SalesTransaction, SalesTransactionView,
    TransactionStatus, Voucher,
};
use crate::error::AppError;
use crate::outbox::{NewOutboxEvent, PgOutboxStore};

use super::{OrderCreatedCommand, ProcessTransactionCommand};

/// What to record, after the entry path has been resolved
#[derive(Debug, Clone)]
struct TransactionDraft<'a> {
    order_id: i64,
    customer_id: i64,
    original_amount: Decimal,
    /// `None` skips the voucher lookup entirely
    voucher_code: Option<&'a str>,
    status: TransactionStatus,
}

/// Transaction Processor
///
/// Every attempt ends in exactly one of:
/// - a transaction row plus a `SALES_TRANSACTION_COMPLETED` outbox event,
///   committed together
/// - no transaction row and one `SALES_TRANSACTION_FAILED` outbox event
///   written in a separate unit (best effort)
#[derive(Debug, Clone)]
pub struct TransactionProcessor {
    pool: PgPool,
    outbox: PgOutboxStore,
}

impl TransactionProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            outbox: PgOutboxStore::new(pool.clone()),
            pool,
        }
    }

    /// Direct path: apply the voucher, if any, and complete immediately
    pub async fn process(
        &self,
        command: ProcessTransactionCommand,
        context: &OperationContext,
    ) -> Result<SalesTransaction, AppError> {
        let draft = TransactionDraft {
            order_id: command.order_id,
            customer_id: command.customer_id,
            original_amount: command.original_amount.value(),
            voucher_code: command.effective_voucher_code(),
            status: TransactionStatus::Completed,
        };

        self.record(draft, context).await
    }

    /// Saga path: no voucher, recorded as pending
    pub async fn process_order_created(
        &self,
        command: OrderCreatedCommand,
        context: &OperationContext,
    ) -> Result<SalesTransaction, AppError> {
        let draft = TransactionDraft {
            order_id: command.order_id,
            customer_id: command.customer_id,
            original_amount: command.total_amount,
            voucher_code: None,
            status: TransactionStatus::Pending,
        };

        self.record(draft, context).await
    }

    /// Latest transaction recorded for an order, with its voucher code
    pub async fn find_by_order(
        &self,
        order_id: i64,
    ) -> Result<Option<SalesTransactionView>, AppError> {
        let view = sqlx::query_as::<_, SalesTransactionView>(
            r#"
            SELECT st.id, st.order_id, st.customer_id, st.voucher_id,
                   st.original_amount, st.discount_amount, st.final_amount,
                   st.status, st.created_at,
                   v.code AS voucher_code
            FROM sales_transactions st
            LEFT JOIN vouchers v ON v.id = st.voucher_id
            WHERE st.order_id = $1
            ORDER BY st.created_at DESC, st.id DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(view)
    }

    async fn record(
        &self,
        draft: TransactionDraft<'_>,
        context: &OperationContext,
    ) -> Result<SalesTransaction, AppError> {
        match self.record_atomic(&draft).await {
            Ok(transaction) => {
                tracing::info!(
                    correlation_id = %context.correlation_id,
                    entry_point = ?context.entry_point,
                    order_id = transaction.order_id,
                    transaction_id = transaction.id,
                    final_amount = %transaction.final_amount,
                    discount_amount = %transaction.discount_amount,
                    status = %transaction.status,
                    "Sales transaction recorded"
                );
                Ok(transaction)
            }
            Err(e) => {
                tracing::warn!(
                    correlation_id = %context.correlation_id,
                    entry_point = ?context.entry_point,
                    order_id = draft.order_id,
                    error = %e,
                    "Sales transaction failed"
                );
                self.record_failure(draft.order_id, &e).await;
                Err(e)
            }
        }
    }

    /// Primary unit. Rolled back in full before returning any error.
    async fn record_atomic(
        &self,
        draft: &TransactionDraft<'_>,
    ) -> Result<SalesTransaction, AppError> {
        let mut tx = self.pool.begin().await?;

        match self.write_unit(&mut tx, draft).await {
            Ok(transaction) => {
                tx.commit().await?;
                Ok(transaction)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        order_id = draft.order_id,
                        error = %rollback_err,
                        "Rollback failed; the connection drop discards the unit"
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_unit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        draft: &TransactionDraft<'_>,
    ) -> Result<SalesTransaction, AppError> {
        let pricing = match draft.voucher_code {
            Some(code) => {
                let voucher = Self::find_active_voucher(tx, code).await?;
                if voucher.is_none() {
                    tracing::debug!(
                        order_id = draft.order_id,
                        voucher_code = code,
                        "Voucher not found or inactive; no discount applied"
                    );
                }
                Pricing::compute(draft.original_amount, voucher.as_ref())?
            }
            None => Pricing::without_discount(draft.original_amount),
        };

        let transaction = sqlx::query_as::<_, SalesTransaction>(
            r#"
            INSERT INTO sales_transactions
                (order_id, customer_id, voucher_id, original_amount,
                 discount_amount, final_amount, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, order_id, customer_id, voucher_id, original_amount,
                      discount_amount, final_amount, status, created_at
            "#,
        )
        .bind(draft.order_id)
        .bind(draft.customer_id)
        .bind(pricing.voucher_id)
        .bind(pricing.original_amount)
        .bind(pricing.discount_amount)
        .bind(pricing.final_amount)
        .bind(draft.status.as_str())
        .fetch_one(&mut **tx)
        .await?;

        let event = NewOutboxEvent::completed(
            transaction.order_id,
            &SalesCompletedData {
                transaction_id: transaction.id,
                final_amount: transaction.final_amount,
                discount_amount: transaction.discount_amount,
            },
        )?;
        self.outbox.append_in_tx(tx, &event).await?;

        Ok(transaction)
    }

    async fn find_active_voucher(
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> Result<Option<Voucher>, AppError> {
        let voucher = sqlx::query_as::<_, Voucher>(
            r#"
            SELECT id, code, discount_percent, max_discount, is_active, created_at
            FROM vouchers
            WHERE code = $1 AND is_active = TRUE
            "#,
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(voucher)
    }

    /// Fallback unit on its own connection. Failures are logged, not retried.
    async fn record_failure(&self, order_id: i64, cause: &AppError) {
        let appended = match NewOutboxEvent::failed(order_id, cause.to_string()) {
            Ok(event) => self.outbox.append(&event).await,
            Err(e) => Err(e),
        };

        if let Err(e) = appended {
            tracing::error!(
                order_id,
                cause = %cause,
                error = %e,
                "Failed to record SALES_TRANSACTION_FAILED event; outcome is lost"
            );
        }
    }
}
