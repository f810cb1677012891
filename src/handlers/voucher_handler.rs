//! Voucher Handler

use sqlx::PgPool;

use crate::domain::Voucher;
use crate::error::AppError;

use super::CreateVoucherCommand;

/// Issues and lists discount vouchers
#[derive(Debug, Clone)]
pub struct VoucherService {
    pool: PgPool,
}

impl VoucherService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All active vouchers, oldest first
    pub async fn list_active(&self) -> Result<Vec<Voucher>, AppError> {
        let vouchers = sqlx::query_as::<_, Voucher>(
            r#"
            SELECT id, code, discount_percent, max_discount, is_active, created_at
            FROM vouchers
            WHERE is_active = TRUE
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(vouchers)
    }

    /// Issue a voucher. Codes are unique.
    pub async fn create(&self, command: CreateVoucherCommand) -> Result<Voucher, AppError> {
        let result = sqlx::query_as::<_, Voucher>(
            r#"
            INSERT INTO vouchers (code, discount_percent, max_discount)
            VALUES ($1, $2, $3)
            RETURNING id, code, discount_percent, max_discount, is_active, created_at
            "#,
        )
        .bind(&command.code)
        .bind(command.discount_percent.value())
        .bind(command.max_discount)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(voucher) => {
                tracing::info!(
                    voucher_id = voucher.id,
                    code = %voucher.code,
                    discount_percent = %voucher.discount_percent,
                    "Voucher created"
                );
                Ok(voucher)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::VoucherCodeTaken(command.code))
            }
            Err(e) => Err(e.into()),
        }
    }
}
