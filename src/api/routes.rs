//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::domain::{
    validate_max_discount, Amount, DiscountPercent, OperationContext, SalesTransaction,
    SalesTransactionView, Voucher,
};
use crate::error::AppError;
use crate::handlers::{
    CreateVoucherCommand, ProcessTransactionCommand, TransactionProcessor, VoucherService,
};

/// Longest voucher code the schema stores
const MAX_VOUCHER_CODE_LEN: usize = 64;

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVoucherRequest {
    pub code: String,
    pub discount_percent: Decimal,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
}

impl CreateVoucherRequest {
    pub fn into_command(self) -> Result<CreateVoucherCommand, AppError> {
        let code = validate_voucher_code(&self.code)?
            .ok_or_else(|| AppError::InvalidRequest("code must not be empty".to_string()))?;
        let discount_percent = DiscountPercent::new(self.discount_percent)?;

        let command = CreateVoucherCommand::new(code, discount_percent);
        Ok(match self.max_discount {
            Some(max) => command.with_max_discount(validate_max_discount(max)?),
            None => command,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessTransactionRequest {
    pub order_id: i64,
    pub customer_id: i64,
    pub original_amount: Decimal,
    #[serde(default)]
    pub voucher_code: Option<String>,
}

impl ProcessTransactionRequest {
    pub fn into_command(self) -> Result<ProcessTransactionCommand, AppError> {
        if self.order_id <= 0 {
            return Err(AppError::InvalidRequest("order_id must be positive".to_string()));
        }
        if self.customer_id <= 0 {
            return Err(AppError::InvalidRequest("customer_id must be positive".to_string()));
        }
        let amount = Amount::new(self.original_amount)?;

        let command = ProcessTransactionCommand::new(self.order_id, self.customer_id, amount);
        let code = match &self.voucher_code {
            Some(code) => validate_voucher_code(code)?,
            None => None,
        };
        Ok(match code {
            Some(code) => command.with_voucher_code(code),
            None => command,
        })
    }
}

/// Trimmed code, `None` when blank, error when too long
fn validate_voucher_code(code: &str) -> Result<Option<String>, AppError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }
    if code.chars().count() > MAX_VOUCHER_CODE_LEN {
        return Err(AppError::InvalidRequest(format!(
            "voucher code must be at most {} characters",
            MAX_VOUCHER_CODE_LEN
        )));
    }
    Ok(Some(code.to_string()))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<PgPool> {
    Router::new()
        .route("/vouchers", get(list_vouchers).post(create_voucher))
        .route("/sales/process", post(process_transaction))
        .route("/sales/:order_id", get(get_transaction))
}

/// List active vouchers
async fn list_vouchers(State(pool): State<PgPool>) -> Result<Json<Vec<Voucher>>, AppError> {
    let vouchers = VoucherService::new(pool).list_active().await?;
    Ok(Json(vouchers))
}

/// Issue a voucher
async fn create_voucher(
    State(pool): State<PgPool>,
    Json(request): Json<CreateVoucherRequest>,
) -> Result<(StatusCode, Json<Voucher>), AppError> {
    let command = request.into_command()?;
    let voucher = VoucherService::new(pool).create(command).await?;
    Ok((StatusCode::CREATED, Json(voucher)))
}

/// Record a sales transaction synchronously
async fn process_transaction(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<ProcessTransactionRequest>,
) -> Result<Json<SalesTransaction>, AppError> {
    let command = request.into_command()?;
    let transaction = TransactionProcessor::new(pool)
        .process(command, &context)
        .await?;
    Ok(Json(transaction))
}

/// Latest transaction for an order
async fn get_transaction(
    State(pool): State<PgPool>,
    Path(order_id): Path<i64>,
) -> Result<Json<SalesTransactionView>, AppError> {
    TransactionProcessor::new(pool)
        .find_by_order(order_id)
        .await?
        .map(Json)
        .ok_or(AppError::TransactionNotFound(order_id))
}
