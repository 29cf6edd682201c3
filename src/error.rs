use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MillError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Batch {batch_code}: requested {requested} kg but only {available} kg remaining")]
    InsufficientBatchBalance {
        batch_code: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Material balance mismatch: consumed {consumed} kg != produced {produced} kg + waste {waste} kg")]
    MaterialBalanceMismatch {
        consumed: Decimal,
        produced: Decimal,
        waste: Decimal,
    },

    #[error("Produced {produced} kg exceeds consumed {consumed} kg")]
    EfficiencyExceeded { consumed: Decimal, produced: Decimal },

    #[error("No production output recorded for {0}")]
    NoProductionForDate(NaiveDate),

    #[error("Invoice number {0} already exists")]
    DuplicateInvoiceNumber(String),

    #[error("Payment exceeds invoice balance: {remaining} remaining")]
    PaymentExceedsBalance { remaining: Decimal },

    #[error("Invoice has recorded payments; delete them first")]
    InvoiceHasPayments,

    #[error("Batch has recorded consumption")]
    BatchInUse,

    #[error("Could not allocate a unique batch code")]
    CodeExhausted,

    #[error("Concurrent modification, aborted after retries")]
    ConcurrentModification,

    #[error("{0} not found")]
    NotFound(String),
}

pub type MillResult<T> = Result<T, MillError>;

impl MillError {
    /// Stable machine-readable code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            MillError::Database(_) => "database",
            MillError::Migration(_) => "migration",
            MillError::Validation(_) => "validation",
            MillError::InvalidQuantity(_) => "invalid_quantity",
            MillError::InsufficientBatchBalance { .. } => "insufficient_batch_balance",
            MillError::MaterialBalanceMismatch { .. } => "material_balance_mismatch",
            MillError::EfficiencyExceeded { .. } => "efficiency_exceeded",
            MillError::NoProductionForDate(_) => "no_production_for_date",
            MillError::DuplicateInvoiceNumber(_) => "duplicate_invoice_number",
            MillError::PaymentExceedsBalance { .. } => "payment_exceeds_balance",
            MillError::InvoiceHasPayments => "invoice_has_payments",
            MillError::BatchInUse => "batch_in_use",
            MillError::CodeExhausted => "code_exhausted",
            MillError::ConcurrentModification => "concurrent_modification",
            MillError::NotFound(_) => "not_found",
        }
    }
}

impl IntoResponse for MillError {
    fn into_response(self) -> Response {
        let status = match &self {
            MillError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MillError::Migration(e) => {
                tracing::error!("Migration error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MillError::NotFound(_) => StatusCode::NOT_FOUND,
            MillError::DuplicateInvoiceNumber(_) | MillError::ConcurrentModification => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "success": false,
            "code": self.code(),
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
