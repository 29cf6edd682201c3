use crate::audit::{AuditEvent, AuditSink};
use crate::db::{DbPool, Invoice, InvoiceItem, Payment};
use crate::error::{MillError, MillResult};
use crate::state::AppState;
use axum::extract::{Json, Path, Query, State as AxumState};
use axum::http::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::production::TOLERANCE;

/// CGST and SGST are each 9% of the subtotal.
pub const GST_RATE: Decimal = dec!(0.09);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Bank,
    Upi,
    Cheque,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Bank => "BANK",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Cheque => "CHEQUE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
        }
    }
}

/// Status is always derived, never entered: zero paid is UNPAID, within
/// tolerance of the total is PAID, anything in between is PARTIAL.
pub fn derive_status(amount_paid: Decimal, total: Decimal) -> InvoiceStatus {
    if amount_paid <= Decimal::ZERO {
        InvoiceStatus::Unpaid
    } else if amount_paid >= total - TOLERANCE {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Partial
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub yarn_count: String,
    #[serde(default)]
    pub bags: i32,
    pub weight_kg: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceInput {
    pub invoice_no: String,
    pub date: String,
    pub customer: String,
    pub line_items: Vec<LineItemInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentInput {
    pub invoice_id: i32,
    pub date: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub total: Decimal,
}

pub fn invoice_totals(items: &[LineItemInput]) -> InvoiceTotals {
    let subtotal: Decimal = items
        .iter()
        .map(|i| (i.weight_kg * i.rate).round_dp(2))
        .sum();
    let cgst = (subtotal * GST_RATE).round_dp(2);
    let sgst = cgst;
    InvoiceTotals {
        subtotal,
        cgst,
        sgst,
        total: subtotal + cgst + sgst,
    }
}

fn validate_invoice_input(input: &CreateInvoiceInput) -> MillResult<()> {
    if input.invoice_no.trim().is_empty() {
        return Err(MillError::Validation("invoice number must not be empty".into()));
    }
    if input.customer.trim().is_empty() {
        return Err(MillError::Validation("customer must not be empty".into()));
    }
    if input.line_items.is_empty() {
        return Err(MillError::Validation(
            "invoice must have at least one line item".into(),
        ));
    }
    for item in &input.line_items {
        if item.yarn_count.trim().is_empty() {
            return Err(MillError::Validation("yarn count must not be empty".into()));
        }
        if item.weight_kg <= Decimal::ZERO || item.rate <= Decimal::ZERO {
            return Err(MillError::InvalidQuantity(format!(
                "line item for {} must have positive weight and rate",
                item.yarn_count
            )));
        }
        if item.bags < 0 {
            return Err(MillError::InvalidQuantity(format!(
                "bag count must not be negative, got {}",
                item.bags
            )));
        }
    }
    Ok(())
}

fn map_unique_violation(err: sqlx::Error, invoice_no: &str) -> MillError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            MillError::DuplicateInvoiceNumber(invoice_no.to_string())
        }
        _ => MillError::Database(err),
    }
}

pub async fn create_invoice(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: CreateInvoiceInput,
) -> MillResult<InvoiceDetail> {
    let date = super::parse_date(&input.date)?;
    validate_invoice_input(&input)?;
    let invoice_no = input.invoice_no.trim().to_string();
    let totals = invoice_totals(&input.line_items);

    let mut tx = pool.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        "INSERT INTO invoices (invoice_no, invoice_date, customer, subtotal, cgst, sgst, total, amount_paid, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 'UNPAID')
         RETURNING *",
    )
    .bind(&invoice_no)
    .bind(date)
    .bind(input.customer.trim())
    .bind(totals.subtotal)
    .bind(totals.cgst)
    .bind(totals.sgst)
    .bind(totals.total)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_unique_violation(e, &invoice_no))?;

    for item in &input.line_items {
        sqlx::query(
            "INSERT INTO invoice_items (invoice_id, yarn_count, bags, weight_kg, rate, amount)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(invoice.invoice_id)
        .bind(item.yarn_count.trim())
        .bind(item.bags)
        .bind(item.weight_kg)
        .bind(item.rate)
        .bind((item.weight_kg * item.rate).round_dp(2))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "invoice.create",
        format!("invoice:{}", invoice.invoice_no),
        actor,
    ));
    fetch_invoice_detail(pool, invoice.invoice_id).await
}

pub async fn record_payment(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: RecordPaymentInput,
) -> MillResult<Payment> {
    let date = super::parse_date(&input.date)?;
    if input.amount <= Decimal::ZERO {
        return Err(MillError::InvalidQuantity(format!(
            "payment amount must be positive, got {}",
            input.amount
        )));
    }

    let mut tx = pool.begin().await?;

    let invoice: Option<(String, Decimal, Decimal)> = sqlx::query_as(
        "SELECT invoice_no, total, amount_paid FROM invoices WHERE invoice_id = $1 FOR UPDATE",
    )
    .bind(input.invoice_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (invoice_no, total, amount_paid) = match invoice {
        Some(row) => row,
        None => return Err(MillError::NotFound(format!("Invoice {}", input.invoice_id))),
    };

    let remaining = total - amount_paid;
    if input.amount > remaining + TOLERANCE {
        return Err(MillError::PaymentExceedsBalance { remaining });
    }

    let payment = sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (invoice_id, payment_date, amount, method, reference, notes)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(input.invoice_id)
    .bind(date)
    .bind(input.amount)
    .bind(input.method.as_str())
    .bind(&input.reference)
    .bind(&input.notes)
    .fetch_one(&mut *tx)
    .await?;

    let new_paid = amount_paid + input.amount;
    sqlx::query(
        "UPDATE invoices SET amount_paid = $1, status = $2, updated_at = CURRENT_TIMESTAMP
         WHERE invoice_id = $3",
    )
    .bind(new_paid)
    .bind(derive_status(new_paid, total).as_str())
    .bind(input.invoice_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "payment.create",
        format!("invoice:{}", invoice_no),
        actor,
    ));
    Ok(payment)
}

pub async fn delete_payment(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    payment_id: i32,
) -> MillResult<()> {
    let mut tx = pool.begin().await?;

    let payment: Option<(i32, Decimal)> =
        sqlx::query_as("SELECT invoice_id, amount FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?;

    let (invoice_id, amount) = match payment {
        Some(row) => row,
        None => return Err(MillError::NotFound(format!("Payment {}", payment_id))),
    };

    let (invoice_no, total, amount_paid): (String, Decimal, Decimal) = sqlx::query_as(
        "SELECT invoice_no, total, amount_paid FROM invoices WHERE invoice_id = $1 FOR UPDATE",
    )
    .bind(invoice_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM payments WHERE payment_id = $1")
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

    // Floor at zero so a drifted amount_paid can never go negative.
    let new_paid = (amount_paid - amount).max(Decimal::ZERO);
    sqlx::query(
        "UPDATE invoices SET amount_paid = $1, status = $2, updated_at = CURRENT_TIMESTAMP
         WHERE invoice_id = $3",
    )
    .bind(new_paid)
    .bind(derive_status(new_paid, total).as_str())
    .bind(invoice_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "payment.delete",
        format!("invoice:{}", invoice_no),
        actor,
    ));
    Ok(())
}

pub async fn delete_invoice(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    invoice_id: i32,
) -> MillResult<()> {
    let mut tx = pool.begin().await?;

    let invoice_no: Option<String> =
        sqlx::query_scalar("SELECT invoice_no FROM invoices WHERE invoice_id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_optional(&mut *tx)
            .await?;

    let invoice_no = match invoice_no {
        Some(no) => no,
        None => return Err(MillError::NotFound(format!("Invoice {}", invoice_id))),
    };

    let payment_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_one(&mut *tx)
            .await?;

    if payment_count > 0 {
        return Err(MillError::InvoiceHasPayments);
    }

    sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "invoice.delete",
        format!("invoice:{}", invoice_no),
        actor,
    ));
    Ok(())
}

async fn fetch_invoice_detail(pool: &DbPool, invoice_id: i32) -> MillResult<InvoiceDetail> {
    let invoice =
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| MillError::NotFound(format!("Invoice {}", invoice_id)))?;

    let items = sqlx::query_as::<_, InvoiceItem>(
        "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY id",
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;

    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE invoice_id = $1 ORDER BY payment_date, payment_id",
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;

    Ok(InvoiceDetail {
        invoice,
        items,
        payments,
    })
}

pub async fn list_invoices(
    pool: &DbPool,
    status: Option<InvoiceStatus>,
) -> MillResult<Vec<Invoice>> {
    Ok(sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices
         WHERE ($1::text IS NULL OR status = $1)
         ORDER BY invoice_date DESC, invoice_id DESC",
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?)
}

// --- Axum Handlers ---

#[derive(Debug, Deserialize)]
pub struct InvoiceSearchQuery {
    pub status: Option<InvoiceStatus>,
}

pub async fn list_invoices_axum(
    AxumState(state): AxumState<AppState>,
    Query(query): Query<InvoiceSearchQuery>,
) -> MillResult<Json<Vec<Invoice>>> {
    Ok(Json(list_invoices(&state.pool, query.status).await?))
}

pub async fn get_invoice_axum(
    AxumState(state): AxumState<AppState>,
    Path(invoice_id): Path<i32>,
) -> MillResult<Json<InvoiceDetail>> {
    Ok(Json(fetch_invoice_detail(&state.pool, invoice_id).await?))
}

pub async fn create_invoice_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateInvoiceInput>,
) -> MillResult<Json<InvoiceDetail>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        create_invoice(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn record_payment_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<RecordPaymentInput>,
) -> MillResult<Json<Payment>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_payment(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn delete_payment_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<i32>,
) -> MillResult<Json<()>> {
    let actor = super::actor_from_headers(&headers);
    delete_payment(&state.pool, state.audit.as_ref(), actor, payment_id).await?;
    Ok(Json(()))
}

pub async fn delete_invoice_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<i32>,
) -> MillResult<Json<()>> {
    let actor = super::actor_from_headers(&headers);
    delete_invoice(&state.pool, state.audit.as_ref(), actor, invoice_id).await?;
    Ok(Json(()))
}
