use crate::audit::{AuditEvent, AuditSink};
use crate::db::{Batch, BatchWithBalance, DbPool};
use crate::error::{MillError, MillResult};
use crate::state::AppState;
use axum::extract::{Json, Path, State as AxumState};
use axum::http::HeaderMap;
use chrono::NaiveDate;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const MAX_BALE_COUNT: i32 = 9999;
pub const MAX_BATCH_WEIGHT_KG: Decimal = dec!(999999);

/// Soft data-quality bounds on average bale weight. Outside this band the
/// batch is still accepted but a warning travels back to the caller.
pub const MIN_AVG_BALE_KG: Decimal = dec!(10);
pub const MAX_AVG_BALE_KG: Decimal = dec!(500);

const CODE_RETRY_LIMIT: u32 = 16;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchInput {
    pub date: String,
    pub supplier: String,
    pub bale_count: i32,
    pub weight_kg: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatchInput {
    pub batch_id: i32,
    pub date: String,
    pub supplier: String,
    pub bale_count: i32,
    pub weight_kg: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBatch {
    pub batch: Batch,
    /// Advisory only; never blocks acceptance.
    pub warning: Option<String>,
}

pub fn validate_batch_numbers(bale_count: i32, weight_kg: Decimal) -> MillResult<()> {
    if bale_count <= 0 || bale_count > MAX_BALE_COUNT {
        return Err(MillError::InvalidQuantity(format!(
            "bale count must be between 1 and {}, got {}",
            MAX_BALE_COUNT, bale_count
        )));
    }
    if weight_kg <= Decimal::ZERO || weight_kg > MAX_BATCH_WEIGHT_KG {
        return Err(MillError::InvalidQuantity(format!(
            "batch weight must be between 0 and {} kg, got {}",
            MAX_BATCH_WEIGHT_KG, weight_kg
        )));
    }
    Ok(())
}

pub fn avg_bale_weight_warning(bale_count: i32, weight_kg: Decimal) -> Option<String> {
    let avg = (weight_kg / Decimal::from(bale_count)).round_dp(2);
    if avg < MIN_AVG_BALE_KG {
        Some(format!(
            "average bale weight {} kg is below {} kg; check the entry",
            avg, MIN_AVG_BALE_KG
        ))
    } else if avg > MAX_AVG_BALE_KG {
        Some(format!(
            "average bale weight {} kg is above {} kg; check the entry",
            avg, MAX_AVG_BALE_KG
        ))
    } else {
        None
    }
}

/// Codes look like `202608QX7`: receipt month plus a random 3-char suffix.
pub fn batch_code_prefix(date: NaiveDate) -> String {
    date.format("%Y%m").to_string()
}

fn random_code_suffix(rng: &mut impl Rng) -> String {
    (0..3)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub async fn create_batch(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: CreateBatchInput,
) -> MillResult<CreatedBatch> {
    // The rng must stay a per-attempt temporary: ThreadRng is not Send and
    // would poison the handler future if held across an await.
    create_batch_with_suffixes(pool, audit, actor, input, || {
        random_code_suffix(&mut rand::thread_rng())
    })
    .await
}

/// Suffix source injected by the caller; `create_batch` draws random ones.
pub async fn create_batch_with_suffixes(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: CreateBatchInput,
    mut next_suffix: impl FnMut() -> String,
) -> MillResult<CreatedBatch> {
    let date = super::parse_date(&input.date)?;
    let supplier = input.supplier.trim().to_string();
    if supplier.is_empty() {
        return Err(MillError::Validation("supplier must not be empty".into()));
    }
    validate_batch_numbers(input.bale_count, input.weight_kg)?;
    let warning = avg_bale_weight_warning(input.bale_count, input.weight_kg);

    let prefix = batch_code_prefix(date);

    // On collision with an existing code for the same month we regenerate,
    // bounded so pathological collision rates fail deterministically
    // instead of looping.
    for _ in 0..CODE_RETRY_LIMIT {
        let code = format!("{}{}", prefix, next_suffix());
        let inserted = sqlx::query_as::<_, Batch>(
            "INSERT INTO batches (batch_code, received_date, supplier, bale_count, total_weight_kg)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (batch_code) DO NOTHING
             RETURNING *",
        )
        .bind(&code)
        .bind(date)
        .bind(&supplier)
        .bind(input.bale_count)
        .bind(input.weight_kg)
        .fetch_optional(pool)
        .await?;

        if let Some(batch) = inserted {
            audit.record(AuditEvent::new(
                "batch.create",
                format!("batch:{}", batch.batch_code),
                actor,
            ));
            return Ok(CreatedBatch { batch, warning });
        }
    }

    Err(MillError::CodeExhausted)
}

pub async fn remaining_balance(pool: &DbPool, batch_id: i32) -> MillResult<Decimal> {
    let remaining: Option<Decimal> = sqlx::query_scalar(
        "SELECT b.total_weight_kg - COALESCE(SUM(pc.weight_kg), 0)
         FROM batches b
         LEFT JOIN production_consumptions pc ON pc.batch_id = b.batch_id
         WHERE b.batch_id = $1
         GROUP BY b.batch_id, b.total_weight_kg",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    remaining.ok_or_else(|| MillError::NotFound(format!("Batch {}", batch_id)))
}

const BATCH_BALANCE_SELECT: &str = "SELECT b.batch_id, b.batch_code, b.received_date, b.supplier, b.bale_count, b.total_weight_kg,
        COALESCE(SUM(pc.weight_kg), 0) AS consumed_kg,
        b.total_weight_kg - COALESCE(SUM(pc.weight_kg), 0) AS remaining_kg,
        b.created_at, b.updated_at
     FROM batches b
     LEFT JOIN production_consumptions pc ON pc.batch_id = b.batch_id
     GROUP BY b.batch_id";

pub async fn list_batches(pool: &DbPool) -> MillResult<Vec<BatchWithBalance>> {
    Ok(sqlx::query_as::<_, BatchWithBalance>(&format!(
        "{} ORDER BY b.received_date DESC, b.batch_id DESC",
        BATCH_BALANCE_SELECT
    ))
    .fetch_all(pool)
    .await?)
}

/// Batches still holding cotton, offered to production entry.
pub async fn list_available(pool: &DbPool) -> MillResult<Vec<BatchWithBalance>> {
    Ok(sqlx::query_as::<_, BatchWithBalance>(&format!(
        "{} HAVING b.total_weight_kg - COALESCE(SUM(pc.weight_kg), 0) > 0
         ORDER BY b.received_date ASC, b.batch_id ASC",
        BATCH_BALANCE_SELECT
    ))
    .fetch_all(pool)
    .await?)
}

pub async fn update_batch(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: UpdateBatchInput,
) -> MillResult<Batch> {
    let date = super::parse_date(&input.date)?;
    let supplier = input.supplier.trim().to_string();
    if supplier.is_empty() {
        return Err(MillError::Validation("supplier must not be empty".into()));
    }
    validate_batch_numbers(input.bale_count, input.weight_kg)?;

    let mut tx = pool.begin().await?;

    let current: Option<(String, Decimal)> = sqlx::query_as(
        "SELECT batch_code, total_weight_kg FROM batches WHERE batch_id = $1 FOR UPDATE",
    )
    .bind(input.batch_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (batch_code, stored_weight) = match current {
        Some(row) => row,
        None => return Err(MillError::NotFound(format!("Batch {}", input.batch_id))),
    };

    // The code prefix is derived from the receipt month; the date may move
    // within that month but never out of it.
    if !batch_code.starts_with(&batch_code_prefix(date)) {
        return Err(MillError::Validation(format!(
            "batch {} is coded for month {}; received date must stay in that month",
            batch_code,
            &batch_code[..6]
        )));
    }

    let consumed: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(weight_kg), 0) FROM production_consumptions WHERE batch_id = $1",
    )
    .bind(input.batch_id)
    .fetch_one(&mut *tx)
    .await?;

    // Weight is frozen once production has drawn from the batch.
    if input.weight_kg != stored_weight && consumed > Decimal::ZERO {
        return Err(MillError::BatchInUse);
    }

    let updated = sqlx::query_as::<_, Batch>(
        "UPDATE batches
         SET received_date = $1, supplier = $2, bale_count = $3, total_weight_kg = $4,
             updated_at = CURRENT_TIMESTAMP
         WHERE batch_id = $5
         RETURNING *",
    )
    .bind(date)
    .bind(&supplier)
    .bind(input.bale_count)
    .bind(input.weight_kg)
    .bind(input.batch_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "batch.update",
        format!("batch:{}", batch_code),
        actor,
    ));
    Ok(updated)
}

pub async fn delete_batch(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    batch_id: i32,
) -> MillResult<()> {
    let mut tx = pool.begin().await?;

    let batch_code: Option<String> =
        sqlx::query_scalar("SELECT batch_code FROM batches WHERE batch_id = $1 FOR UPDATE")
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await?;

    let batch_code = match batch_code {
        Some(code) => code,
        None => return Err(MillError::NotFound(format!("Batch {}", batch_id))),
    };

    let consumed: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(weight_kg), 0) FROM production_consumptions WHERE batch_id = $1",
    )
    .bind(batch_id)
    .fetch_one(&mut *tx)
    .await?;

    if consumed > Decimal::ZERO {
        return Err(MillError::BatchInUse);
    }

    sqlx::query("DELETE FROM batches WHERE batch_id = $1")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "batch.delete",
        format!("batch:{}", batch_code),
        actor,
    ));
    Ok(())
}

// --- Axum Handlers ---

pub async fn list_batches_axum(
    AxumState(state): AxumState<AppState>,
) -> MillResult<Json<Vec<BatchWithBalance>>> {
    Ok(Json(list_batches(&state.pool).await?))
}

pub async fn list_available_axum(
    AxumState(state): AxumState<AppState>,
) -> MillResult<Json<Vec<BatchWithBalance>>> {
    Ok(Json(list_available(&state.pool).await?))
}

pub async fn remaining_balance_axum(
    AxumState(state): AxumState<AppState>,
    Path(batch_id): Path<i32>,
) -> MillResult<Json<Decimal>> {
    Ok(Json(remaining_balance(&state.pool, batch_id).await?))
}

pub async fn create_batch_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateBatchInput>,
) -> MillResult<Json<CreatedBatch>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        create_batch(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn update_batch_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<UpdateBatchInput>,
) -> MillResult<Json<Batch>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        update_batch(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn delete_batch_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<i32>,
) -> MillResult<Json<()>> {
    let actor = super::actor_from_headers(&headers);
    delete_batch(&state.pool, state.audit.as_ref(), actor, batch_id).await?;
    Ok(Json(()))
}
