use crate::audit::{AuditEvent, AuditSink};
use crate::db::{DbPool, OutwardEntry, YarnStockRow};
use crate::error::{MillError, MillResult};
use crate::state::AppState;
use axum::extract::{Json, Path, State as AxumState};
use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::production::split_bags;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutwardInput {
    pub date: String,
    pub yarn_count: String,
    pub weight_kg: Decimal,
    pub destination: Option<String>,
    pub notes: Option<String>,
}

/// Per-count stock, recomputed from production and dispatch on every read.
pub async fn yarn_stock(pool: &DbPool) -> MillResult<Vec<YarnStockRow>> {
    Ok(sqlx::query_as::<_, YarnStockRow>(
        "SELECT yarn_count,
                SUM(produced_kg) AS produced_kg,
                SUM(dispatched_kg) AS dispatched_kg,
                SUM(produced_kg) - SUM(dispatched_kg) AS stock_kg
         FROM (
             SELECT yarn_count, weight_kg AS produced_kg, 0::numeric AS dispatched_kg
             FROM production_outputs
             UNION ALL
             SELECT yarn_count, 0::numeric, weight_kg
             FROM outward_entries
         ) t
         GROUP BY yarn_count
         ORDER BY yarn_count",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn record_outward(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: RecordOutwardInput,
) -> MillResult<OutwardEntry> {
    let date = super::parse_date(&input.date)?;
    let yarn_count = input.yarn_count.trim().to_string();
    if yarn_count.is_empty() {
        return Err(MillError::Validation("yarn count must not be empty".into()));
    }
    if input.weight_kg <= Decimal::ZERO {
        return Err(MillError::InvalidQuantity(format!(
            "dispatch weight must be positive, got {}",
            input.weight_kg
        )));
    }

    let mut tx = pool.begin().await?;

    // Stock is a derived aggregate with no single row to lock, so
    // concurrent dispatches of the same count are serialized on an
    // advisory lock held until this transaction ends.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&yarn_count)
        .execute(&mut *tx)
        .await?;

    let stock: Decimal = sqlx::query_scalar(
        "SELECT COALESCE((SELECT SUM(weight_kg) FROM production_outputs WHERE yarn_count = $1), 0)
              - COALESCE((SELECT SUM(weight_kg) FROM outward_entries WHERE yarn_count = $1), 0)",
    )
    .bind(&yarn_count)
    .fetch_one(&mut *tx)
    .await?;

    if input.weight_kg > stock {
        return Err(MillError::InvalidQuantity(format!(
            "dispatch of {} kg exceeds {} kg in stock for count {}",
            input.weight_kg, stock, yarn_count
        )));
    }

    let (bags, loose) = split_bags(input.weight_kg);
    let entry = sqlx::query_as::<_, OutwardEntry>(
        "INSERT INTO outward_entries (outward_date, yarn_count, weight_kg, bag_count, loose_kg, destination, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(date)
    .bind(&yarn_count)
    .bind(input.weight_kg)
    .bind(bags)
    .bind(loose)
    .bind(&input.destination)
    .bind(&input.notes)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    audit.record(AuditEvent::new(
        "outward.create",
        format!("outward:{}", entry.outward_id),
        actor,
    ));
    Ok(entry)
}

pub async fn delete_outward(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    outward_id: i32,
) -> MillResult<()> {
    let result = sqlx::query("DELETE FROM outward_entries WHERE outward_id = $1")
        .bind(outward_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(MillError::NotFound(format!("Outward entry {}", outward_id)));
    }

    audit.record(AuditEvent::new(
        "outward.delete",
        format!("outward:{}", outward_id),
        actor,
    ));
    Ok(())
}

pub async fn list_outward(pool: &DbPool) -> MillResult<Vec<OutwardEntry>> {
    Ok(sqlx::query_as::<_, OutwardEntry>(
        "SELECT * FROM outward_entries ORDER BY outward_date DESC, outward_id DESC",
    )
    .fetch_all(pool)
    .await?)
}

// --- Axum Handlers ---

pub async fn yarn_stock_axum(
    AxumState(state): AxumState<AppState>,
) -> MillResult<Json<Vec<YarnStockRow>>> {
    Ok(Json(yarn_stock(&state.pool).await?))
}

pub async fn list_outward_axum(
    AxumState(state): AxumState<AppState>,
) -> MillResult<Json<Vec<OutwardEntry>>> {
    Ok(Json(list_outward(&state.pool).await?))
}

pub async fn record_outward_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<RecordOutwardInput>,
) -> MillResult<Json<OutwardEntry>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_outward(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn delete_outward_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Path(outward_id): Path<i32>,
) -> MillResult<Json<()>> {
    let actor = super::actor_from_headers(&headers);
    delete_outward(&state.pool, state.audit.as_ref(), actor, outward_id).await?;
    Ok(Json(()))
}
