use crate::audit::{AuditEvent, AuditSink};
use crate::db::{DbPool, ProductionConsumption, ProductionEntry, ProductionOutput};
use crate::error::{MillError, MillResult};
use crate::state::AppState;
use axum::extract::{Json, Path, Query, State as AxumState};
use axum::http::HeaderMap;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed bag weight for yarn packing.
pub const BAG_WEIGHT_KG: Decimal = dec!(60);

/// Mass-balance and money comparisons share a one-paisa / ten-gram band.
pub const TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionInput {
    pub batch_id: i32,
    pub weight_kg: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputInput {
    pub yarn_count: String,
    pub weight_kg: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteInput {
    #[serde(default)]
    pub blow_room: Decimal,
    #[serde(default)]
    pub carding: Decimal,
    #[serde(default)]
    pub oe: Decimal,
    #[serde(default)]
    pub others: Decimal,
}

impl WasteInput {
    pub fn total(&self) -> Decimal {
        self.blow_room + self.carding + self.oe + self.others
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProductionInput {
    pub date: String,
    pub consumptions: Vec<ConsumptionInput>,
    pub outputs: Vec<OutputInput>,
    #[serde(default)]
    pub waste: WasteInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionDetail {
    pub entry: ProductionEntry,
    pub consumptions: Vec<ProductionConsumption>,
    pub outputs: Vec<ProductionOutput>,
}

/// `bags = floor(kg / 60)`, remainder carried as loose kilograms.
pub fn split_bags(weight_kg: Decimal) -> (i32, Decimal) {
    let bags = (weight_kg / BAG_WEIGHT_KG).floor();
    let loose = weight_kg - bags * BAG_WEIGHT_KG;
    (bags.to_i32().unwrap_or(0), loose.round_dp(2))
}

/// Input mass must equal output plus waste within tolerance. Output alone
/// exceeding input is reported as the more specific efficiency error.
pub fn check_material_balance(
    consumed: Decimal,
    produced: Decimal,
    waste: Decimal,
) -> MillResult<()> {
    if produced > consumed + TOLERANCE {
        return Err(MillError::EfficiencyExceeded { consumed, produced });
    }
    if (consumed - produced - waste).abs() > TOLERANCE {
        return Err(MillError::MaterialBalanceMismatch {
            consumed,
            produced,
            waste,
        });
    }
    Ok(())
}

fn validate_production_input(input: &RecordProductionInput) -> MillResult<()> {
    if input.consumptions.is_empty() {
        return Err(MillError::Validation(
            "at least one batch consumption is required".into(),
        ));
    }
    for c in &input.consumptions {
        if c.weight_kg <= Decimal::ZERO {
            return Err(MillError::InvalidQuantity(format!(
                "consumption from batch {} must be positive, got {}",
                c.batch_id, c.weight_kg
            )));
        }
    }
    for o in &input.outputs {
        if o.yarn_count.trim().is_empty() {
            return Err(MillError::Validation("yarn count must not be empty".into()));
        }
        if o.weight_kg <= Decimal::ZERO {
            return Err(MillError::InvalidQuantity(format!(
                "output for {} must be positive, got {}",
                o.yarn_count, o.weight_kg
            )));
        }
    }
    let w = &input.waste;
    for (name, value) in [
        ("blowRoom", w.blow_room),
        ("carding", w.carding),
        ("oe", w.oe),
        ("others", w.others),
    ] {
        if value < Decimal::ZERO {
            return Err(MillError::InvalidQuantity(format!(
                "waste {} must not be negative, got {}",
                name, value
            )));
        }
    }
    Ok(())
}

pub async fn record_production(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: RecordProductionInput,
) -> MillResult<ProductionDetail> {
    let date = super::parse_date(&input.date)?;
    validate_production_input(&input)?;

    let total_consumed: Decimal = input.consumptions.iter().map(|c| c.weight_kg).sum();
    let total_produced: Decimal = input.outputs.iter().map(|o| o.weight_kg).sum();
    let total_waste = input.waste.total();
    check_material_balance(total_consumed, total_produced, total_waste)?;

    let mut attempts = 0;
    loop {
        match record_production_tx(pool, date, &input, total_consumed, total_produced, total_waste)
            .await
        {
            Err(MillError::Database(e)) if super::is_serialization_conflict(&e) => {
                attempts += 1;
                if attempts >= super::TX_RETRY_LIMIT {
                    return Err(MillError::ConcurrentModification);
                }
            }
            Err(e) => return Err(e),
            Ok(detail) => {
                audit.record(AuditEvent::new(
                    "production.create",
                    format!("production:{}", detail.entry.production_id),
                    actor,
                ));
                return Ok(detail);
            }
        }
    }
}

async fn record_production_tx(
    pool: &DbPool,
    date: NaiveDate,
    input: &RecordProductionInput,
    total_consumed: Decimal,
    total_produced: Decimal,
    total_waste: Decimal,
) -> MillResult<ProductionDetail> {
    let mut tx = pool.begin().await?;

    // Aggregate per batch so the same batch listed twice is checked against
    // its combined draw. Iteration is id-ordered, which keeps lock order
    // stable across concurrent entries.
    let mut per_batch: BTreeMap<i32, Decimal> = BTreeMap::new();
    for c in &input.consumptions {
        *per_batch.entry(c.batch_id).or_insert(Decimal::ZERO) += c.weight_kg;
    }

    for (&batch_id, &requested) in &per_batch {
        // Lock the batch row, then read its committed remaining balance.
        let batch: Option<(String, Decimal)> = sqlx::query_as(
            "SELECT batch_code, total_weight_kg FROM batches WHERE batch_id = $1 FOR UPDATE",
        )
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (batch_code, total_weight) = match batch {
            Some(row) => row,
            None => return Err(MillError::NotFound(format!("Batch {}", batch_id))),
        };

        let consumed: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(weight_kg), 0) FROM production_consumptions WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await?;

        let available = total_weight - consumed;
        if requested > available {
            return Err(MillError::InsufficientBatchBalance {
                batch_code,
                requested,
                available,
            });
        }
    }

    let production_id: i32 = sqlx::query_scalar(
        "INSERT INTO production_entries (
            production_date, total_consumed_kg, total_produced_kg, total_waste_kg,
            waste_blow_room, waste_carding, waste_oe, waste_others
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING production_id",
    )
    .bind(date)
    .bind(total_consumed)
    .bind(total_produced)
    .bind(total_waste)
    .bind(input.waste.blow_room)
    .bind(input.waste.carding)
    .bind(input.waste.oe)
    .bind(input.waste.others)
    .fetch_one(&mut *tx)
    .await?;

    for c in &input.consumptions {
        sqlx::query(
            "INSERT INTO production_consumptions (production_id, batch_id, weight_kg)
             VALUES ($1, $2, $3)",
        )
        .bind(production_id)
        .bind(c.batch_id)
        .bind(c.weight_kg)
        .execute(&mut *tx)
        .await?;
    }

    for o in &input.outputs {
        let (bags, loose) = split_bags(o.weight_kg);
        sqlx::query(
            "INSERT INTO production_outputs (production_id, yarn_count, weight_kg, bag_count, loose_kg)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(production_id)
        .bind(o.yarn_count.trim())
        .bind(o.weight_kg)
        .bind(bags)
        .bind(loose)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    fetch_production_detail(pool, production_id).await
}

pub async fn delete_production(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    production_id: i32,
) -> MillResult<()> {
    let mut attempts = 0;
    loop {
        match delete_production_tx(pool, production_id).await {
            Err(MillError::Database(e)) if super::is_serialization_conflict(&e) => {
                attempts += 1;
                if attempts >= super::TX_RETRY_LIMIT {
                    return Err(MillError::ConcurrentModification);
                }
            }
            Err(e) => return Err(e),
            Ok(()) => {
                audit.record(AuditEvent::new(
                    "production.delete",
                    format!("production:{}", production_id),
                    actor,
                ));
                return Ok(());
            }
        }
    }
}

async fn delete_production_tx(pool: &DbPool, production_id: i32) -> MillResult<()> {
    let mut tx = pool.begin().await?;

    let date: Option<NaiveDate> = sqlx::query_scalar(
        "SELECT production_date FROM production_entries WHERE production_id = $1",
    )
    .bind(production_id)
    .fetch_optional(&mut *tx)
    .await?;

    let date = match date {
        Some(d) => d,
        None => {
            return Err(MillError::NotFound(format!(
                "Production entry {}",
                production_id
            )))
        }
    };

    // Lock the referenced batches in id order, serializing against a
    // concurrent production entry drawing from the same batches.
    sqlx::query(
        "SELECT 1 FROM batches WHERE batch_id IN (
            SELECT batch_id FROM production_consumptions WHERE production_id = $1
         ) ORDER BY batch_id FOR UPDATE",
    )
    .bind(production_id)
    .execute(&mut *tx)
    .await?;

    // Packaging/Maintenance snapshots built on this day's output stay as
    // saved (frozen-snapshot rule) but are flagged as stale.
    sqlx::query(
        "UPDATE costing_entries SET basis_stale = TRUE, updated_at = CURRENT_TIMESTAMP
         WHERE entry_date = $1 AND category IN ('Packaging', 'Maintenance')",
    )
    .bind(date)
    .execute(&mut *tx)
    .await?;

    // Consumption rows go with the entry; remaining balances are derived,
    // so removing them restores the batches.
    sqlx::query("DELETE FROM production_entries WHERE production_id = $1")
        .bind(production_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn fetch_production_detail(pool: &DbPool, production_id: i32) -> MillResult<ProductionDetail> {
    let entry = sqlx::query_as::<_, ProductionEntry>(
        "SELECT * FROM production_entries WHERE production_id = $1",
    )
    .bind(production_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| MillError::NotFound(format!("Production entry {}", production_id)))?;

    let consumptions = sqlx::query_as::<_, ProductionConsumption>(
        "SELECT pc.id, pc.production_id, pc.batch_id, pc.weight_kg, b.batch_code
         FROM production_consumptions pc
         JOIN batches b ON b.batch_id = pc.batch_id
         WHERE pc.production_id = $1
         ORDER BY pc.id",
    )
    .bind(production_id)
    .fetch_all(pool)
    .await?;

    let outputs = sqlx::query_as::<_, ProductionOutput>(
        "SELECT * FROM production_outputs WHERE production_id = $1 ORDER BY id",
    )
    .bind(production_id)
    .fetch_all(pool)
    .await?;

    Ok(ProductionDetail {
        entry,
        consumptions,
        outputs,
    })
}

pub async fn list_production(
    pool: &DbPool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> MillResult<Vec<ProductionDetail>> {
    let entries = sqlx::query_as::<_, ProductionEntry>(
        "SELECT * FROM production_entries
         WHERE ($1::date IS NULL OR production_date >= $1)
           AND ($2::date IS NULL OR production_date <= $2)
         ORDER BY production_date DESC, production_id DESC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let mut details = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = entry.production_id;
        let consumptions = sqlx::query_as::<_, ProductionConsumption>(
            "SELECT pc.id, pc.production_id, pc.batch_id, pc.weight_kg, b.batch_code
             FROM production_consumptions pc
             JOIN batches b ON b.batch_id = pc.batch_id
             WHERE pc.production_id = $1
             ORDER BY pc.id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        let outputs = sqlx::query_as::<_, ProductionOutput>(
            "SELECT * FROM production_outputs WHERE production_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        details.push(ProductionDetail {
            entry,
            consumptions,
            outputs,
        });
    }
    Ok(details)
}

// --- Axum Handlers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSearchQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn list_production_axum(
    AxumState(state): AxumState<AppState>,
    Query(query): Query<ProductionSearchQuery>,
) -> MillResult<Json<Vec<ProductionDetail>>> {
    let from = query
        .start_date
        .as_deref()
        .map(super::parse_date)
        .transpose()?;
    let to = query
        .end_date
        .as_deref()
        .map(super::parse_date)
        .transpose()?;
    Ok(Json(list_production(&state.pool, from, to).await?))
}

pub async fn record_production_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<RecordProductionInput>,
) -> MillResult<Json<ProductionDetail>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_production(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn delete_production_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Path(production_id): Path<i32>,
) -> MillResult<Json<()>> {
    let actor = super::actor_from_headers(&headers);
    delete_production(&state.pool, state.audit.as_ref(), actor, production_id).await?;
    Ok(Json(()))
}
