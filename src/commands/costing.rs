use crate::audit::{AuditEvent, AuditSink};
use crate::db::{CostingEntry, DbPool};
use crate::error::{MillError, MillResult};
use crate::state::AppState;
use axum::extract::{Json, Path, Query, State as AxumState};
use axum::http::HeaderMap;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fat-finger ceiling on any single cost line.
pub const COST_CEILING: Decimal = dec!(10000000);

/// Closed set of cost categories. Packaging and Maintenance are rate-driven
/// against the day's production output and upsert on (date, category);
/// Expense is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostCategory {
    Electricity,
    Employee,
    Packaging,
    Maintenance,
    Expense,
}

impl CostCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostCategory::Electricity => "Electricity",
            CostCategory::Employee => "Employee",
            CostCategory::Packaging => "Packaging",
            CostCategory::Maintenance => "Maintenance",
            CostCategory::Expense => "Expense",
        }
    }
}

pub fn validate_total_cost(total: Decimal) -> MillResult<()> {
    if total <= Decimal::ZERO {
        return Err(MillError::InvalidQuantity(format!(
            "total cost must be positive, got {}",
            total
        )));
    }
    if total > COST_CEILING {
        return Err(MillError::InvalidQuantity(format!(
            "total cost {} exceeds ceiling {}",
            total, COST_CEILING
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectricityInput {
    pub date: String,
    pub units_consumed: Decimal,
    pub rate_per_unit: Decimal,
    pub shifts: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeInput {
    pub date: String,
    pub workers: i32,
    pub rate_per_worker: Decimal,
    pub shifts: i32,
    #[serde(default)]
    pub overtime: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingInput {
    pub date: String,
    pub rate_per_kg: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceInput {
    pub date: String,
    pub rate_per_kg: Decimal,
    pub manual_override_cost: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    pub date: String,
    pub title: String,
    pub amount: Decimal,
    pub expense_type: String,
    pub description: Option<String>,
}

pub async fn record_electricity(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: ElectricityInput,
) -> MillResult<CostingEntry> {
    let date = super::parse_date(&input.date)?;
    if input.units_consumed <= Decimal::ZERO || input.rate_per_unit <= Decimal::ZERO {
        return Err(MillError::InvalidQuantity(
            "units and rate must be positive".into(),
        ));
    }
    if input.shifts <= 0 {
        return Err(MillError::InvalidQuantity(format!(
            "shifts must be positive, got {}",
            input.shifts
        )));
    }
    let total = (input.units_consumed * input.rate_per_unit * Decimal::from(input.shifts))
        .round_dp(2);
    validate_total_cost(total)?;

    let entry = sqlx::query_as::<_, CostingEntry>(
        "INSERT INTO costing_entries (entry_date, category, total_cost, units_consumed, rate_per_unit, shifts)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(date)
    .bind(CostCategory::Electricity.as_str())
    .bind(total)
    .bind(input.units_consumed)
    .bind(input.rate_per_unit)
    .bind(input.shifts)
    .fetch_one(pool)
    .await?;

    audit.record(AuditEvent::new(
        "costing.electricity",
        format!("costing:{}", entry.costing_id),
        actor,
    ));
    Ok(entry)
}

pub async fn record_employee(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: EmployeeInput,
) -> MillResult<CostingEntry> {
    let date = super::parse_date(&input.date)?;
    if input.workers <= 0 || input.shifts <= 0 {
        return Err(MillError::InvalidQuantity(
            "workers and shifts must be positive".into(),
        ));
    }
    if input.rate_per_worker <= Decimal::ZERO || input.overtime < Decimal::ZERO {
        return Err(MillError::InvalidQuantity(
            "rate must be positive and overtime non-negative".into(),
        ));
    }
    let total = (Decimal::from(input.workers)
        * input.rate_per_worker
        * Decimal::from(input.shifts)
        + input.overtime)
        .round_dp(2);
    validate_total_cost(total)?;

    let entry = sqlx::query_as::<_, CostingEntry>(
        "INSERT INTO costing_entries (entry_date, category, total_cost, workers, rate_per_worker, shifts, overtime)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(date)
    .bind(CostCategory::Employee.as_str())
    .bind(total)
    .bind(input.workers)
    .bind(input.rate_per_worker)
    .bind(input.shifts)
    .bind(input.overtime)
    .fetch_one(pool)
    .await?;

    audit.record(AuditEvent::new(
        "costing.employee",
        format!("costing:{}", entry.costing_id),
        actor,
    ));
    Ok(entry)
}

/// Sum of the day's yarn output, read inside the caller's transaction so
/// the snapshot basis is taken from committed state at save time.
async fn production_output_kg(
    conn: &mut sqlx::PgConnection,
    date: NaiveDate,
) -> MillResult<Decimal> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(SUM(po.weight_kg), 0)
         FROM production_outputs po
         JOIN production_entries pe ON pe.production_id = po.production_id
         WHERE pe.production_date = $1",
    )
    .bind(date)
    .fetch_one(conn)
    .await?)
}

async fn upsert_rate_driven(
    pool: &DbPool,
    category: CostCategory,
    date: NaiveDate,
    rate_per_kg: Decimal,
    manual_override_cost: Option<Decimal>,
) -> MillResult<CostingEntry> {
    if rate_per_kg <= Decimal::ZERO {
        return Err(MillError::InvalidQuantity(format!(
            "rate per kg must be positive, got {}",
            rate_per_kg
        )));
    }

    let mut tx = pool.begin().await?;

    let output_kg = production_output_kg(&mut *tx, date).await?;
    if output_kg <= Decimal::ZERO {
        return Err(MillError::NoProductionForDate(date));
    }

    // The formula result is a convenience default; Maintenance may carry a
    // manually entered total instead. Either way the basis quantity is
    // snapshotted here and never recomputed.
    let total = manual_override_cost
        .unwrap_or_else(|| (output_kg * rate_per_kg).round_dp(2));
    validate_total_cost(total)?;

    let entry = sqlx::query_as::<_, CostingEntry>(
        "INSERT INTO costing_entries (entry_date, category, total_cost, rate_per_kg, basis_output_kg, basis_stale)
         VALUES ($1, $2, $3, $4, $5, FALSE)
         ON CONFLICT (entry_date, category) WHERE category IN ('Packaging', 'Maintenance')
         DO UPDATE SET total_cost = EXCLUDED.total_cost,
                       rate_per_kg = EXCLUDED.rate_per_kg,
                       basis_output_kg = EXCLUDED.basis_output_kg,
                       basis_stale = FALSE,
                       updated_at = CURRENT_TIMESTAMP
         RETURNING *",
    )
    .bind(date)
    .bind(category.as_str())
    .bind(total)
    .bind(rate_per_kg)
    .bind(output_kg)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(entry)
}

pub async fn record_packaging(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: PackagingInput,
) -> MillResult<CostingEntry> {
    let date = super::parse_date(&input.date)?;
    let entry =
        upsert_rate_driven(pool, CostCategory::Packaging, date, input.rate_per_kg, None).await?;

    audit.record(AuditEvent::new(
        "costing.packaging",
        format!("costing:{}", entry.costing_id),
        actor,
    ));
    Ok(entry)
}

pub async fn record_maintenance(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: MaintenanceInput,
) -> MillResult<CostingEntry> {
    let date = super::parse_date(&input.date)?;
    let entry = upsert_rate_driven(
        pool,
        CostCategory::Maintenance,
        date,
        input.rate_per_kg,
        input.manual_override_cost,
    )
    .await?;

    audit.record(AuditEvent::new(
        "costing.maintenance",
        format!("costing:{}", entry.costing_id),
        actor,
    ));
    Ok(entry)
}

pub async fn record_expense(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    input: ExpenseInput,
) -> MillResult<CostingEntry> {
    let date = super::parse_date(&input.date)?;
    let title = input.title.trim().to_string();
    if title.is_empty() {
        return Err(MillError::Validation("expense title must not be empty".into()));
    }
    validate_total_cost(input.amount)?;

    let entry = sqlx::query_as::<_, CostingEntry>(
        "INSERT INTO costing_entries (entry_date, category, total_cost, title, expense_type, description)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(date)
    .bind(CostCategory::Expense.as_str())
    .bind(input.amount)
    .bind(&title)
    .bind(&input.expense_type)
    .bind(&input.description)
    .fetch_one(pool)
    .await?;

    audit.record(AuditEvent::new(
        "costing.expense",
        format!("costing:{}", entry.costing_id),
        actor,
    ));
    Ok(entry)
}

pub async fn list_costing(
    pool: &DbPool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> MillResult<Vec<CostingEntry>> {
    Ok(sqlx::query_as::<_, CostingEntry>(
        "SELECT * FROM costing_entries
         WHERE ($1::date IS NULL OR entry_date >= $1)
           AND ($2::date IS NULL OR entry_date <= $2)
         ORDER BY entry_date DESC, costing_id DESC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?)
}

pub async fn delete_costing(
    pool: &DbPool,
    audit: &dyn AuditSink,
    actor: Option<String>,
    costing_id: i32,
) -> MillResult<()> {
    let result = sqlx::query("DELETE FROM costing_entries WHERE costing_id = $1")
        .bind(costing_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(MillError::NotFound(format!("Costing entry {}", costing_id)));
    }

    audit.record(AuditEvent::new(
        "costing.delete",
        format!("costing:{}", costing_id),
        actor,
    ));
    Ok(())
}

// --- Axum Handlers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostingSearchQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn list_costing_axum(
    AxumState(state): AxumState<AppState>,
    Query(query): Query<CostingSearchQuery>,
) -> MillResult<Json<Vec<CostingEntry>>> {
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
    Ok(Json(list_costing(&state.pool, from, to).await?))
}

pub async fn record_electricity_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<ElectricityInput>,
) -> MillResult<Json<CostingEntry>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_electricity(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn record_employee_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<EmployeeInput>,
) -> MillResult<Json<CostingEntry>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_employee(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn record_packaging_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<PackagingInput>,
) -> MillResult<Json<CostingEntry>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_packaging(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn record_maintenance_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<MaintenanceInput>,
) -> MillResult<Json<CostingEntry>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_maintenance(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn record_expense_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Json(input): Json<ExpenseInput>,
) -> MillResult<Json<CostingEntry>> {
    let actor = super::actor_from_headers(&headers);
    Ok(Json(
        record_expense(&state.pool, state.audit.as_ref(), actor, input).await?,
    ))
}

pub async fn delete_costing_axum(
    AxumState(state): AxumState<AppState>,
    headers: HeaderMap,
    Path(costing_id): Path<i32>,
) -> MillResult<Json<()>> {
    let actor = super::actor_from_headers(&headers);
    delete_costing(&state.pool, state.audit.as_ref(), actor, costing_id).await?;
    Ok(Json(()))
}
