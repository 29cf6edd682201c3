#![allow(dead_code)]
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;

use crate::error::{MillError, MillResult};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool_with_options(opts: PgConnectOptions) -> MillResult<DbPool> {
    // connect_lazy_with returns the pool immediately. It does not validate connection.
    Ok(PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts))
}

pub async fn init_pool(database_url: &str) -> MillResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| MillError::Validation(format!("Invalid DB URL: {}", e)))?
        .ssl_mode(PgSslMode::Disable);

    init_pool_with_options(opts).await
}

pub async fn init_database(pool: &DbPool) -> MillResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database ready");
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Batch {
    pub batch_id: i32,
    pub batch_code: String,
    pub received_date: NaiveDate,
    pub supplier: String,
    pub bale_count: i32,
    pub total_weight_kg: Decimal,
    pub created_at: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub updated_at: Option<NaiveDateTime>,
}

/// Batch row decorated with its derived consumption and remaining balance.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct BatchWithBalance {
    pub batch_id: i32,
    pub batch_code: String,
    pub received_date: NaiveDate,
    pub supplier: String,
    pub bale_count: i32,
    pub total_weight_kg: Decimal,
    pub consumed_kg: Decimal,
    pub remaining_kg: Decimal,
    pub created_at: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProductionEntry {
    pub production_id: i32,
    pub production_date: NaiveDate,
    pub total_consumed_kg: Decimal,
    pub total_produced_kg: Decimal,
    pub total_waste_kg: Decimal,
    pub waste_blow_room: Decimal,
    pub waste_carding: Decimal,
    pub waste_oe: Decimal,
    pub waste_others: Decimal,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProductionConsumption {
    pub id: i32,
    pub production_id: i32,
    pub batch_id: i32,
    pub weight_kg: Decimal,
    #[sqlx(default)]
    pub batch_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProductionOutput {
    pub id: i32,
    pub production_id: i32,
    pub yarn_count: String,
    pub weight_kg: Decimal,
    pub bag_count: i32,
    pub loose_kg: Decimal,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct OutwardEntry {
    pub outward_id: i32,
    pub outward_date: NaiveDate,
    pub yarn_count: String,
    pub weight_kg: Decimal,
    pub bag_count: i32,
    pub loose_kg: Decimal,
    pub destination: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// Derived per-count stock. Never stored; always recomputed from
/// production outputs minus outward dispatches.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct YarnStockRow {
    pub yarn_count: String,
    pub produced_kg: Decimal,
    pub dispatched_kg: Decimal,
    pub stock_kg: Decimal,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct CostingEntry {
    pub costing_id: i32,
    pub entry_date: NaiveDate,
    pub category: String,
    pub total_cost: Decimal,
    pub units_consumed: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
    pub shifts: Option<i32>,
    pub workers: Option<i32>,
    pub rate_per_worker: Option<Decimal>,
    pub overtime: Option<Decimal>,
    pub rate_per_kg: Option<Decimal>,
    pub basis_output_kg: Option<Decimal>,
    pub basis_stale: bool,
    pub title: Option<String>,
    pub expense_type: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: i32,
    pub invoice_no: String,
    pub invoice_date: NaiveDate,
    pub customer: String,
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub created_at: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub id: i32,
    pub invoice_id: i32,
    pub yarn_count: String,
    pub bags: i32,
    pub weight_kg: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: i32,
    pub invoice_id: i32,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Default)]
pub struct DashboardStats {
    pub cotton_on_hand_kg: Option<Decimal>,
    pub yarn_stock_kg: Option<Decimal>,
    pub today_production_kg: Option<Decimal>,
    pub month_cost_total: Option<Decimal>,
    pub receivables_outstanding: Option<Decimal>,
    pub open_batch_count: Option<i64>,
    pub unpaid_invoice_count: Option<i64>,
}
