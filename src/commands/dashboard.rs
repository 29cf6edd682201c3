use crate::db::{DashboardStats, DbPool};
use crate::error::MillResult;
use crate::state::AppState;
use axum::extract::{Json, State as AxumState};

pub async fn get_dashboard_stats(pool: &DbPool) -> MillResult<DashboardStats> {
    let stats = sqlx::query_as::<_, DashboardStats>(
        "SELECT
            (SELECT COALESCE(SUM(total_weight_kg), 0) FROM batches)
              - (SELECT COALESCE(SUM(weight_kg), 0) FROM production_consumptions)
              AS cotton_on_hand_kg,
            (SELECT COALESCE(SUM(weight_kg), 0) FROM production_outputs)
              - (SELECT COALESCE(SUM(weight_kg), 0) FROM outward_entries)
              AS yarn_stock_kg,
            (SELECT COALESCE(SUM(po.weight_kg), 0)
               FROM production_outputs po
               JOIN production_entries pe ON pe.production_id = po.production_id
              WHERE pe.production_date = CURRENT_DATE)
              AS today_production_kg,
            (SELECT COALESCE(SUM(total_cost), 0)
               FROM costing_entries
              WHERE date_trunc('month', entry_date) = date_trunc('month', CURRENT_DATE))
              AS month_cost_total,
            (SELECT COALESCE(SUM(total - amount_paid), 0)
               FROM invoices
              WHERE status <> 'PAID')
              AS receivables_outstanding,
            (SELECT COUNT(*) FROM batches b
              WHERE b.total_weight_kg > COALESCE((
                    SELECT SUM(pc.weight_kg) FROM production_consumptions pc
                     WHERE pc.batch_id = b.batch_id), 0))
              AS open_batch_count,
            (SELECT COUNT(*) FROM invoices WHERE status <> 'PAID')
              AS unpaid_invoice_count",
    )
    .fetch_one(pool)
    .await?;
    Ok(stats)
}

// --- Axum Handlers ---

pub async fn get_dashboard_stats_axum(
    AxumState(state): AxumState<AppState>,
) -> MillResult<Json<DashboardStats>> {
    Ok(Json(get_dashboard_stats(&state.pool).await?))
}
