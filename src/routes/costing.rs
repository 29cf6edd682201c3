use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/costing", get(commands::costing::list_costing_axum))
        .route(
            "/api/costing/electricity",
            post(commands::costing::record_electricity_axum),
        )
        .route(
            "/api/costing/employee",
            post(commands::costing::record_employee_axum),
        )
        .route(
            "/api/costing/packaging",
            post(commands::costing::record_packaging_axum),
        )
        .route(
            "/api/costing/maintenance",
            post(commands::costing::record_maintenance_axum),
        )
        .route(
            "/api/costing/expense",
            post(commands::costing::record_expense_axum),
        )
        .route(
            "/api/costing/delete/:id",
            post(commands::costing::delete_costing_axum),
        )
}
