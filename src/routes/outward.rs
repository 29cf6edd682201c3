use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stock", get(commands::outward::yarn_stock_axum))
        .route("/api/outward", get(commands::outward::list_outward_axum))
        .route(
            "/api/outward/create",
            post(commands::outward::record_outward_axum),
        )
        .route(
            "/api/outward/delete/:id",
            post(commands::outward::delete_outward_axum),
        )
}
