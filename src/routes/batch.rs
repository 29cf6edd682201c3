use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/batches", get(commands::batch::list_batches_axum))
        .route(
            "/api/batches/available",
            get(commands::batch::list_available_axum),
        )
        .route(
            "/api/batches/:id/balance",
            get(commands::batch::remaining_balance_axum),
        )
        .route(
            "/api/batches/create",
            post(commands::batch::create_batch_axum),
        )
        .route(
            "/api/batches/update",
            post(commands::batch::update_batch_axum),
        )
        .route(
            "/api/batches/delete/:id",
            post(commands::batch::delete_batch_axum),
        )
}
