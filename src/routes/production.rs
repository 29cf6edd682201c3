use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/production",
            get(commands::production::list_production_axum),
        )
        .route(
            "/api/production/create",
            post(commands::production::record_production_axum),
        )
        .route(
            "/api/production/delete/:id",
            post(commands::production::delete_production_axum),
        )
}
