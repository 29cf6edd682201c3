use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/dashboard/stats",
        get(commands::dashboard::get_dashboard_stats_axum),
    )
}
