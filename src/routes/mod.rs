use crate::state::AppState;
use axum::Router;

pub mod batch;
pub mod costing;
pub mod dashboard;
pub mod invoice;
pub mod outward;
pub mod production;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(batch::router())
        .merge(production::router())
        .merge(outward::router())
        .merge(costing::router())
        .merge(invoice::router())
        .merge(dashboard::router())
}
