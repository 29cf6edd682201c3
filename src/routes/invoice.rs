use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/invoices", get(commands::invoice::list_invoices_axum))
        .route(
            "/api/invoices/:id",
            get(commands::invoice::get_invoice_axum),
        )
        .route(
            "/api/invoices/create",
            post(commands::invoice::create_invoice_axum),
        )
        .route(
            "/api/invoices/delete/:id",
            post(commands::invoice::delete_invoice_axum),
        )
        .route(
            "/api/payments/create",
            post(commands::invoice::record_payment_axum),
        )
        .route(
            "/api/payments/delete/:id",
            post(commands::invoice::delete_payment_axum),
        )
}
