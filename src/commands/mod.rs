use axum::http::HeaderMap;
use chrono::NaiveDate;

use crate::error::{MillError, MillResult};

pub mod batch;
pub mod costing;
pub mod dashboard;
pub mod invoice;
pub mod outward;
pub mod production;

/// All calendar dates cross the API boundary as ISO `YYYY-MM-DD` strings.
pub fn parse_date(s: &str) -> MillResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| MillError::Validation(format!("Invalid date '{}': {}", s, e)))
}

/// Caller identity for the audit trail. Authentication happens upstream;
/// the header is trusted as-is.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Serialization/deadlock failures are retried a bounded number of times
/// before surfacing as `ConcurrentModification`.
pub const TX_RETRY_LIMIT: u32 = 3;

pub fn is_serialization_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("40001") | Some("40P01")
        ),
        _ => false,
    }
}
