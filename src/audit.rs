//! Append-only audit sink. Every mutating command reports what it did;
//! the sink is fire-and-forget and must never block or fail the mutation.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: &'static str,
    pub entity: String,
    pub actor_id: Option<String>,
}

impl AuditEvent {
    pub fn new(action: &'static str, entity: impl Into<String>, actor_id: Option<String>) -> Self {
        Self {
            action,
            entity: entity.into(),
            actor_id,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: one structured tracing event per mutation.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            action = event.action,
            entity = %event.entity,
            actor = event.actor_id.as_deref().unwrap_or("-"),
            "audit"
        );
    }
}
