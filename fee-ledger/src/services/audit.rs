//! Fire-and-forget audit trail appender.

use crate::models::{Actor, AuditEntity, AuditLog};
use crate::services::metrics::AUDIT_FAILURES_TOTAL;
use crate::store::LedgerStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Appends audit events through the store without blocking the caller.
///
/// Contract: `emit` never blocks and never propagates failure. Audit
/// completeness is best-effort; money correctness is not.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn LedgerStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn emit(
        &self,
        coaching_id: Uuid,
        entity_type: AuditEntity,
        entity_id: Uuid,
        event: &str,
        actor: Actor,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        let entry = AuditLog {
            audit_id: Uuid::new_v4(),
            coaching_id,
            entity_type,
            entity_id,
            event: event.to_string(),
            actor,
            before,
            after,
            created_utc: Utc::now(),
        };

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.append_audit(&entry).await {
                warn!(
                    coaching_id = %entry.coaching_id,
                    entity = entry.entity_type.as_str(),
                    event = %entry.event,
                    error = %e,
                    "Audit append failed, event dropped"
                );
                if let Some(counter) = AUDIT_FAILURES_TOTAL.get() {
                    counter
                        .with_label_values(&[&entry.coaching_id.to_string()])
                        .inc();
                }
            }
        });
    }
}

/// Serialize an entity for a before/after audit snapshot.
pub fn snapshot<T: serde::Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}
