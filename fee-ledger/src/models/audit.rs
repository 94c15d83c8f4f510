//! Append-only audit trail model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User(Uuid),
    System,
}

impl Actor {
    pub fn label(&self) -> String {
        match self {
            Actor::User(id) => id.to_string(),
            Actor::System => "SYSTEM".to_string(),
        }
    }
}

/// Entity kind an audit event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    Structure,
    Assignment,
    Record,
    Payment,
    Refund,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Structure => "structure",
            AuditEntity::Assignment => "assignment",
            AuditEntity::Record => "record",
            AuditEntity::Payment => "payment",
            AuditEntity::Refund => "refund",
        }
    }
}

/// One append-only audit event. Writes are best-effort: a failed audit
/// append never aborts the operation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub audit_id: Uuid,
    pub coaching_id: Uuid,
    pub entity_type: AuditEntity,
    pub entity_id: Uuid,
    pub event: String,
    pub actor: Actor,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}
