//! Collaborator seams the embedder supplies: member directory lookup and
//! notification dispatch.

use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Member/coaching directory lookup.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether the member exists under the coaching tenant.
    async fn member_exists(&self, coaching_id: Uuid, member_id: Uuid) -> Result<bool, AppError>;

    /// Guardians (ward -> parent mapping) to copy on reminders.
    async fn guardians_of(&self, member_id: Uuid) -> Result<Vec<Uuid>, AppError>;
}

/// Notification dispatcher. Invoked fire-and-forget: the engine never
/// blocks on delivery and never propagates delivery failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError>;
}

/// In-memory directory for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    members: DashMap<(Uuid, Uuid), ()>,
    guardians: DashMap<Uuid, Vec<Uuid>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, coaching_id: Uuid, member_id: Uuid) {
        self.members.insert((coaching_id, member_id), ());
    }

    pub fn add_guardian(&self, member_id: Uuid, guardian_id: Uuid) {
        self.guardians.entry(member_id).or_default().push(guardian_id);
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn member_exists(&self, coaching_id: Uuid, member_id: Uuid) -> Result<bool, AppError> {
        Ok(self.members.contains_key(&(coaching_id, member_id)))
    }

    async fn guardians_of(&self, member_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .guardians
            .get(&member_id)
            .map(|g| g.clone())
            .unwrap_or_default())
    }
}
