//! Fee reminders, delegated to the notification collaborator.
//!
//! Dispatch is fire-and-forget: delivery runs on spawned tasks, failures
//! are logged and never propagated.

use crate::collaborators::{Directory, Notifier};
use crate::error::AppError;
use crate::models::{FeeRecord, FeeStatus, RecordFilter};
use crate::store::LedgerStore;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What a bulk reminder run covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkRemindSummary {
    pub members_notified: usize,
    pub records_covered: usize,
}

#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Remind one member (and their guardians) about one record.
    /// Returns how many notifications were dispatched.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, record_id = %record_id))]
    pub async fn send_reminder(
        &self,
        coaching_id: Uuid,
        record_id: Uuid,
    ) -> Result<usize, AppError> {
        let record = self
            .store
            .get_record(coaching_id, record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Record {} not found", record_id)))?;

        if record.status.is_settled() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "Record has no outstanding balance"
            )));
        }

        let message = format!(
            "{} is due on {}. Outstanding balance: {}.",
            record.title,
            record.due_date,
            record.balance()
        );
        let dispatched = self
            .dispatch(record.member_id, &record, "Fee reminder", &message)
            .await?;
        info!(record_id = %record_id, dispatched = dispatched, "Reminder sent");
        Ok(dispatched)
    }

    /// Remind every member with unpaid records, one aggregated
    /// notification per member.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, only_overdue = only_overdue))]
    pub async fn bulk_remind(
        &self,
        coaching_id: Uuid,
        only_overdue: bool,
    ) -> Result<BulkRemindSummary, AppError> {
        let statuses = if only_overdue {
            vec![FeeStatus::Overdue]
        } else {
            vec![
                FeeStatus::Pending,
                FeeStatus::PartiallyPaid,
                FeeStatus::Overdue,
            ]
        };
        let filter = RecordFilter::for_coaching(coaching_id).with_statuses(statuses);
        let records = self.store.list_records(&filter).await?;

        let mut per_member: HashMap<Uuid, (usize, Decimal)> = HashMap::new();
        for record in &records {
            let entry = per_member.entry(record.member_id).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += record.balance();
        }

        let mut summary = BulkRemindSummary::default();
        for (member_id, (count, outstanding)) in per_member {
            let message = format!(
                "You have {} fee record(s) outstanding, totalling {}.",
                count, outstanding
            );
            let payload = json!({
                "coaching_id": coaching_id,
                "records": count,
                "outstanding": outstanding,
            });
            self.notify_fire_and_forget(member_id, "Fee reminder", &message, payload.clone());
            match self.directory.guardians_of(member_id).await {
                Ok(guardians) => {
                    for guardian in guardians {
                        self.notify_fire_and_forget(
                            guardian,
                            "Fee reminder",
                            &message,
                            payload.clone(),
                        );
                    }
                }
                Err(e) => warn!(member_id = %member_id, error = %e, "Guardian lookup failed"),
            }
            summary.members_notified += 1;
            summary.records_covered += count;
        }
        info!(
            members = summary.members_notified,
            records = summary.records_covered,
            "Bulk reminders dispatched"
        );
        Ok(summary)
    }

    async fn dispatch(
        &self,
        member_id: Uuid,
        record: &FeeRecord,
        title: &str,
        message: &str,
    ) -> Result<usize, AppError> {
        let payload = json!({
            "record_id": record.record_id,
            "due_date": record.due_date,
            "outstanding": record.balance(),
            "status": record.status.as_str(),
        });

        let mut dispatched = 1;
        self.notify_fire_and_forget(member_id, title, message, payload.clone());

        for guardian in self.directory.guardians_of(member_id).await? {
            self.notify_fire_and_forget(guardian, title, message, payload.clone());
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn notify_fire_and_forget(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        payload: serde_json::Value,
    ) {
        let notifier = Arc::clone(&self.notifier);
        let title = title.to_string();
        let message = message.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(user_id, &title, &message, payload).await {
                warn!(user_id = %user_id, error = %e, "Notification dispatch failed");
            }
        });
    }
}
