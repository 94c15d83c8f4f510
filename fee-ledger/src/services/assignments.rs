//! Assignment management: binding structures to members, pause/resume,
//! removal, and structure-change cleanup.

use crate::collaborators::Directory;
use crate::error::AppError;
use crate::models::{
    Actor, AssignFee, AuditEntity, FeeAssignment, FeeRecord, FeeStatus, FeeStructure, RecordFilter,
};
use crate::services::audit::{snapshot, AuditLogger};
use crate::services::metrics::OP_DURATION;
use crate::services::records::{reprice, RecordFactory};
use crate::store::LedgerStore;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of assigning a fee: the (possibly fresh) assignment and the
/// records seeded for it.
#[derive(Debug, Clone)]
pub struct AssignOutcome {
    pub assignment: FeeAssignment,
    pub seeded: Vec<FeeRecord>,
}

#[derive(Clone)]
pub struct AssignmentService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn Directory>,
    records: RecordFactory,
    audit: AuditLogger,
}

impl AssignmentService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn Directory>,
        records: RecordFactory,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            directory,
            records,
            audit,
        }
    }

    /// Assign a structure to a member, keeping exactly one active
    /// assignment per (coaching, member).
    ///
    /// Re-assigning to a different structure cleans up the old binding:
    /// unpaid records with no money collected are deleted, partially paid
    /// ones are auto-waived (their final pinned to the paid amount), and
    /// the old assignment is deactivated before the new one seeds.
    #[instrument(skip(self, input), fields(coaching_id = %input.coaching_id, member_id = %input.member_id, structure_id = %input.structure_id))]
    pub async fn assign_fee(
        &self,
        input: AssignFee,
        actor: Actor,
    ) -> Result<AssignOutcome, AppError> {
        let timer = OP_DURATION.with_label_values(&["assign_fee"]).start_timer();

        let structure = self
            .store
            .get_structure(input.coaching_id, input.structure_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Structure {} not found", input.structure_id))
            })?;
        if !structure.is_active {
            return Err(AppError::Validation(anyhow::anyhow!(
                "Structure {} is not active",
                input.structure_id
            )));
        }

        if !self
            .directory
            .member_exists(input.coaching_id, input.member_id)
            .await?
        {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Member {} not found",
                input.member_id
            )));
        }

        validate_discounts(&input, &structure)?;

        let existing = self
            .store
            .find_active_assignment(input.coaching_id, input.member_id)
            .await?;

        let outcome = match existing {
            Some(current) if current.structure_id == input.structure_id => {
                self.update_overrides(current, &input, &structure, actor)
                    .await?
            }
            Some(current) => {
                self.cleanup_assignment(&current, actor).await?;
                self.create_assignment(&input, &structure, actor).await?
            }
            None => self.create_assignment(&input, &structure, actor).await?,
        };

        timer.observe_duration();
        Ok(outcome)
    }

    async fn create_assignment(
        &self,
        input: &AssignFee,
        structure: &FeeStructure,
        actor: Actor,
    ) -> Result<AssignOutcome, AppError> {
        let now = Utc::now();
        let assignment = FeeAssignment {
            assignment_id: Uuid::new_v4(),
            coaching_id: input.coaching_id,
            member_id: input.member_id,
            structure_id: input.structure_id,
            custom_amount: input.custom_amount,
            discount_amount: input.discount_amount,
            scholarship_amount: input.scholarship_amount,
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: true,
            is_paused: false,
            created_utc: now,
            updated_utc: now,
        };
        self.store.insert_assignment(&assignment).await?;

        let seeded = self.records.seed(&assignment, structure).await?;

        self.audit.emit(
            assignment.coaching_id,
            AuditEntity::Assignment,
            assignment.assignment_id,
            "assignment.created",
            actor,
            None,
            snapshot(&assignment),
        );
        info!(
            assignment_id = %assignment.assignment_id,
            seeded = seeded.len(),
            "Fee assigned"
        );
        Ok(AssignOutcome { assignment, seeded })
    }

    /// Same structure re-assigned: refresh the per-member overrides and
    /// dates, seed the record for the new start date, and re-price unpaid
    /// records from the new values.
    async fn update_overrides(
        &self,
        current: FeeAssignment,
        input: &AssignFee,
        structure: &FeeStructure,
        actor: Actor,
    ) -> Result<AssignOutcome, AppError> {
        let mut updated = current.clone();
        updated.custom_amount = input.custom_amount;
        updated.discount_amount = input.discount_amount;
        updated.scholarship_amount = input.scholarship_amount;
        updated.start_date = input.start_date;
        updated.end_date = input.end_date;
        updated.updated_utc = Utc::now();
        self.store.update_assignment(&updated).await?;

        let seeded = self.records.seed(&updated, structure).await?;
        self.reprice_unpaid(&updated, structure).await;

        self.audit.emit(
            updated.coaching_id,
            AuditEntity::Assignment,
            updated.assignment_id,
            "assignment.updated",
            actor,
            snapshot(&current),
            snapshot(&updated),
        );
        Ok(AssignOutcome {
            assignment: updated,
            seeded,
        })
    }

    async fn reprice_unpaid(&self, assignment: &FeeAssignment, structure: &FeeStructure) {
        let mut filter = RecordFilter::for_coaching(assignment.coaching_id)
            .with_statuses(vec![FeeStatus::Pending, FeeStatus::Overdue]);
        filter.assignment_id = Some(assignment.assignment_id);

        let records = match self.store.list_records(&filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!(assignment_id = %assignment.assignment_id, error = %e, "Reprice could not list records");
                return;
            }
        };

        let today = Utc::now().date_naive();
        for record in records
            .into_iter()
            .filter(|r| r.paid_amount == Decimal::ZERO)
        {
            let Some(updated) = reprice(&record, assignment, structure, today) else {
                continue;
            };
            match self.store.update_record(&updated, record.version).await {
                Ok(()) | Err(AppError::Conflict(_)) => {}
                Err(e) => {
                    warn!(record_id = %record.record_id, error = %e, "Reprice write failed");
                }
            }
        }
    }

    /// Delete unpaid zero-paid records, auto-waive partially paid ones,
    /// and deactivate the assignment.
    async fn cleanup_assignment(
        &self,
        assignment: &FeeAssignment,
        actor: Actor,
    ) -> Result<(), AppError> {
        let mut filter = RecordFilter::for_coaching(assignment.coaching_id);
        filter.assignment_id = Some(assignment.assignment_id);
        let records = self.store.list_records(&filter).await?;

        for record in records {
            if record.status.is_settled() {
                continue;
            }
            if record.paid_amount == Decimal::ZERO {
                self.store
                    .delete_record(assignment.coaching_id, record.record_id)
                    .await?;
            } else {
                // Keep collected money; close out the balance.
                let mut waived = record.clone();
                waived.final_amount = record.paid_amount;
                waived.status = FeeStatus::Waived;
                waived.updated_utc = Utc::now();
                match self.store.update_record(&waived, record.version).await {
                    Ok(()) => {
                        self.audit.emit(
                            assignment.coaching_id,
                            AuditEntity::Record,
                            record.record_id,
                            "record.auto_waived",
                            actor,
                            snapshot(&record),
                            snapshot(&waived),
                        );
                    }
                    Err(e) if e.is_conflict() => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        let mut deactivated = assignment.clone();
        deactivated.is_active = false;
        deactivated.updated_utc = Utc::now();
        self.store.update_assignment(&deactivated).await?;
        Ok(())
    }

    /// Remove a member's assignment: cleanup (delete unpaid, waive
    /// partial) and deactivate.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, assignment_id = %assignment_id))]
    pub async fn remove_assignment(
        &self,
        coaching_id: Uuid,
        assignment_id: Uuid,
        actor: Actor,
    ) -> Result<(), AppError> {
        let assignment = self
            .store
            .get_assignment(coaching_id, assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Assignment {} not found", assignment_id))
            })?;

        self.cleanup_assignment(&assignment, actor).await?;
        self.audit.emit(
            coaching_id,
            AuditEntity::Assignment,
            assignment_id,
            "assignment.removed",
            actor,
            snapshot(&assignment),
            None,
        );
        info!(assignment_id = %assignment_id, "Assignment removed");
        Ok(())
    }

    /// Pause or resume billing for an assignment. Paused assignments stop
    /// rolling over to new records; existing records still accrue fines.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, assignment_id = %assignment_id))]
    pub async fn toggle_pause(
        &self,
        coaching_id: Uuid,
        assignment_id: Uuid,
        actor: Actor,
    ) -> Result<FeeAssignment, AppError> {
        let assignment = self
            .store
            .get_assignment(coaching_id, assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Assignment {} not found", assignment_id))
            })?;

        let mut updated = assignment.clone();
        updated.is_paused = !assignment.is_paused;
        updated.updated_utc = Utc::now();
        self.store.update_assignment(&updated).await?;

        self.audit.emit(
            coaching_id,
            AuditEntity::Assignment,
            assignment_id,
            if updated.is_paused {
                "assignment.paused"
            } else {
                "assignment.resumed"
            },
            actor,
            snapshot(&assignment),
            snapshot(&updated),
        );
        info!(
            assignment_id = %assignment_id,
            paused = updated.is_paused,
            "Assignment pause toggled"
        );
        Ok(updated)
    }

    pub async fn get_assignment(
        &self,
        coaching_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<FeeAssignment, AppError> {
        self.store
            .get_assignment(coaching_id, assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Assignment {} not found", assignment_id))
            })
    }
}

fn validate_discounts(input: &AssignFee, structure: &FeeStructure) -> Result<(), AppError> {
    if input.discount_amount < Decimal::ZERO
        || input.scholarship_amount.unwrap_or(Decimal::ZERO) < Decimal::ZERO
    {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Discounts must not be negative"
        )));
    }
    let effective = input.custom_amount.unwrap_or(structure.amount);
    if effective < Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Custom amount must not be negative"
        )));
    }
    let total_discount =
        input.discount_amount + input.scholarship_amount.unwrap_or(Decimal::ZERO);
    if total_discount > effective {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Discount {} exceeds effective amount {}",
            total_discount,
            effective
        )));
    }
    Ok(())
}
