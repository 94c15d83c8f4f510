//! Fee structure management: create, update with cascade re-pricing,
//! soft/hard delete.

use crate::error::AppError;
use crate::models::{
    Actor, AuditEntity, BillingCycle, CreateStructure, FeeStatus, FeeStructure, RecordFilter,
    TaxConfig, UpdateStructure,
};
use crate::services::audit::{snapshot, AuditLogger};
use crate::services::metrics::OP_DURATION;
use crate::services::records::reprice;
use crate::store::LedgerStore;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct StructureService {
    store: Arc<dyn LedgerStore>,
    audit: AuditLogger,
}

impl StructureService {
    pub fn new(store: Arc<dyn LedgerStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    #[instrument(skip(self, input), fields(coaching_id = %input.coaching_id, name = %input.name))]
    pub async fn create_structure(
        &self,
        input: CreateStructure,
        actor: Actor,
    ) -> Result<FeeStructure, AppError> {
        let timer = OP_DURATION
            .with_label_values(&["create_structure"])
            .start_timer();

        validate_amount(input.amount)?;
        validate_tax(&input.tax)?;
        if input.late_fine_per_day < Decimal::ZERO {
            return Err(AppError::Validation(anyhow::anyhow!(
                "Late fine per day must not be negative"
            )));
        }
        validate_plan(input.cycle, input.installment_plan.as_deref())?;

        let now = Utc::now();
        let structure = FeeStructure {
            structure_id: Uuid::new_v4(),
            coaching_id: input.coaching_id,
            name: input.name,
            amount: input.amount,
            cycle: input.cycle,
            late_fine_per_day: input.late_fine_per_day,
            tax: input.tax,
            installment_plan: input.installment_plan,
            line_items: input.line_items,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        };

        self.store.insert_structure(&structure).await?;
        self.audit.emit(
            structure.coaching_id,
            AuditEntity::Structure,
            structure.structure_id,
            "structure.created",
            actor,
            None,
            snapshot(&structure),
        );
        info!(
            structure_id = %structure.structure_id,
            cycle = structure.cycle.as_str(),
            tax_type = structure.tax.tax_type.as_str(),
            "Fee structure created"
        );

        timer.observe_duration();
        Ok(structure)
    }

    /// Update a structure and cascade price/tax changes onto unpaid
    /// records.
    ///
    /// The cascade is corrective and idempotent, so it runs at weaker
    /// consistency than the money paths: one versioned write per record,
    /// conflicting records skipped (their data is fresher).
    #[instrument(skip(self, update), fields(coaching_id = %coaching_id, structure_id = %structure_id))]
    pub async fn update_structure(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
        update: UpdateStructure,
        actor: Actor,
    ) -> Result<FeeStructure, AppError> {
        let timer = OP_DURATION
            .with_label_values(&["update_structure"])
            .start_timer();

        let before = self
            .store
            .get_structure(coaching_id, structure_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Structure {} not found", structure_id))
            })?;

        let mut structure = before.clone();
        if let Some(name) = update.name {
            structure.name = name;
        }
        if let Some(amount) = update.amount {
            structure.amount = amount;
        }
        if let Some(fine) = update.late_fine_per_day {
            structure.late_fine_per_day = fine;
        }
        if let Some(tax) = update.tax {
            structure.tax = tax;
        }
        if let Some(plan) = update.installment_plan {
            structure.installment_plan = Some(plan);
        }
        if let Some(line_items) = update.line_items {
            structure.line_items = line_items;
        }
        if let Some(is_active) = update.is_active {
            structure.is_active = is_active;
        }
        structure.updated_utc = Utc::now();

        validate_amount(structure.amount)?;
        validate_tax(&structure.tax)?;
        if structure.late_fine_per_day < Decimal::ZERO {
            return Err(AppError::Validation(anyhow::anyhow!(
                "Late fine per day must not be negative"
            )));
        }
        validate_plan(structure.cycle, structure.installment_plan.as_deref())?;

        self.store.update_structure(&structure).await?;

        let cascaded = self.cascade(&structure).await;
        self.audit.emit(
            coaching_id,
            AuditEntity::Structure,
            structure_id,
            "structure.updated",
            actor,
            snapshot(&before),
            snapshot(&structure),
        );
        info!(
            structure_id = %structure_id,
            cascaded = cascaded,
            "Fee structure updated"
        );

        timer.observe_duration();
        Ok(structure)
    }

    /// Re-price unpaid records billed from this structure. Returns how many
    /// records were rewritten.
    async fn cascade(&self, structure: &FeeStructure) -> usize {
        let mut filter = RecordFilter::for_coaching(structure.coaching_id)
            .with_statuses(vec![FeeStatus::Pending, FeeStatus::Overdue]);
        filter.structure_id = Some(structure.structure_id);

        let records = match self.store.list_records(&filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!(structure_id = %structure.structure_id, error = %e, "Cascade could not list records");
                return 0;
            }
        };

        let today = Utc::now().date_naive();
        let mut rewritten = 0;
        for record in records
            .into_iter()
            .filter(|r| r.paid_amount == Decimal::ZERO)
        {
            let Ok(Some(assignment)) = self
                .store
                .get_assignment(structure.coaching_id, record.assignment_id)
                .await
            else {
                continue;
            };
            let Some(updated) = reprice(&record, &assignment, structure, today) else {
                continue;
            };
            match self.store.update_record(&updated, record.version).await {
                Ok(()) => rewritten += 1,
                Err(e) if e.is_conflict() => continue,
                Err(e) => {
                    warn!(record_id = %record.record_id, error = %e, "Cascade write failed");
                }
            }
        }
        rewritten
    }

    /// Delete a structure: soft (deactivate) once any record was billed
    /// from it, hard otherwise.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, structure_id = %structure_id))]
    pub async fn delete_structure(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
        actor: Actor,
    ) -> Result<(), AppError> {
        let structure = self
            .store
            .get_structure(coaching_id, structure_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Structure {} not found", structure_id))
            })?;

        if self
            .store
            .structure_has_records(coaching_id, structure_id)
            .await?
        {
            let mut deactivated = structure.clone();
            deactivated.is_active = false;
            deactivated.updated_utc = Utc::now();
            self.store.update_structure(&deactivated).await?;
            self.audit.emit(
                coaching_id,
                AuditEntity::Structure,
                structure_id,
                "structure.deactivated",
                actor,
                snapshot(&structure),
                snapshot(&deactivated),
            );
            info!(structure_id = %structure_id, "Fee structure deactivated (records exist)");
        } else {
            self.store.delete_structure(coaching_id, structure_id).await?;
            self.audit.emit(
                coaching_id,
                AuditEntity::Structure,
                structure_id,
                "structure.deleted",
                actor,
                snapshot(&structure),
                None,
            );
            info!(structure_id = %structure_id, "Fee structure deleted");
        }
        Ok(())
    }

    pub async fn get_structure(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
    ) -> Result<FeeStructure, AppError> {
        self.store
            .get_structure(coaching_id, structure_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Structure {} not found", structure_id))
            })
    }

    pub async fn list_structures(
        &self,
        coaching_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<FeeStructure>, AppError> {
        self.store.list_structures(coaching_id, include_inactive).await
    }
}

fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount < Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Amount must not be negative"
        )));
    }
    Ok(())
}

fn validate_tax(tax: &TaxConfig) -> Result<(), AppError> {
    if tax.rate < Decimal::ZERO || tax.rate > Decimal::ONE_HUNDRED {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Tax rate must be between 0 and 100"
        )));
    }
    if tax.cess_rate < Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Cess rate must not be negative"
        )));
    }
    Ok(())
}

fn validate_plan(
    cycle: BillingCycle,
    plan: Option<&[crate::models::InstallmentEntry]>,
) -> Result<(), AppError> {
    match (cycle, plan) {
        (BillingCycle::Installment, None) | (BillingCycle::Installment, Some([])) => {
            Err(AppError::Validation(anyhow::anyhow!(
                "Installment cycle requires a non-empty installment plan"
            )))
        }
        (BillingCycle::Installment, Some(entries)) => {
            if entries.iter().any(|e| e.amount <= Decimal::ZERO) {
                return Err(AppError::Validation(anyhow::anyhow!(
                    "Installment amounts must be positive"
                )));
            }
            Ok(())
        }
        (_, Some(_)) => Err(AppError::Validation(anyhow::anyhow!(
            "Installment plan is only valid for the installment cycle"
        ))),
        (_, None) => Ok(()),
    }
}
