//! Record factory: produces deduplicated billing instances from a
//! structure and an assignment.

use crate::error::AppError;
use crate::models::{
    BillingCycle, FeeAssignment, FeeRecord, FeeStatus, FeeStructure, SETTLE_EPSILON,
};
use crate::services::metrics::RECORDS_CREATED_TOTAL;
use crate::services::{cycle, tax};
use crate::store::LedgerStore;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct RecordFactory {
    store: Arc<dyn LedgerStore>,
}

impl RecordFactory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create one fee record, or return the existing one.
    ///
    /// Dedup is the exact due date per assignment, not a month bucket:
    /// quarterly and yearly records never share a month, and the scheduler
    /// is deterministic, so the exact date is both necessary and safe.
    #[instrument(skip(self, assignment, structure), fields(assignment_id = %assignment.assignment_id, due_date = %due_date))]
    pub async fn create(
        &self,
        assignment: &FeeAssignment,
        structure: &FeeStructure,
        base_amount: Decimal,
        discount_amount: Decimal,
        due_date: NaiveDate,
        installment_label: Option<&str>,
    ) -> Result<(FeeRecord, bool), AppError> {
        let net = base_amount - discount_amount;
        let breakdown = tax::compute(net, &structure.tax);

        let mut title = cycle::record_title(&structure.name, due_date, structure.cycle);
        if let Some(label) = installment_label {
            title = format!("{} - {}", title, label);
        }

        let now = Utc::now();
        let record = FeeRecord {
            record_id: Uuid::new_v4(),
            coaching_id: assignment.coaching_id,
            assignment_id: assignment.assignment_id,
            member_id: assignment.member_id,
            structure_id: structure.structure_id,
            title,
            base_amount,
            discount_amount,
            taxable_amount: breakdown.taxable_amount,
            tax_amount: breakdown.tax_amount,
            cgst_amount: breakdown.cgst_amount,
            sgst_amount: breakdown.sgst_amount,
            igst_amount: breakdown.igst_amount,
            cess_amount: breakdown.cess_amount,
            fine_amount: Decimal::ZERO,
            final_amount: breakdown.total_with_tax,
            paid_amount: Decimal::ZERO,
            due_date,
            status: FeeStatus::Pending,
            tax_snapshot: structure.tax,
            line_items: structure.line_items.clone(),
            version: 0,
            created_utc: now,
            updated_utc: now,
        };

        let (stored, created) = self.store.insert_record_if_absent(record).await?;
        if created {
            info!(
                record_id = %stored.record_id,
                final_amount = %stored.final_amount,
                "Fee record created"
            );
            if let Some(counter) = RECORDS_CREATED_TOTAL.get() {
                counter
                    .with_label_values(&[&stored.coaching_id.to_string()])
                    .inc();
            }
        }
        Ok((stored, created))
    }

    /// Seed the opening record(s) for a fresh assignment: one record per
    /// installment plan entry, or a single open record for every other
    /// cycle.
    pub async fn seed(
        &self,
        assignment: &FeeAssignment,
        structure: &FeeStructure,
    ) -> Result<Vec<FeeRecord>, AppError> {
        let mut seeded = Vec::new();
        if structure.cycle == BillingCycle::Installment {
            let plan = structure.installment_plan.as_deref().unwrap_or(&[]);
            for entry in plan {
                let (record, _) = self
                    .create(
                        assignment,
                        structure,
                        entry.amount,
                        Decimal::ZERO,
                        entry.due_date,
                        Some(&entry.label),
                    )
                    .await?;
                seeded.push(record);
            }
        } else {
            let base = assignment.effective_amount(structure.amount);
            let (record, _) = self
                .create(
                    assignment,
                    structure,
                    base,
                    assignment.total_discount(),
                    assignment.start_date,
                    None,
                )
                .await?;
            seeded.push(record);
        }
        Ok(seeded)
    }

    /// Open the next record after `settled_due` for a recurring cycle.
    pub async fn open_next(
        &self,
        assignment: &FeeAssignment,
        structure: &FeeStructure,
        settled_due: NaiveDate,
    ) -> Result<Option<FeeRecord>, AppError> {
        let Some(next_due) = cycle::next_due_date(settled_due, structure.cycle) else {
            return Ok(None);
        };
        let base = assignment.effective_amount(structure.amount);
        let (record, created) = self
            .create(
                assignment,
                structure,
                base,
                assignment.total_discount(),
                next_due,
                None,
            )
            .await?;
        Ok(created.then_some(record))
    }
}

/// Recompute a record's derived amounts from the live assignment and
/// structure. Returns the rewritten record when any monetary field drifts
/// from the live computation by more than a cent, `None` when the record
/// is already consistent. Status is never changed here.
pub fn reprice(
    record: &FeeRecord,
    assignment: &FeeAssignment,
    structure: &FeeStructure,
    today: NaiveDate,
) -> Option<FeeRecord> {
    // Installment amounts come from the plan entries, not the structure
    // price; only their tax is re-derived.
    let (base, discount) = if structure.cycle == BillingCycle::Installment {
        (record.base_amount, record.discount_amount)
    } else {
        (
            assignment.effective_amount(structure.amount),
            assignment.total_discount(),
        )
    };

    let net = base - discount;
    let breakdown = tax::compute(net, &structure.tax);

    let fine = if record.status == FeeStatus::Overdue
        && structure.late_fine_per_day > Decimal::ZERO
    {
        structure.late_fine_per_day * Decimal::from(record.days_overdue(today))
    } else {
        record.fine_amount
    };

    let final_amount = breakdown.total_with_tax + fine;

    let drifted = |stored: Decimal, live: Decimal| (stored - live).abs() > SETTLE_EPSILON;
    if !drifted(record.base_amount, base)
        && !drifted(record.discount_amount, discount)
        && !drifted(record.tax_amount, breakdown.tax_amount)
        && !drifted(record.cess_amount, breakdown.cess_amount)
        && !drifted(record.fine_amount, fine)
        && !drifted(record.final_amount, final_amount)
    {
        return None;
    }

    let mut updated = record.clone();
    updated.base_amount = base;
    updated.discount_amount = discount;
    updated.taxable_amount = breakdown.taxable_amount;
    updated.tax_amount = breakdown.tax_amount;
    updated.cgst_amount = breakdown.cgst_amount;
    updated.sgst_amount = breakdown.sgst_amount;
    updated.igst_amount = breakdown.igst_amount;
    updated.cess_amount = breakdown.cess_amount;
    updated.fine_amount = fine;
    updated.final_amount = final_amount;
    updated.tax_snapshot = structure.tax;
    updated.line_items = structure.line_items.clone();
    updated.updated_utc = Utc::now();
    Some(updated)
}
