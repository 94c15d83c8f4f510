//! Payment processor: transactional state transitions for payments,
//! refunds and waivers.
//!
//! Money paths run under a per-record async lock, re-read every input
//! inside it, and commit through the store's versioned write. A version
//! conflict (another writer slipped in through a different engine
//! instance) is retried once with fresh reads.

use crate::error::AppError;
use crate::models::{
    financial_year, Actor, AuditEntity, FeeRecord, FeeStatus, NewPayment, NewRefund, PaymentMode,
    SETTLE_EPSILON,
};
use crate::services::audit::{snapshot, AuditLogger};
use crate::services::metrics::{ERRORS_TOTAL, OP_DURATION, PAYMENTS_TOTAL, REFUNDS_TOTAL};
use crate::services::records::RecordFactory;
use crate::services::tax;
use crate::store::LedgerStore;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input for recording a confirmed payment against a record.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub coaching_id: Uuid,
    pub record_id: Uuid,
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub transaction_ref: Option<String>,
    pub note: Option<String>,
    pub actor: Actor,
}

/// Input for recording a refund against a record.
#[derive(Debug, Clone)]
pub struct RecordRefund {
    pub coaching_id: Uuid,
    pub record_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub mode: PaymentMode,
    pub actor: Actor,
}

/// Result of a successful payment.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: crate::models::FeePayment,
    pub record: FeeRecord,
    /// Next-cycle record opened by the post-commit rollover, if any.
    pub rolled_over: Option<FeeRecord>,
}

/// Result of a successful refund.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund: crate::models::FeeRefund,
    pub record: FeeRecord,
}

#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn LedgerStore>,
    records: RecordFactory,
    audit: AuditLogger,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PaymentProcessor {
    pub fn new(store: Arc<dyn LedgerStore>, records: RecordFactory, audit: AuditLogger) -> Self {
        Self {
            store,
            records,
            audit,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn record_lock(&self, record_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(record_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Record a confirmed payment.
    ///
    /// Inside the lock the record, assignment and structure are re-read
    /// fresh; the late fine is locked in as of now; tax is recomputed from
    /// the current structure configuration (self-healing records created
    /// before a tax or price change); the balance guard runs against the
    /// locked final amount; the receipt sequence increments inside the same
    /// store commit as the payment row. Cycle rollover happens after the
    /// commit, best-effort.
    #[instrument(skip(self, input), fields(coaching_id = %input.coaching_id, record_id = %input.record_id, amount = %input.amount))]
    pub async fn record_payment(&self, input: RecordPayment) -> Result<PaymentOutcome, AppError> {
        let timer = OP_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            count_error("record_payment", "validation");
            return Err(AppError::Validation(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }

        let lock = self.record_lock(input.record_id);
        let _guard = lock.lock().await;

        let (payment, before, updated) = match self.apply_payment(&input).await {
            Err(e) if e.is_conflict() => self.apply_payment(&input).await?,
            other => other?,
        };

        drop(_guard);

        // Post-commit, best-effort rollover: never part of the money
        // transaction.
        let rolled_over = if updated.status == FeeStatus::Paid {
            self.roll_over(&updated).await
        } else {
            None
        };

        self.audit.emit(
            input.coaching_id,
            AuditEntity::Payment,
            payment.payment_id,
            "payment.recorded",
            input.actor,
            snapshot(&before),
            snapshot(&updated),
        );
        if let Some(counter) = PAYMENTS_TOTAL.get() {
            counter
                .with_label_values(&[&input.coaching_id.to_string()])
                .inc();
        }

        info!(
            payment_id = %payment.payment_id,
            receipt_no = %payment.receipt_no,
            status = updated.status.as_str(),
            actor = %input.actor.label(),
            "Payment recorded"
        );

        timer.observe_duration();
        Ok(PaymentOutcome {
            payment,
            record: updated,
            rolled_over,
        })
    }

    async fn apply_payment(
        &self,
        input: &RecordPayment,
    ) -> Result<(crate::models::FeePayment, FeeRecord, FeeRecord), AppError> {
        let record = self
            .store
            .get_record(input.coaching_id, input.record_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Record {} not found", input.record_id))
            })?;

        if record.status.is_settled() {
            count_error("record_payment", "validation");
            return Err(AppError::Validation(anyhow::anyhow!(
                "Record is already {}",
                record.status.as_str()
            )));
        }

        // Fresh assignment read inside the lock; a removed binding blocks
        // further collection.
        self.store
            .get_assignment(input.coaching_id, record.assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Assignment {} not found",
                    record.assignment_id
                ))
            })?;
        let structure = self
            .store
            .get_structure(input.coaching_id, record.structure_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Structure {} not found",
                    record.structure_id
                ))
            })?;

        let now = Utc::now();
        let today = now.date_naive();

        // Lock in the late fine as of now; carry the stored fine when the
        // record is not past due.
        let days_overdue = record.days_overdue(today);
        let fine = if days_overdue > 0 {
            structure.late_fine_per_day * Decimal::from(days_overdue)
        } else {
            record.fine_amount
        };

        // Live tax from the current structure configuration, not the
        // record's snapshot.
        let net = record.net_amount();
        let breakdown = tax::compute(net, &structure.tax);
        let final_locked = breakdown.total_with_tax + fine;

        let outstanding = final_locked - record.paid_amount;
        if input.amount > outstanding + SETTLE_EPSILON {
            count_error("record_payment", "validation");
            return Err(AppError::Validation(anyhow::anyhow!(
                "Payment amount {} exceeds outstanding balance {}",
                input.amount,
                outstanding
            )));
        }

        let new_paid = record.paid_amount + input.amount;
        let status = if new_paid >= final_locked - SETTLE_EPSILON {
            FeeStatus::Paid
        } else {
            FeeStatus::PartiallyPaid
        };

        let mut updated = record.clone();
        updated.fine_amount = fine;
        updated.taxable_amount = breakdown.taxable_amount;
        updated.tax_amount = breakdown.tax_amount;
        updated.cgst_amount = breakdown.cgst_amount;
        updated.sgst_amount = breakdown.sgst_amount;
        updated.igst_amount = breakdown.igst_amount;
        updated.cess_amount = breakdown.cess_amount;
        updated.tax_snapshot = structure.tax;
        updated.final_amount = final_locked;
        updated.paid_amount = new_paid;
        updated.status = status;
        updated.updated_utc = now;

        let payment = self
            .store
            .commit_payment(
                &updated,
                record.version,
                NewPayment {
                    payment_id: Uuid::new_v4(),
                    coaching_id: input.coaching_id,
                    record_id: record.record_id,
                    member_id: record.member_id,
                    amount: input.amount,
                    mode: input.mode,
                    transaction_ref: input.transaction_ref.clone(),
                    note: input.note.clone(),
                    recorded_by: input.actor,
                    financial_year: financial_year(today),
                    paid_utc: now,
                },
            )
            .await?;

        updated.version = record.version + 1;
        Ok((payment, record, updated))
    }

    async fn roll_over(&self, settled: &FeeRecord) -> Option<FeeRecord> {
        let assignment = match self
            .store
            .get_assignment(settled.coaching_id, settled.assignment_id)
            .await
        {
            Ok(Some(a)) => a,
            Ok(None) => return None,
            Err(e) => {
                warn!(record_id = %settled.record_id, error = %e, "Rollover skipped");
                return None;
            }
        };
        let structure = match self
            .store
            .get_structure(settled.coaching_id, settled.structure_id)
            .await
        {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                warn!(record_id = %settled.record_id, error = %e, "Rollover skipped");
                return None;
            }
        };

        if !assignment.is_active || assignment.is_paused || !structure.cycle.is_recurring() {
            return None;
        }

        match self
            .records
            .open_next(&assignment, &structure, settled.due_date)
            .await
        {
            Ok(next) => next,
            Err(e) => {
                warn!(record_id = %settled.record_id, error = %e, "Rollover failed");
                None
            }
        }
    }

    /// Record a refund against money previously received.
    ///
    /// Refunds never alter the final amount; they move `paid_amount` down
    /// and recompute status. Balance stays `final - paid`; the refunded
    /// total is reported separately by the ledger projections.
    #[instrument(skip(self, input), fields(coaching_id = %input.coaching_id, record_id = %input.record_id, amount = %input.amount))]
    pub async fn record_refund(&self, input: RecordRefund) -> Result<RefundOutcome, AppError> {
        let timer = OP_DURATION
            .with_label_values(&["record_refund"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            count_error("record_refund", "validation");
            return Err(AppError::Validation(anyhow::anyhow!(
                "Refund amount must be positive"
            )));
        }

        let lock = self.record_lock(input.record_id);
        let _guard = lock.lock().await;

        let (refund, before, updated) = match self.apply_refund(&input).await {
            Err(e) if e.is_conflict() => self.apply_refund(&input).await?,
            other => other?,
        };

        drop(_guard);

        self.audit.emit(
            input.coaching_id,
            AuditEntity::Refund,
            refund.refund_id,
            "refund.recorded",
            input.actor,
            snapshot(&before),
            snapshot(&updated),
        );
        if let Some(counter) = REFUNDS_TOTAL.get() {
            counter
                .with_label_values(&[&input.coaching_id.to_string()])
                .inc();
        }

        info!(
            refund_id = %refund.refund_id,
            status = updated.status.as_str(),
            "Refund recorded"
        );

        timer.observe_duration();
        Ok(RefundOutcome {
            refund,
            record: updated,
        })
    }

    async fn apply_refund(
        &self,
        input: &RecordRefund,
    ) -> Result<(crate::models::FeeRefund, FeeRecord, FeeRecord), AppError> {
        let record = self
            .store
            .get_record(input.coaching_id, input.record_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Record {} not found", input.record_id))
            })?;

        if record.status == FeeStatus::Waived {
            count_error("record_refund", "validation");
            return Err(AppError::Validation(anyhow::anyhow!(
                "Cannot refund a waived record"
            )));
        }
        if input.amount > record.paid_amount {
            count_error("record_refund", "validation");
            return Err(AppError::Validation(anyhow::anyhow!(
                "Refund amount {} exceeds paid amount {}",
                input.amount,
                record.paid_amount
            )));
        }

        let now = Utc::now();
        let today = now.date_naive();
        let new_paid = record.paid_amount - input.amount;

        let status = if new_paid >= record.final_amount - SETTLE_EPSILON {
            FeeStatus::Paid
        } else if today > record.due_date {
            FeeStatus::Overdue
        } else if new_paid <= Decimal::ZERO {
            FeeStatus::Pending
        } else {
            FeeStatus::PartiallyPaid
        };

        let mut updated = record.clone();
        updated.paid_amount = new_paid;
        updated.status = status;
        updated.updated_utc = now;

        let refund = self
            .store
            .commit_refund(
                &updated,
                record.version,
                NewRefund {
                    refund_id: Uuid::new_v4(),
                    coaching_id: input.coaching_id,
                    record_id: record.record_id,
                    member_id: record.member_id,
                    amount: input.amount,
                    reason: input.reason.clone(),
                    mode: input.mode,
                    recorded_by: input.actor,
                    refunded_utc: now,
                },
            )
            .await?;

        updated.version = record.version + 1;
        Ok((refund, record, updated))
    }

    /// Waive a record's outstanding balance.
    ///
    /// Forbidden once paid or already waived. Collected money is kept, not
    /// refunded: a partially paid record gets its final amount pinned to
    /// the paid amount so the balance becomes exactly zero.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, record_id = %record_id))]
    pub async fn waive_fee(
        &self,
        coaching_id: Uuid,
        record_id: Uuid,
        actor: Actor,
    ) -> Result<FeeRecord, AppError> {
        let lock = self.record_lock(record_id);
        let _guard = lock.lock().await;

        let (before, updated) = match self.apply_waive(coaching_id, record_id).await {
            Err(e) if e.is_conflict() => self.apply_waive(coaching_id, record_id).await?,
            other => other?,
        };

        drop(_guard);

        self.audit.emit(
            coaching_id,
            AuditEntity::Record,
            record_id,
            "fee.waived",
            actor,
            snapshot(&before),
            snapshot(&updated),
        );
        info!(record_id = %record_id, "Fee waived");
        Ok(updated)
    }

    async fn apply_waive(
        &self,
        coaching_id: Uuid,
        record_id: Uuid,
    ) -> Result<(FeeRecord, FeeRecord), AppError> {
        let record = self
            .store
            .get_record(coaching_id, record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Record {} not found", record_id)))?;

        match record.status {
            FeeStatus::Paid => {
                count_error("waive_fee", "validation");
                return Err(AppError::Validation(anyhow::anyhow!(
                    "Cannot waive a fully paid record"
                )));
            }
            FeeStatus::Waived => {
                count_error("waive_fee", "validation");
                return Err(AppError::Validation(anyhow::anyhow!(
                    "Record is already waived"
                )));
            }
            _ => {}
        }

        let mut updated = record.clone();
        if record.paid_amount > Decimal::ZERO {
            updated.final_amount = record.paid_amount;
        }
        updated.status = FeeStatus::Waived;
        updated.updated_utc = Utc::now();

        self.store.update_record(&updated, record.version).await?;
        updated.version = record.version + 1;
        Ok((record, updated))
    }
}

fn count_error(operation: &str, kind: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[operation, kind]).inc();
    }
}
