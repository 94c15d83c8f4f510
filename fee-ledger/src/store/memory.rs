//! In-memory reference implementation of [`LedgerStore`].
//!
//! Every method takes the single interior lock, so each store call is one
//! serializable commit; `commit_payment`/`commit_refund` perform their
//! version check, sequence increment and row writes under that one lock.

use super::LedgerStore;
use crate::error::AppError;
use crate::models::{
    format_receipt_no, AuditLog, FeeAssignment, FeePayment, FeeRecord, FeeRefund, FeeStructure,
    NewPayment, NewRefund, RecordFilter,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    structures: HashMap<Uuid, FeeStructure>,
    assignments: HashMap<Uuid, FeeAssignment>,
    records: HashMap<Uuid, FeeRecord>,
    record_by_due: HashMap<(Uuid, NaiveDate), Uuid>,
    payments: Vec<FeePayment>,
    refunds: Vec<FeeRefund>,
    audits: Vec<AuditLog>,
    receipt_seqs: HashMap<(Uuid, String), i64>,
}

/// In-memory ledger store for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::StoreError(anyhow::anyhow!("store lock poisoned")))
    }
}

fn matches_filter(record: &FeeRecord, filter: &RecordFilter) -> bool {
    if record.coaching_id != filter.coaching_id {
        return false;
    }
    if let Some(member_id) = filter.member_id {
        if record.member_id != member_id {
            return false;
        }
    }
    if let Some(assignment_id) = filter.assignment_id {
        if record.assignment_id != assignment_id {
            return false;
        }
    }
    if let Some(structure_id) = filter.structure_id {
        if record.structure_id != structure_id {
            return false;
        }
    }
    if let Some(statuses) = &filter.statuses {
        if !statuses.contains(&record.status) {
            return false;
        }
    }
    if let Some(from) = filter.due_from {
        if record.due_date < from {
            return false;
        }
    }
    if let Some(to) = filter.due_to {
        if record.due_date > to {
            return false;
        }
    }
    true
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_structure(&self, structure: &FeeStructure) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner
            .structures
            .insert(structure.structure_id, structure.clone());
        Ok(())
    }

    async fn get_structure(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
    ) -> Result<Option<FeeStructure>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .structures
            .get(&structure_id)
            .filter(|s| s.coaching_id == coaching_id)
            .cloned())
    }

    async fn update_structure(&self, structure: &FeeStructure) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !inner.structures.contains_key(&structure.structure_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Structure {} not found",
                structure.structure_id
            )));
        }
        inner
            .structures
            .insert(structure.structure_id, structure.clone());
        Ok(())
    }

    async fn delete_structure(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let exists = inner
            .structures
            .get(&structure_id)
            .map(|s| s.coaching_id == coaching_id)
            .unwrap_or(false);
        if exists {
            inner.structures.remove(&structure_id);
        }
        Ok(exists)
    }

    async fn list_structures(
        &self,
        coaching_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<FeeStructure>, AppError> {
        let inner = self.lock()?;
        let mut out: Vec<FeeStructure> = inner
            .structures
            .values()
            .filter(|s| s.coaching_id == coaching_id && (include_inactive || s.is_active))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_utc.cmp(&b.created_utc));
        Ok(out)
    }

    async fn structure_has_records(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
    ) -> Result<bool, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .any(|r| r.coaching_id == coaching_id && r.structure_id == structure_id))
    }

    async fn insert_assignment(&self, assignment: &FeeAssignment) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner
            .assignments
            .insert(assignment.assignment_id, assignment.clone());
        Ok(())
    }

    async fn update_assignment(&self, assignment: &FeeAssignment) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !inner.assignments.contains_key(&assignment.assignment_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Assignment {} not found",
                assignment.assignment_id
            )));
        }
        inner
            .assignments
            .insert(assignment.assignment_id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(
        &self,
        coaching_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<Option<FeeAssignment>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .assignments
            .get(&assignment_id)
            .filter(|a| a.coaching_id == coaching_id)
            .cloned())
    }

    async fn find_active_assignment(
        &self,
        coaching_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<FeeAssignment>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .assignments
            .values()
            .find(|a| a.coaching_id == coaching_id && a.member_id == member_id && a.is_active)
            .cloned())
    }

    async fn insert_record_if_absent(
        &self,
        record: FeeRecord,
    ) -> Result<(FeeRecord, bool), AppError> {
        let mut inner = self.lock()?;
        let key = (record.assignment_id, record.due_date);
        if let Some(existing_id) = inner.record_by_due.get(&key) {
            let existing = inner.records.get(existing_id).cloned().ok_or_else(|| {
                AppError::StoreError(anyhow::anyhow!("dangling record index for {:?}", key))
            })?;
            return Ok((existing, false));
        }
        inner.record_by_due.insert(key, record.record_id);
        inner.records.insert(record.record_id, record.clone());
        Ok((record, true))
    }

    async fn get_record(
        &self,
        coaching_id: Uuid,
        record_id: Uuid,
    ) -> Result<Option<FeeRecord>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .get(&record_id)
            .filter(|r| r.coaching_id == coaching_id)
            .cloned())
    }

    async fn update_record(
        &self,
        record: &FeeRecord,
        expected_version: i64,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let stored = inner.records.get_mut(&record.record_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Record {} not found", record.record_id))
        })?;
        if stored.version != expected_version {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Record {} version {} moved past expected {}",
                record.record_id,
                stored.version,
                expected_version
            )));
        }
        let mut updated = record.clone();
        updated.version = expected_version + 1;
        *stored = updated;
        Ok(())
    }

    async fn delete_record(&self, coaching_id: Uuid, record_id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let removed = match inner.records.get(&record_id) {
            Some(r) if r.coaching_id == coaching_id => {
                let key = (r.assignment_id, r.due_date);
                inner.record_by_due.remove(&key);
                inner.records.remove(&record_id);
                true
            }
            _ => false,
        };
        Ok(removed)
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<FeeRecord>, AppError> {
        let inner = self.lock()?;
        let mut out: Vec<FeeRecord> = inner
            .records
            .values()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then(a.created_utc.cmp(&b.created_utc))
        });
        Ok(out)
    }

    async fn commit_payment(
        &self,
        record: &FeeRecord,
        expected_version: i64,
        payment: NewPayment,
    ) -> Result<FeePayment, AppError> {
        let mut inner = self.lock()?;
        let stored = inner.records.get(&record.record_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Record {} not found", record.record_id))
        })?;
        if stored.version != expected_version {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Record {} version {} moved past expected {}",
                record.record_id,
                stored.version,
                expected_version
            )));
        }

        let seq_key = (payment.coaching_id, payment.financial_year.clone());
        let seq = inner.receipt_seqs.entry(seq_key).or_insert(0);
        *seq += 1;
        let receipt_no = format_receipt_no(&payment.financial_year, *seq);

        let row = FeePayment {
            payment_id: payment.payment_id,
            coaching_id: payment.coaching_id,
            record_id: payment.record_id,
            member_id: payment.member_id,
            amount: payment.amount,
            mode: payment.mode,
            transaction_ref: payment.transaction_ref,
            receipt_no,
            note: payment.note,
            recorded_by: payment.recorded_by,
            paid_utc: payment.paid_utc,
        };
        inner.payments.push(row.clone());

        let mut updated = record.clone();
        updated.version = expected_version + 1;
        inner.records.insert(record.record_id, updated);
        Ok(row)
    }

    async fn commit_refund(
        &self,
        record: &FeeRecord,
        expected_version: i64,
        refund: NewRefund,
    ) -> Result<FeeRefund, AppError> {
        let mut inner = self.lock()?;
        let stored = inner.records.get(&record.record_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Record {} not found", record.record_id))
        })?;
        if stored.version != expected_version {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Record {} version {} moved past expected {}",
                record.record_id,
                stored.version,
                expected_version
            )));
        }

        let row = FeeRefund {
            refund_id: refund.refund_id,
            coaching_id: refund.coaching_id,
            record_id: refund.record_id,
            member_id: refund.member_id,
            amount: refund.amount,
            reason: refund.reason,
            mode: refund.mode,
            recorded_by: refund.recorded_by,
            refunded_utc: refund.refunded_utc,
        };
        inner.refunds.push(row.clone());

        let mut updated = record.clone();
        updated.version = expected_version + 1;
        inner.records.insert(record.record_id, updated);
        Ok(row)
    }

    async fn list_payments(
        &self,
        coaching_id: Uuid,
        record_id: Option<Uuid>,
        member_id: Option<Uuid>,
    ) -> Result<Vec<FeePayment>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .payments
            .iter()
            .filter(|p| {
                p.coaching_id == coaching_id
                    && record_id.map(|id| p.record_id == id).unwrap_or(true)
                    && member_id.map(|id| p.member_id == id).unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn list_refunds(
        &self,
        coaching_id: Uuid,
        record_id: Option<Uuid>,
        member_id: Option<Uuid>,
    ) -> Result<Vec<FeeRefund>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .refunds
            .iter()
            .filter(|r| {
                r.coaching_id == coaching_id
                    && record_id.map(|id| r.record_id == id).unwrap_or(true)
                    && member_id.map(|id| r.member_id == id).unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: &AuditLog) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner.audits.push(entry.clone());
        Ok(())
    }

    async fn list_audit(
        &self,
        coaching_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> Result<Vec<AuditLog>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .audits
            .iter()
            .filter(|a| {
                a.coaching_id == coaching_id
                    && entity_id.map(|id| a.entity_id == id).unwrap_or(true)
            })
            .cloned()
            .collect())
    }
}
