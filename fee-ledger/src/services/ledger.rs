//! Ledger projections: per-member timelines and aggregate summaries.
//!
//! Pure read-side aggregation over already-consistent entities; performs
//! no writes itself, but every read triggers the debounced reconciliation
//! sweep so stale records self-correct under read traffic.

use crate::error::AppError;
use crate::models::{FeePayment, FeeRecord, FeeRefund, FeeStatus, RecordFilter};
use crate::services::reconcile::ReconciliationSweep;
use crate::store::LedgerStore;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Flat totals for one member or one coaching tenant.
///
/// `balance` is always `total_fee - total_paid`; `total_refunded` is
/// informational and never subtracted again (paid already decrements on
/// refund).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LedgerSummary {
    pub total_fee: Decimal,
    pub total_paid: Decimal,
    pub total_refunded: Decimal,
    pub balance: Decimal,
    pub total_overdue: Decimal,
}

/// Kind of event on a member timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    Record,
    Payment,
    Refund,
}

/// One entry of the chronological member timeline, with a running
/// balance: records increase it, payments decrease it, refunds increase
/// it back (returned money re-opens the obligation).
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEvent {
    pub kind: LedgerEventKind,
    pub at: DateTime<Utc>,
    pub record_id: Uuid,
    pub title: String,
    pub amount: Decimal,
    pub running_balance: Decimal,
    /// Receipt number for payments.
    pub reference: Option<String>,
}

/// Per-member ledger: summary plus chronological timeline.
#[derive(Debug, Clone, Serialize)]
pub struct MemberLedger {
    pub member_id: Uuid,
    pub summary: LedgerSummary,
    pub timeline: Vec<LedgerEvent>,
}

/// One record with its nested money movements, for the student view.
#[derive(Debug, Clone, Serialize)]
pub struct StudentLedgerRecord {
    pub record: FeeRecord,
    pub payments: Vec<FeePayment>,
    pub refunds: Vec<FeeRefund>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentLedger {
    pub member_id: Uuid,
    pub summary: LedgerSummary,
    pub records: Vec<StudentLedgerRecord>,
}

/// Coaching-wide aggregate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoachingSummary {
    pub totals: LedgerSummary,
    pub pending_records: usize,
    pub partially_paid_records: usize,
    pub paid_records: usize,
    pub overdue_records: usize,
    pub waived_records: usize,
}

/// One row of the overdue report.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueEntry {
    pub record_id: Uuid,
    pub member_id: Uuid,
    pub title: String,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub fine_amount: Decimal,
    pub outstanding: Decimal,
}

/// Records due on one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub records: Vec<CalendarItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarItem {
    pub record_id: Uuid,
    pub member_id: Uuid,
    pub title: String,
    pub status: FeeStatus,
    pub outstanding: Decimal,
}

#[derive(Clone)]
pub struct LedgerProjector {
    store: Arc<dyn LedgerStore>,
    sweep: ReconciliationSweep,
}

impl LedgerProjector {
    pub fn new(store: Arc<dyn LedgerStore>, sweep: ReconciliationSweep) -> Self {
        Self { store, sweep }
    }

    pub async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<FeeRecord>, AppError> {
        self.sweep.run_if_due(filter.coaching_id).await;
        self.store.list_records(filter).await
    }

    pub async fn get_record(
        &self,
        coaching_id: Uuid,
        record_id: Uuid,
    ) -> Result<FeeRecord, AppError> {
        self.sweep.run_if_due(coaching_id).await;
        self.store
            .get_record(coaching_id, record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Record {} not found", record_id)))
    }

    #[instrument(skip(self), fields(coaching_id = %coaching_id, member_id = %member_id))]
    pub async fn get_member_ledger(
        &self,
        coaching_id: Uuid,
        member_id: Uuid,
    ) -> Result<MemberLedger, AppError> {
        self.sweep.run_if_due(coaching_id).await;

        let filter = RecordFilter::for_coaching(coaching_id).with_member(member_id);
        let records = self.store.list_records(&filter).await?;
        let payments = self
            .store
            .list_payments(coaching_id, None, Some(member_id))
            .await?;
        let refunds = self
            .store
            .list_refunds(coaching_id, None, Some(member_id))
            .await?;

        let summary = summarize(&records, &refunds);
        let timeline = build_timeline(&records, &payments, &refunds);

        Ok(MemberLedger {
            member_id,
            summary,
            timeline,
        })
    }

    #[instrument(skip(self), fields(coaching_id = %coaching_id, member_id = %member_id))]
    pub async fn get_student_ledger(
        &self,
        coaching_id: Uuid,
        member_id: Uuid,
    ) -> Result<StudentLedger, AppError> {
        self.sweep.run_if_due(coaching_id).await;

        let filter = RecordFilter::for_coaching(coaching_id).with_member(member_id);
        let records = self.store.list_records(&filter).await?;
        let payments = self
            .store
            .list_payments(coaching_id, None, Some(member_id))
            .await?;
        let refunds = self
            .store
            .list_refunds(coaching_id, None, Some(member_id))
            .await?;

        let summary = summarize(&records, &refunds);
        let detailed = records
            .into_iter()
            .map(|record| {
                let payments = payments
                    .iter()
                    .filter(|p| p.record_id == record.record_id)
                    .cloned()
                    .collect();
                let refunds = refunds
                    .iter()
                    .filter(|r| r.record_id == record.record_id)
                    .cloned()
                    .collect();
                StudentLedgerRecord {
                    record,
                    payments,
                    refunds,
                }
            })
            .collect();

        Ok(StudentLedger {
            member_id,
            summary,
            records: detailed,
        })
    }

    #[instrument(skip(self), fields(coaching_id = %coaching_id))]
    pub async fn get_summary(&self, coaching_id: Uuid) -> Result<CoachingSummary, AppError> {
        self.sweep.run_if_due(coaching_id).await;

        let filter = RecordFilter::for_coaching(coaching_id);
        let records = self.store.list_records(&filter).await?;
        let refunds = self.store.list_refunds(coaching_id, None, None).await?;

        let mut summary = CoachingSummary {
            totals: summarize(&records, &refunds),
            ..Default::default()
        };
        for record in &records {
            match record.status {
                FeeStatus::Pending => summary.pending_records += 1,
                FeeStatus::PartiallyPaid => summary.partially_paid_records += 1,
                FeeStatus::Paid => summary.paid_records += 1,
                FeeStatus::Overdue => summary.overdue_records += 1,
                FeeStatus::Waived => summary.waived_records += 1,
            }
        }
        Ok(summary)
    }

    #[instrument(skip(self), fields(coaching_id = %coaching_id))]
    pub async fn get_overdue_report(
        &self,
        coaching_id: Uuid,
    ) -> Result<Vec<OverdueEntry>, AppError> {
        self.sweep.run_if_due(coaching_id).await;

        let filter =
            RecordFilter::for_coaching(coaching_id).with_statuses(vec![FeeStatus::Overdue]);
        let records = self.store.list_records(&filter).await?;

        let today = Utc::now().date_naive();
        Ok(records
            .into_iter()
            .map(|r| OverdueEntry {
                record_id: r.record_id,
                member_id: r.member_id,
                title: r.title.clone(),
                due_date: r.due_date,
                days_overdue: r.days_overdue(today),
                fine_amount: r.fine_amount,
                outstanding: r.balance(),
            })
            .collect())
    }

    /// Records due inside one calendar month, grouped by day.
    #[instrument(skip(self), fields(coaching_id = %coaching_id, year = year, month = month))]
    pub async fn get_calendar(
        &self,
        coaching_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<CalendarDay>, AppError> {
        self.sweep.run_if_due(coaching_id).await;

        let from = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            AppError::Validation(anyhow::anyhow!("Invalid calendar month {}-{}", year, month))
        })?;
        let to = from
            .checked_add_months(chrono::Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(from);

        let mut filter = RecordFilter::for_coaching(coaching_id);
        filter.due_from = Some(from);
        filter.due_to = Some(to);
        let records = self.store.list_records(&filter).await?;

        let mut days: BTreeMap<NaiveDate, Vec<CalendarItem>> = BTreeMap::new();
        for r in records {
            days.entry(r.due_date).or_default().push(CalendarItem {
                record_id: r.record_id,
                member_id: r.member_id,
                title: r.title.clone(),
                status: r.status,
                outstanding: r.balance(),
            });
        }

        Ok(days
            .into_iter()
            .map(|(date, records)| CalendarDay { date, records })
            .collect())
    }
}

/// Effective fee contribution of a record: waived records count only the
/// money actually kept, so `balance = total_fee - total_paid` holds for
/// every mix of states.
fn fee_component(record: &FeeRecord) -> Decimal {
    if record.status == FeeStatus::Waived {
        record.paid_amount
    } else {
        record.final_amount
    }
}

/// Paid totals come from the records themselves: `paid_amount` is already
/// net of refunds, so refunds are never double-subtracted.
fn summarize(records: &[FeeRecord], refunds: &[FeeRefund]) -> LedgerSummary {
    let total_fee: Decimal = records.iter().map(fee_component).sum();
    let total_paid: Decimal = records.iter().map(|r| r.paid_amount).sum();
    let total_refunded: Decimal = refunds.iter().map(|r| r.amount).sum();
    let total_overdue: Decimal = records
        .iter()
        .filter(|r| r.status == FeeStatus::Overdue)
        .map(|r| r.balance())
        .sum();

    LedgerSummary {
        total_fee,
        total_paid,
        total_refunded,
        balance: total_fee - total_paid,
        total_overdue,
    }
}

fn build_timeline(
    records: &[FeeRecord],
    payments: &[FeePayment],
    refunds: &[FeeRefund],
) -> Vec<LedgerEvent> {
    let mut events: Vec<(DateTime<Utc>, u8, LedgerEventKind, Uuid, String, Decimal, Option<String>)> =
        Vec::new();

    for r in records {
        events.push((
            r.created_utc,
            0,
            LedgerEventKind::Record,
            r.record_id,
            r.title.clone(),
            fee_component(r),
            None,
        ));
    }
    for p in payments {
        events.push((
            p.paid_utc,
            1,
            LedgerEventKind::Payment,
            p.record_id,
            format!("Payment ({})", p.mode.as_str()),
            p.amount,
            Some(p.receipt_no.clone()),
        ));
    }
    for r in refunds {
        events.push((
            r.refunded_utc,
            2,
            LedgerEventKind::Refund,
            r.record_id,
            "Refund".to_string(),
            r.amount,
            None,
        ));
    }

    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut running = Decimal::ZERO;
    events
        .into_iter()
        .map(|(at, _, kind, record_id, title, amount, reference)| {
            match kind {
                LedgerEventKind::Record | LedgerEventKind::Refund => running += amount,
                LedgerEventKind::Payment => running -= amount,
            }
            LedgerEvent {
                kind,
                at,
                record_id,
                title,
                amount,
                running_balance: running,
                reference,
            }
        })
        .collect()
}
