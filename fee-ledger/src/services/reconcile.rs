//! Read-path reconciliation sweep.
//!
//! No scheduler exists: correction happens lazily on whichever read
//! triggers it, rate-limited per coaching tenant by two independent
//! debounce windows. Both passes are idempotent, never move a record
//! backward, and never touch paid or waived records. A failure on one
//! record is logged and skipped; it never aborts the rest of the pass.

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::models::{Actor, AuditEntity, FeeStatus, RecordFilter, SETTLE_EPSILON};
use crate::services::audit::{snapshot, AuditLogger};
use crate::services::metrics::{SWEEP_REWRITES_TOTAL, SWEEP_RUNS_TOTAL};
use crate::services::records::reprice;
use crate::store::LedgerStore;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Per-tenant debounce state for the two sweep passes.
///
/// Timestamps live in process memory and reset on restart: after a
/// restart the first read per tenant runs both passes immediately, which
/// is safe because both are idempotent.
#[derive(Default)]
pub struct SweepGate {
    heal: DashMap<Uuid, Instant>,
    overdue: DashMap<Uuid, Instant>,
}

impl SweepGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-set: true when the window has elapsed for the
    /// tenant (and the timestamp was advanced), false when debounced.
    fn try_acquire(map: &DashMap<Uuid, Instant>, coaching_id: Uuid, window: Duration) -> bool {
        let now = Instant::now();
        match map.entry(coaching_id) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= window {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn acquire_heal(&self, coaching_id: Uuid, window: Duration) -> bool {
        Self::try_acquire(&self.heal, coaching_id, window)
    }

    pub fn acquire_overdue(&self, coaching_id: Uuid, window: Duration) -> bool {
        Self::try_acquire(&self.overdue, coaching_id, window)
    }
}

/// Counts of what a sweep run touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub healed: usize,
    pub marked_overdue: usize,
    pub fines_refreshed: usize,
}

#[derive(Clone)]
pub struct ReconciliationSweep {
    store: Arc<dyn LedgerStore>,
    audit: AuditLogger,
    gate: Arc<SweepGate>,
    config: EngineConfig,
}

impl ReconciliationSweep {
    pub fn new(store: Arc<dyn LedgerStore>, audit: AuditLogger, config: EngineConfig) -> Self {
        Self {
            store,
            audit,
            gate: Arc::new(SweepGate::new()),
            config,
        }
    }

    /// Run whichever passes are due for the tenant. Invoked inline by the
    /// read path; returns an empty report when both windows are still
    /// debounced.
    #[instrument(skip(self), fields(coaching_id = %coaching_id))]
    pub async fn run_if_due(&self, coaching_id: Uuid) -> SweepReport {
        let mut report = SweepReport::default();

        if self
            .gate
            .acquire_heal(coaching_id, Duration::from_secs(self.config.heal_debounce_secs))
        {
            report.healed = self.heal(coaching_id).await;
        }

        if self.gate.acquire_overdue(
            coaching_id,
            Duration::from_secs(self.config.overdue_debounce_secs),
        ) {
            let (marked, refreshed) = self.sweep_overdue(coaching_id).await;
            report.marked_overdue = marked;
            report.fines_refreshed = refreshed;
        }

        report
    }

    /// Self-heal pass: rewrite unpaid records whose amounts drift from the
    /// live structure computation by more than a cent. Fixes records
    /// created before a tax configuration existed or before a cascade fix
    /// shipped. Never changes status.
    #[instrument(skip(self), fields(coaching_id = %coaching_id))]
    pub async fn heal(&self, coaching_id: Uuid) -> usize {
        count_run(coaching_id, "heal");
        let today = Utc::now().date_naive();

        let filter = RecordFilter::for_coaching(coaching_id)
            .with_statuses(vec![FeeStatus::Pending, FeeStatus::Overdue]);
        let records = match self.store.list_records(&filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Self-heal pass could not list records");
                return 0;
            }
        };

        let mut healed = 0;
        for record in records
            .into_iter()
            .filter(|r| r.paid_amount == Decimal::ZERO)
            .take(self.config.sweep_batch_limit)
        {
            let Ok(Some(assignment)) = self
                .store
                .get_assignment(coaching_id, record.assignment_id)
                .await
            else {
                continue;
            };
            let Ok(Some(structure)) = self
                .store
                .get_structure(coaching_id, record.structure_id)
                .await
            else {
                continue;
            };

            let Some(updated) = reprice(&record, &assignment, &structure, today) else {
                continue;
            };
            match self.store.update_record(&updated, record.version).await {
                Ok(()) => {
                    healed += 1;
                    count_rewrite(coaching_id, "heal");
                    debug!(record_id = %record.record_id, "Record healed");
                }
                Err(e) if e.is_conflict() => {
                    // Another writer got there first; its data is fresher.
                    continue;
                }
                Err(e) => {
                    warn!(record_id = %record.record_id, error = %e, "Heal write failed");
                }
            }
        }
        healed
    }

    /// Overdue pass: transition past-due pending/partially-paid records to
    /// overdue, and refresh the accrued fine on records already overdue.
    /// Returns (newly marked, fines refreshed).
    #[instrument(skip(self), fields(coaching_id = %coaching_id))]
    pub async fn sweep_overdue(&self, coaching_id: Uuid) -> (usize, usize) {
        count_run(coaching_id, "overdue");
        let now = Utc::now();
        let today = now.date_naive();

        let filter = RecordFilter::for_coaching(coaching_id).with_statuses(vec![
            FeeStatus::Pending,
            FeeStatus::PartiallyPaid,
            FeeStatus::Overdue,
        ]);
        let records = match self.store.list_records(&filter).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Overdue sweep could not list records");
                return (0, 0);
            }
        };

        let mut marked = 0;
        let mut refreshed = 0;
        // Filter before taking so not-yet-due records never consume the
        // batch budget.
        for record in records
            .into_iter()
            .filter(|r| r.due_date < today)
            .take(self.config.sweep_batch_limit)
        {
            let Ok(Some(structure)) = self
                .store
                .get_structure(coaching_id, record.structure_id)
                .await
            else {
                continue;
            };

            let was_overdue = record.status == FeeStatus::Overdue;

            let days = record.days_overdue(today);
            let fine = structure.late_fine_per_day * Decimal::from(days);
            let breakdown =
                crate::services::tax::compute(record.net_amount(), &structure.tax);
            let final_amount = breakdown.total_with_tax + fine;

            let drifted = (record.fine_amount - fine).abs() > SETTLE_EPSILON
                || (record.tax_amount - breakdown.tax_amount).abs() > SETTLE_EPSILON
                || (record.final_amount - final_amount).abs() > SETTLE_EPSILON;

            if was_overdue && !drifted {
                continue;
            }

            let mut updated = record.clone();
            updated.status = FeeStatus::Overdue;
            updated.fine_amount = fine;
            updated.taxable_amount = breakdown.taxable_amount;
            updated.tax_amount = breakdown.tax_amount;
            updated.cgst_amount = breakdown.cgst_amount;
            updated.sgst_amount = breakdown.sgst_amount;
            updated.igst_amount = breakdown.igst_amount;
            updated.cess_amount = breakdown.cess_amount;
            updated.tax_snapshot = structure.tax;
            updated.final_amount = final_amount;
            updated.updated_utc = now;

            match self.store.update_record(&updated, record.version).await {
                Ok(()) => {
                    count_rewrite(coaching_id, "overdue");
                    if was_overdue {
                        refreshed += 1;
                    } else {
                        marked += 1;
                        self.audit.emit(
                            coaching_id,
                            AuditEntity::Record,
                            record.record_id,
                            "record.overdue",
                            Actor::System,
                            snapshot(&record),
                            snapshot(&updated),
                        );
                    }
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => {
                    warn!(record_id = %record.record_id, error = %e, "Overdue write failed");
                }
            }
        }
        (marked, refreshed)
    }
}

fn count_run(coaching_id: Uuid, pass: &str) {
    if let Some(counter) = SWEEP_RUNS_TOTAL.get() {
        counter
            .with_label_values(&[&coaching_id.to_string(), pass])
            .inc();
    }
}

fn count_rewrite(coaching_id: Uuid, pass: &str) {
    if let Some(counter) = SWEEP_REWRITES_TOTAL.get() {
        counter
            .with_label_values(&[&coaching_id.to_string(), pass])
            .inc();
    }
}
