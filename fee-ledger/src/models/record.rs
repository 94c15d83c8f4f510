//! Fee record model: one billable obligation instance.

use super::structure::{LineItem, TaxConfig};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settlement tolerance for monetary comparisons (one paisa).
pub const SETTLE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Lifecycle state of a fee record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Waived,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Pending => "pending",
            FeeStatus::PartiallyPaid => "partially_paid",
            FeeStatus::Paid => "paid",
            FeeStatus::Overdue => "overdue",
            FeeStatus::Waived => "waived",
        }
    }

    /// Terminal for money movement: no further payments are accepted.
    pub fn is_settled(&self) -> bool {
        matches!(self, FeeStatus::Paid | FeeStatus::Waived)
    }
}

/// One billable obligation derived from an assignment for a due date.
///
/// Unique per (assignment_id, due_date). `tax_snapshot` and `line_items`
/// are copied from the structure at creation; only the structure-update
/// cascade and the self-heal pass rewrite them. `version` is the
/// optimistic-concurrency counter checked by every store write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRecord {
    pub record_id: Uuid,
    pub coaching_id: Uuid,
    pub assignment_id: Uuid,
    pub member_id: Uuid,
    pub structure_id: Uuid,
    pub title: String,
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub cess_amount: Decimal,
    pub fine_amount: Decimal,
    pub final_amount: Decimal,
    pub paid_amount: Decimal,
    pub due_date: NaiveDate,
    pub status: FeeStatus,
    pub tax_snapshot: TaxConfig,
    pub line_items: Vec<LineItem>,
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl FeeRecord {
    /// Net obligation after discounts, before tax and fine.
    pub fn net_amount(&self) -> Decimal {
        self.base_amount - self.discount_amount
    }

    /// Outstanding balance. Always `final - paid`; refunds are reported
    /// separately and never double-subtracted.
    pub fn balance(&self) -> Decimal {
        self.final_amount - self.paid_amount
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        today.signed_duration_since(self.due_date).num_days().max(0)
    }
}

/// Filter parameters for listing fee records.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub coaching_id: Uuid,
    pub member_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub structure_id: Option<Uuid>,
    pub statuses: Option<Vec<FeeStatus>>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn for_coaching(coaching_id: Uuid) -> Self {
        Self {
            coaching_id,
            member_id: None,
            assignment_id: None,
            structure_id: None,
            statuses: None,
            due_from: None,
            due_to: None,
        }
    }

    pub fn with_member(mut self, member_id: Uuid) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<FeeStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }
}
