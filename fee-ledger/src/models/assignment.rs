//! Fee assignment model: the binding of one structure to one member.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Binding of a fee structure to a member, with per-member overrides.
///
/// At most one active assignment exists per (coaching, member); the engine
/// enforces this on assignment, deactivating the previous binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeAssignment {
    pub assignment_id: Uuid,
    pub coaching_id: Uuid,
    pub member_id: Uuid,
    pub structure_id: Uuid,
    pub custom_amount: Option<Decimal>,
    pub discount_amount: Decimal,
    pub scholarship_amount: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub is_paused: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl FeeAssignment {
    /// Member-effective gross amount before discounts.
    pub fn effective_amount(&self, structure_amount: Decimal) -> Decimal {
        self.custom_amount.unwrap_or(structure_amount)
    }

    /// Combined discount applied to the gross amount.
    pub fn total_discount(&self) -> Decimal {
        self.discount_amount + self.scholarship_amount.unwrap_or(Decimal::ZERO)
    }
}

/// Input for assigning a structure to a member.
#[derive(Debug, Clone)]
pub struct AssignFee {
    pub coaching_id: Uuid,
    pub member_id: Uuid,
    pub structure_id: Uuid,
    pub custom_amount: Option<Decimal>,
    pub discount_amount: Decimal,
    pub scholarship_amount: Option<Decimal>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}
