//! Fee structure model: the reusable billing template.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing recurrence of a fee structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Once,
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
    Custom,
    Installment,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Once => "once",
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::HalfYearly => "half_yearly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::Custom => "custom",
            BillingCycle::Installment => "installment",
        }
    }

    /// Cycles that roll over to a fresh record once the current one is paid.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, BillingCycle::Once | BillingCycle::Installment)
    }
}

/// GST treatment of the base amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    None,
    GstInclusive,
    GstExclusive,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::None => "none",
            TaxType::GstInclusive => "gst_inclusive",
            TaxType::GstExclusive => "gst_exclusive",
        }
    }
}

/// Place of supply, which decides the CGST/SGST vs IGST split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyType {
    IntraState,
    InterState,
}

/// Tax configuration carried by a structure and snapshotted onto records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxConfig {
    pub tax_type: TaxType,
    pub rate: Decimal,
    pub supply_type: SupplyType,
    pub cess_rate: Decimal,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            tax_type: TaxType::None,
            rate: Decimal::ZERO,
            supply_type: SupplyType::IntraState,
            cess_rate: Decimal::ZERO,
        }
    }
}

/// One entry of an installment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentEntry {
    pub label: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// Named breakdown line shown on invoices; informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub amount: Decimal,
}

/// Reusable fee template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStructure {
    pub structure_id: Uuid,
    pub coaching_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub cycle: BillingCycle,
    pub late_fine_per_day: Decimal,
    pub tax: TaxConfig,
    pub installment_plan: Option<Vec<InstallmentEntry>>,
    pub line_items: Vec<LineItem>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a fee structure.
#[derive(Debug, Clone)]
pub struct CreateStructure {
    pub coaching_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub cycle: BillingCycle,
    pub late_fine_per_day: Decimal,
    pub tax: TaxConfig,
    pub installment_plan: Option<Vec<InstallmentEntry>>,
    pub line_items: Vec<LineItem>,
}

/// Input for updating a fee structure. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateStructure {
    pub name: Option<String>,
    pub amount: Option<Decimal>,
    pub late_fine_per_day: Option<Decimal>,
    pub tax: Option<TaxConfig>,
    pub installment_plan: Option<Vec<InstallmentEntry>>,
    pub line_items: Option<Vec<LineItem>>,
    pub is_active: Option<bool>,
}
