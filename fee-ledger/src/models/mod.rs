//! Domain models for the fee ledger engine.

mod assignment;
mod audit;
mod payment;
mod record;
mod structure;

pub use assignment::{AssignFee, FeeAssignment};
pub use audit::{Actor, AuditEntity, AuditLog};
pub use payment::{
    financial_year, format_receipt_no, FeePayment, FeeRefund, NewPayment, NewRefund, PaymentMode,
};
pub use record::{FeeRecord, FeeStatus, RecordFilter, SETTLE_EPSILON};
pub use structure::{
    BillingCycle, CreateStructure, FeeStructure, InstallmentEntry, LineItem, SupplyType, TaxConfig,
    TaxType, UpdateStructure,
};
