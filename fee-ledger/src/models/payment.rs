//! Payment and refund models, plus receipt numbering helpers.

use super::audit::Actor;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
    BankTransfer,
    Cheque,
    Online,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Upi => "upi",
            PaymentMode::Card => "card",
            PaymentMode::BankTransfer => "bank_transfer",
            PaymentMode::Cheque => "cheque",
            PaymentMode::Online => "online",
        }
    }
}

/// Immutable row for money received against a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeePayment {
    pub payment_id: Uuid,
    pub coaching_id: Uuid,
    pub record_id: Uuid,
    pub member_id: Uuid,
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub transaction_ref: Option<String>,
    pub receipt_no: String,
    pub note: Option<String>,
    pub recorded_by: Actor,
    pub paid_utc: DateTime<Utc>,
}

/// Immutable row for money returned against a settled record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRefund {
    pub refund_id: Uuid,
    pub coaching_id: Uuid,
    pub record_id: Uuid,
    pub member_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub mode: PaymentMode,
    pub recorded_by: Actor,
    pub refunded_utc: DateTime<Utc>,
}

/// Payment row handed to the store's atomic commit. The store allocates
/// the receipt number from the per-(coaching, FY) sequence inside the same
/// commit that writes the payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_id: Uuid,
    pub coaching_id: Uuid,
    pub record_id: Uuid,
    pub member_id: Uuid,
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub transaction_ref: Option<String>,
    pub note: Option<String>,
    pub recorded_by: Actor,
    pub financial_year: String,
    pub paid_utc: DateTime<Utc>,
}

/// Refund row handed to the store's atomic commit.
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub refund_id: Uuid,
    pub coaching_id: Uuid,
    pub record_id: Uuid,
    pub member_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub mode: PaymentMode,
    pub recorded_by: Actor,
    pub refunded_utc: DateTime<Utc>,
}

/// Indian financial year label for a date: April through March, e.g.
/// 2025-07-01 -> "2025-26", 2026-02-01 -> "2025-26".
pub fn financial_year(date: NaiveDate) -> String {
    let start = if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{:02}", start, (start + 1) % 100)
}

/// Receipt number format: `TXR/<financial-year>/<zero-padded-sequence>`.
///
/// The sequence is allocated per (coaching, financial year), so the
/// string is unique within a coaching tenant but repeats across tenants.
/// Global identity is the pair (coaching_id, receipt_no).
pub fn format_receipt_no(financial_year: &str, sequence: i64) -> String {
    format!("TXR/{}/{:06}", financial_year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn financial_year_spans_april_to_march() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(financial_year(d(2025, 4, 1)), "2025-26");
        assert_eq!(financial_year(d(2025, 12, 31)), "2025-26");
        assert_eq!(financial_year(d(2026, 3, 31)), "2025-26");
        assert_eq!(financial_year(d(2026, 4, 1)), "2026-27");
        assert_eq!(financial_year(d(2000, 1, 15)), "1999-00");
    }

    #[test]
    fn receipt_numbers_are_zero_padded() {
        assert_eq!(format_receipt_no("2025-26", 1), "TXR/2025-26/000001");
        assert_eq!(format_receipt_no("2025-26", 123456), "TXR/2025-26/123456");
    }
}
