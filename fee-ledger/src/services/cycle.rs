//! Billing cycle scheduling: due-date advancement and record titling.

use crate::models::BillingCycle;
use chrono::{Months, NaiveDate};

/// Next due date after `from` for a recurring cycle.
///
/// Returns `None` for Once and Installment: those cycles are never
/// re-invoked. Custom pushes a century forward, parking the record so it
/// is never auto-rolled by the calendar.
pub fn next_due_date(from: NaiveDate, cycle: BillingCycle) -> Option<NaiveDate> {
    let months = match cycle {
        BillingCycle::Monthly => 1,
        BillingCycle::Quarterly => 3,
        BillingCycle::HalfYearly => 6,
        BillingCycle::Yearly => 12,
        BillingCycle::Custom => 1200,
        BillingCycle::Once | BillingCycle::Installment => return None,
    };
    from.checked_add_months(Months::new(months))
}

/// Display title for a record: Once and Installment use the bare structure
/// name; every other cycle is prefixed with the due month and year.
pub fn record_title(structure_name: &str, due_date: NaiveDate, cycle: BillingCycle) -> String {
    match cycle {
        BillingCycle::Once | BillingCycle::Installment => structure_name.to_string(),
        _ => format!("{} - {}", due_date.format("%b %Y"), structure_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn recurring_cycles_advance_by_their_period() {
        let from = d(2025, 1, 31);
        assert_eq!(
            next_due_date(from, BillingCycle::Monthly),
            Some(d(2025, 2, 28))
        );
        assert_eq!(
            next_due_date(from, BillingCycle::Quarterly),
            Some(d(2025, 4, 30))
        );
        assert_eq!(
            next_due_date(from, BillingCycle::HalfYearly),
            Some(d(2025, 7, 31))
        );
        assert_eq!(
            next_due_date(from, BillingCycle::Yearly),
            Some(d(2026, 1, 31))
        );
    }

    #[test]
    fn custom_parks_a_century_out() {
        assert_eq!(
            next_due_date(d(2025, 6, 1), BillingCycle::Custom),
            Some(d(2125, 6, 1))
        );
    }

    #[test]
    fn once_and_installment_never_roll() {
        assert_eq!(next_due_date(d(2025, 6, 1), BillingCycle::Once), None);
        assert_eq!(next_due_date(d(2025, 6, 1), BillingCycle::Installment), None);
    }

    #[test]
    fn titles_prefix_month_except_once_and_installment() {
        let due = d(2025, 4, 10);
        assert_eq!(
            record_title("Tuition", due, BillingCycle::Monthly),
            "Apr 2025 - Tuition"
        );
        assert_eq!(record_title("Admission", due, BillingCycle::Once), "Admission");
        assert_eq!(
            record_title("Annual Plan", due, BillingCycle::Installment),
            "Annual Plan"
        );
    }
}
