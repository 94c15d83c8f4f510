//! GST tax calculator.
//!
//! Pure and deterministic: the self-heal pass and the live recompute at
//! payment time both rely on re-deriving identical breakdowns from the
//! same inputs.

use crate::models::{SupplyType, TaxConfig, TaxType};
use rust_decimal::{Decimal, RoundingStrategy};

/// Full tax breakdown for one net amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxBreakdown {
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub cess_amount: Decimal,
    pub total_with_tax: Decimal,
}

impl TaxBreakdown {
    fn zero(base: Decimal) -> Self {
        Self {
            taxable_amount: base,
            tax_amount: Decimal::ZERO,
            cgst_amount: Decimal::ZERO,
            sgst_amount: Decimal::ZERO,
            igst_amount: Decimal::ZERO,
            cess_amount: Decimal::ZERO,
            total_with_tax: base,
        }
    }
}

fn round_unit(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the tax breakdown for a net (post-discount) base amount.
///
/// Tax and cess round to the nearest whole currency unit before the split,
/// and the intra-state split uses floor for CGST with the remainder going
/// to SGST, so CGST + SGST always reconstructs the rounded tax exactly.
/// Inter-state supplies route the whole tax to IGST.
pub fn compute(base: Decimal, config: &TaxConfig) -> TaxBreakdown {
    if config.tax_type == TaxType::None
        || (config.rate <= Decimal::ZERO && config.cess_rate <= Decimal::ZERO)
    {
        return TaxBreakdown::zero(base);
    }

    let rate = config.rate / Decimal::ONE_HUNDRED;
    let cess_rate = config.cess_rate / Decimal::ONE_HUNDRED;

    let (taxable, tax, cess, total) = match config.tax_type {
        TaxType::GstExclusive => {
            let tax = round_unit(base * rate);
            let cess = round_unit(base * cess_rate);
            (base, tax, cess, base + tax + cess)
        }
        TaxType::GstInclusive => {
            // Tax is already inside the base; extract the taxable portion.
            let taxable = (base / (Decimal::ONE + rate + cess_rate)).round_dp(2);
            let tax = round_unit(taxable * rate);
            let cess = round_unit(taxable * cess_rate);
            (taxable, tax, cess, base)
        }
        TaxType::None => unreachable!("handled above"),
    };

    let (cgst, sgst, igst) = match config.supply_type {
        SupplyType::IntraState => {
            let cgst = (tax / Decimal::TWO).floor();
            (cgst, tax - cgst, Decimal::ZERO)
        }
        SupplyType::InterState => (Decimal::ZERO, Decimal::ZERO, tax),
    };

    TaxBreakdown {
        taxable_amount: taxable,
        tax_amount: tax,
        cgst_amount: cgst,
        sgst_amount: sgst,
        igst_amount: igst,
        cess_amount: cess,
        total_with_tax: total,
    }
}
