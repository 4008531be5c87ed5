//! # Tax Computation
//!
//! Splits line tax into CGST/SGST (intra-state) or IGST (inter-state) and
//! aggregates lines into document totals.
//!
//! ## Computation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per line (exact, PreciseAmount)                                        │
//! │    gross    = quantity × rate                                          │
//! │    taxable  = gross − gross × discount% / 100                          │
//! │    intra:  cgst = sgst = taxable × (tax% / 2) / 100,  igst = 0          │
//! │    inter:  igst = taxable × tax% / 100,         cgst = sgst = 0         │
//! │    tax      = cgst + sgst + igst                                        │
//! │    total    = taxable + tax                                             │
//! │                                                                         │
//! │  per document (rounded ONCE)                                            │
//! │    subtotal = round(Σ taxable)       tax = round(Σ cgst) + …            │
//! │    discount = % of (subtotal + tax)  or flat amount (% wins)           │
//! │    total    = subtotal + tax − discount                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use billbook_core::tax::{aggregate, compute_line, DocumentDiscount, LineInput};
//! use billbook_core::types::TaxRate;
//! use billbook_core::Money;
//!
//! let line = compute_line(&LineInput {
//!     quantity: 10,
//!     rate: Money::from_cents(10_000),
//!     discount_bps: 1_000,
//!     tax_rate: TaxRate::from_bps(1_800),
//!     is_interstate: false,
//! })?;
//! let totals = aggregate(&[line], DocumentDiscount::None)?;
//! assert_eq!(totals.total.cents(), 106_200);
//! # Ok::<(), billbook_core::ValidationError>(())
//! ```
//!
//! Every step is checked: a product or sum that leaves the `i128` working
//! range or the `i64` cent range is a [`ValidationError::Overflow`].

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{round_half_away, Money, PreciseAmount};
use crate::types::TaxRate;
use crate::validation::ValidationResult;
use crate::BPS_PER_UNIT;

/// Units of [`PreciseAmount`] per `cent × bps`.
///
/// `quantity × rate_cents × (10000 − discount_bps)` is in 1e-4 cents;
/// multiplying by this brings it to 1e-8 cents.
const TAXABLE_SCALE: i128 = PreciseAmount::UNITS_PER_CENT / BPS_PER_UNIT as i128;

// =============================================================================
// Line Computation
// =============================================================================

/// Inputs for one document line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub quantity: i64,
    /// Unit rate exclusive of tax.
    pub rate: Money,
    /// Line discount in basis points (1000 = 10%).
    pub discount_bps: u32,
    pub tax_rate: TaxRate,
    pub is_interstate: bool,
}

/// Exact (un-rounded) tax breakdown of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTax {
    pub taxable: PreciseAmount,
    pub cgst: PreciseAmount,
    pub sgst: PreciseAmount,
    pub igst: PreciseAmount,
    pub tax: PreciseAmount,
    pub line_total: PreciseAmount,
    pub cgst_rate_bps: u32,
    pub sgst_rate_bps: u32,
    pub igst_rate_bps: u32,
}

/// Display amounts of one line, each rounded to cents.
///
/// `tax == cgst + sgst + igst` and `line_total == taxable + tax` hold on the
/// rounded values too. Document totals are NOT the sum of these; they are
/// rounded from the exact line values (see [`aggregate`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineAmounts {
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
    pub tax: Money,
    pub line_total: Money,
}

impl LineTax {
    /// Rounds each component for display/storage on the line row.
    pub fn rounded(&self) -> ValidationResult<LineAmounts> {
        let taxable = self.taxable.round()?;
        let cgst = self.cgst.round()?;
        let sgst = self.sgst.round()?;
        let igst = self.igst.round()?;
        let tax = money_sum("tax", [cgst, sgst, igst])?;
        Ok(LineAmounts {
            taxable,
            cgst,
            sgst,
            igst,
            tax,
            line_total: money_sum("line_total", [taxable, tax])?,
        })
    }
}

fn money_sum(field: &str, amounts: impl IntoIterator<Item = Money>) -> ValidationResult<Money> {
    amounts
        .into_iter()
        .try_fold(Money::zero(), Money::checked_add)
        .ok_or_else(|| ValidationError::overflow(field))
}

fn precise_sum(
    field: &str,
    amounts: impl IntoIterator<Item = PreciseAmount>,
) -> ValidationResult<PreciseAmount> {
    amounts
        .into_iter()
        .try_fold(PreciseAmount::zero(), PreciseAmount::checked_add)
        .ok_or_else(|| ValidationError::overflow(field))
}

/// Computes the tax split for a single line.
///
/// Intra-state lines split the rate evenly between CGST and SGST; inter-state
/// lines carry the full rate as IGST. Exactly one of the two is non-zero for
/// any line with a non-zero taxable amount and tax rate.
pub fn compute_line(input: &LineInput) -> ValidationResult<LineTax> {
    let overflow = || ValidationError::overflow("line_total");
    let quantity = i128::from(input.quantity);
    let rate = i128::from(input.rate.cents());
    let discount = i128::from(input.discount_bps);
    let tax_bps = i128::from(input.tax_rate.bps());
    let bps = i128::from(BPS_PER_UNIT);

    // quantity·rate − quantity·rate·discount%/100, in 1e-8 cents
    let taxable = quantity
        .checked_mul(rate)
        .and_then(|gross| gross.checked_mul(bps - discount))
        .and_then(|net| net.checked_mul(TAXABLE_SCALE))
        .ok_or_else(overflow)?;
    let scaled_tax = taxable.checked_mul(tax_bps).ok_or_else(overflow)?;

    let (cgst, sgst, igst, cgst_rate, sgst_rate, igst_rate) = if input.is_interstate {
        let igst = scaled_tax / bps;
        (0, 0, igst, 0, 0, input.tax_rate.bps())
    } else {
        let half = scaled_tax / (2 * bps);
        let half_rate = input.tax_rate.bps() / 2;
        (
            half,
            half,
            0,
            half_rate,
            input.tax_rate.bps() - half_rate,
            0,
        )
    };
    let tax = cgst + sgst + igst;
    let line_total = taxable.checked_add(tax).ok_or_else(overflow)?;

    Ok(LineTax {
        taxable: PreciseAmount::from_units(taxable),
        cgst: PreciseAmount::from_units(cgst),
        sgst: PreciseAmount::from_units(sgst),
        igst: PreciseAmount::from_units(igst),
        tax: PreciseAmount::from_units(tax),
        line_total: PreciseAmount::from_units(line_total),
        cgst_rate_bps: cgst_rate,
        sgst_rate_bps: sgst_rate,
        igst_rate_bps: igst_rate,
    })
}

// =============================================================================
// Document Aggregation
// =============================================================================

/// Document-level discount applied on the post-tax subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentDiscount {
    #[default]
    None,
    Percentage(u32),
    Flat(Money),
}

impl DocumentDiscount {
    /// Picks the discount to apply; a percentage wins over a flat amount when
    /// both are supplied. Zero values count as "not supplied".
    pub fn resolve(percentage_bps: Option<u32>, flat: Option<Money>) -> Self {
        match (percentage_bps, flat) {
            (Some(bps), _) if bps > 0 => DocumentDiscount::Percentage(bps),
            (_, Some(amount)) if amount.is_positive() => DocumentDiscount::Flat(amount),
            _ => DocumentDiscount::None,
        }
    }

    /// Basis points recorded on the header (0 for flat/no discount).
    pub fn bps(&self) -> u32 {
        match self {
            DocumentDiscount::Percentage(bps) => *bps,
            _ => 0,
        }
    }
}

/// Rounded document totals.
///
/// ## Invariants
/// - `tax == cgst + sgst + igst`
/// - `total == subtotal + tax − discount`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentTotals {
    pub subtotal: Money,
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Aggregates exact line values and rounds once.
pub fn aggregate(
    lines: &[LineTax],
    discount: DocumentDiscount,
) -> ValidationResult<DocumentTotals> {
    let subtotal = precise_sum("subtotal", lines.iter().map(|l| l.taxable))?.round()?;
    let cgst = precise_sum("cgst", lines.iter().map(|l| l.cgst))?.round()?;
    let sgst = precise_sum("sgst", lines.iter().map(|l| l.sgst))?.round()?;
    let igst = precise_sum("igst", lines.iter().map(|l| l.igst))?.round()?;
    let tax = money_sum("tax", [cgst, sgst, igst])?;
    let gross = money_sum("total", [subtotal, tax])?;

    let discount = match discount {
        DocumentDiscount::None => Money::zero(),
        DocumentDiscount::Percentage(bps) => gross.percentage(bps),
        DocumentDiscount::Flat(amount) => amount.min(gross),
    };

    Ok(DocumentTotals {
        subtotal,
        cgst,
        sgst,
        igst,
        tax,
        discount,
        total: gross - discount,
    })
}

// =============================================================================
// Reverse (Price-Inclusive) Mode
// =============================================================================

/// Result of splitting a tax-inclusive master price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusiveSplit {
    pub taxable: Money,
    pub tax: Money,
}

/// Back-calculates the taxable value from a tax-inclusive price.
///
/// `taxable = price / (1 + rate/100)`, `tax = price − taxable`. Used for
/// master pricing only; document lines always carry exclusive rates.
///
/// ```rust
/// use billbook_core::tax::split_inclusive_price;
/// use billbook_core::types::TaxRate;
/// use billbook_core::Money;
///
/// let split = split_inclusive_price(Money::from_cents(11_800), TaxRate::from_bps(1_800));
/// assert_eq!(split.taxable.cents(), 10_000);
/// assert_eq!(split.tax.cents(), 1_800);
/// ```
pub fn split_inclusive_price(price_with_tax: Money, rate: TaxRate) -> InclusiveSplit {
    let bps = i128::from(BPS_PER_UNIT);
    let taxable = round_half_away(
        i128::from(price_with_tax.cents()) * bps,
        bps + i128::from(rate.bps()),
    );
    // |taxable| <= |price_with_tax|
    let taxable = Money::from_cents(i64::try_from(taxable).unwrap_or(price_with_tax.cents()));
    InclusiveSplit {
        taxable,
        tax: price_with_tax - taxable,
    }
}

// =============================================================================
// Inter-state Determination
// =============================================================================

/// Returns the two-character state code of a tax id, if it has one.
pub fn state_code(tax_id: &str) -> Option<&str> {
    let trimmed = tax_id.trim();
    if trimmed.len() < 2 || !trimmed.is_char_boundary(2) {
        return None;
    }
    Some(&trimmed[..2])
}

/// Decides whether a supply between company and party is inter-state.
///
/// Compares the state codes (first two characters) of both tax ids; a
/// mismatch means inter-state. When either side has no usable tax id the
/// supply is treated as intra-state.
pub fn is_interstate(company_tax_id: Option<&str>, party_tax_id: Option<&str>) -> bool {
    match (
        company_tax_id.and_then(state_code),
        party_tax_id.and_then(state_code),
    ) {
        (Some(ours), Some(theirs)) => !ours.eq_ignore_ascii_case(theirs),
        _ => false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY, MAX_RATE_CENTS};
    use proptest::prelude::*;

    fn line(quantity: i64, rate_cents: i64, discount_bps: u32, tax_bps: u32, inter: bool) -> LineTax {
        compute_line(&LineInput {
            quantity,
            rate: Money::from_cents(rate_cents),
            discount_bps,
            tax_rate: TaxRate::from_bps(tax_bps),
            is_interstate: inter,
        })
        .unwrap()
    }

    #[test]
    fn test_intra_state_worked_example() {
        let amounts = line(10, 10_000, 1_000, 1_800, false).rounded().unwrap();
        assert_eq!(amounts.taxable.cents(), 90_000);
        assert_eq!(amounts.cgst.cents(), 8_100);
        assert_eq!(amounts.sgst.cents(), 8_100);
        assert_eq!(amounts.igst.cents(), 0);
        assert_eq!(amounts.tax.cents(), 16_200);
        assert_eq!(amounts.line_total.cents(), 106_200);
    }

    #[test]
    fn test_inter_state_uses_igst_only() {
        let tax = line(10, 10_000, 1_000, 1_800, true);
        let amounts = tax.rounded().unwrap();
        assert_eq!(amounts.igst.cents(), 16_200);
        assert_eq!(amounts.cgst.cents(), 0);
        assert_eq!(amounts.sgst.cents(), 0);
        assert_eq!(tax.igst_rate_bps, 1_800);
        assert_eq!(tax.cgst_rate_bps, 0);
    }

    #[test]
    fn test_odd_rate_splits_between_cgst_and_sgst() {
        let tax = line(1, 10_000, 0, 25, false);
        assert_eq!(tax.cgst_rate_bps + tax.sgst_rate_bps, 25);
        assert_eq!(tax.cgst, tax.sgst);
    }

    #[test]
    fn test_aggregate_rounds_once() {
        // 1 × 0.01 at 18%: tax per line is 0.0018, three lines 0.0054
        let lines = vec![line(1, 1, 0, 1_800, false); 3];
        let per_line: Money = lines.iter().map(|l| l.rounded().unwrap().tax).sum();
        let totals = aggregate(&lines, DocumentDiscount::None).unwrap();
        assert_eq!(per_line.cents(), 0);
        assert_eq!(totals.subtotal.cents(), 3);
        assert_eq!(totals.tax.cents(), 0);

        // 70 lines of 0.0009 cgst each → 0.063 → 0.06 on aggregate
        let lines = vec![line(1, 1, 0, 1_800, false); 70];
        let totals = aggregate(&lines, DocumentDiscount::None).unwrap();
        assert_eq!(totals.cgst.cents(), 6);
        assert_eq!(totals.tax, totals.cgst + totals.sgst + totals.igst);
    }

    #[test]
    fn test_percentage_discount_wins_over_flat() {
        let discount = DocumentDiscount::resolve(Some(1_000), Some(Money::from_cents(500)));
        assert_eq!(discount, DocumentDiscount::Percentage(1_000));

        let totals = aggregate(&[line(10, 10_000, 1_000, 1_800, false)], discount).unwrap();
        assert_eq!(totals.discount.cents(), 10_620);
        assert_eq!(totals.total.cents(), 95_580);
        assert_eq!(totals.total, totals.subtotal + totals.tax - totals.discount);
    }

    #[test]
    fn test_flat_discount_is_capped_at_gross() {
        let discount = DocumentDiscount::resolve(None, Some(Money::from_cents(1_000_000)));
        let totals = aggregate(&[line(1, 10_000, 0, 0, false)], discount).unwrap();
        assert_eq!(totals.discount.cents(), 10_000);
        assert!(totals.total.is_zero());
    }

    #[test]
    fn test_zero_discounts_resolve_to_none() {
        assert_eq!(
            DocumentDiscount::resolve(Some(0), Some(Money::zero())),
            DocumentDiscount::None
        );
        assert_eq!(
            DocumentDiscount::resolve(Some(0), Some(Money::from_cents(100))),
            DocumentDiscount::Flat(Money::from_cents(100))
        );
    }

    #[test]
    fn test_oversized_line_is_rejected_not_wrapped() {
        let huge = compute_line(&LineInput {
            quantity: 1_000,
            rate: Money::from_cents(10_000_000_000_000_000),
            discount_bps: 0,
            tax_rate: TaxRate::zero(),
            is_interstate: false,
        })
        .unwrap();
        assert_eq!(huge.rounded(), Err(ValidationError::overflow("amount")));
        assert!(aggregate(&[huge], DocumentDiscount::None).is_err());

        let beyond_i128 = compute_line(&LineInput {
            quantity: i64::MAX,
            rate: Money::from_cents(i64::MAX),
            discount_bps: 0,
            tax_rate: TaxRate::from_bps(1_800),
            is_interstate: true,
        });
        assert_eq!(beyond_i128, Err(ValidationError::overflow("line_total")));
    }

    #[test]
    fn test_largest_accepted_document_fits() {
        let widest = line(MAX_LINE_QUANTITY, MAX_RATE_CENTS, 0, 2_800, false);
        let lines = vec![widest; MAX_DOCUMENT_LINES];

        let totals = aggregate(&lines, DocumentDiscount::None).unwrap();
        let subtotal = MAX_LINE_QUANTITY * MAX_RATE_CENTS * MAX_DOCUMENT_LINES as i64;
        assert_eq!(totals.subtotal.cents(), subtotal);
        assert_eq!(totals.tax.cents(), subtotal / 100 * 28);
        assert!(totals.total.is_positive());
        assert_eq!(totals.total, totals.subtotal + totals.tax);
    }

    #[test]
    fn test_inclusive_split() {
        let split = split_inclusive_price(Money::from_cents(10_500), TaxRate::from_bps(500));
        assert_eq!(split.taxable.cents(), 10_000);
        assert_eq!(split.tax.cents(), 500);

        let untaxed = split_inclusive_price(Money::from_cents(999), TaxRate::zero());
        assert_eq!(untaxed.taxable.cents(), 999);
        assert!(untaxed.tax.is_zero());
    }

    #[test]
    fn test_interstate_determination() {
        assert!(!is_interstate(Some("27AAACB1234C1Z5"), Some("27ZZZCB1234C1Z5")));
        assert!(is_interstate(Some("27AAACB1234C1Z5"), Some("29AAACB1234C1Z5")));
        assert!(!is_interstate(Some("27AAACB1234C1Z5"), None));
        assert!(!is_interstate(None, Some("29AAACB1234C1Z5")));
        assert!(!is_interstate(Some("2"), Some("29AAACB1234C1Z5")));
    }

    proptest! {
        #[test]
        fn prop_tax_split_invariant(
            quantity in 1i64..10_000,
            rate in 0i64..10_000_000,
            discount in 0u32..=10_000,
            tax_bps in prop::sample::select(vec![0u32, 25, 300, 500, 1_200, 1_800, 2_800]),
            inter in any::<bool>(),
        ) {
            let tax = line(quantity, rate, discount, tax_bps, inter);
            prop_assert_eq!(tax.cgst + tax.sgst + tax.igst, tax.tax);
            prop_assert_eq!(tax.taxable + tax.tax, tax.line_total);

            let amounts = tax.rounded().unwrap();
            let diff = (amounts.cgst + amounts.sgst + amounts.igst - amounts.tax).cents().abs();
            prop_assert!(diff <= 1);

            // exactly one of {cgst/sgst pair, igst} carries tax
            if inter {
                prop_assert!(tax.cgst.is_zero() && tax.sgst.is_zero());
            } else {
                prop_assert!(tax.igst.is_zero());
            }
        }

        #[test]
        fn prop_document_totals_balance(
            quantities in prop::collection::vec(1i64..500, 1..20),
            rate in 1i64..1_000_000,
            discount in 0u32..=10_000,
        ) {
            let lines: Vec<LineTax> = quantities
                .iter()
                .map(|q| line(*q, rate, 0, 1_800, false))
                .collect();
            let discount = DocumentDiscount::resolve(Some(discount), None);
            let totals = aggregate(&lines, discount).unwrap();
            prop_assert_eq!(totals.total, totals.subtotal + totals.tax - totals.discount);
            prop_assert_eq!(totals.tax, totals.cgst + totals.sgst + totals.igst);
            prop_assert!(!totals.total.is_negative());
        }
    }
}
