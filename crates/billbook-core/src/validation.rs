//! # Request Validation
//!
//! Shape checks on caller input. They need no storage, so the engine runs
//! them before it touches a sequence; a rejected request never burns a
//! document number.
//!
//! Business checks (transitions, locks, stock) live with their types in
//! `document.rs` and `inventory.rs`. The schema's CHECK, UNIQUE and
//! FOREIGN KEY constraints are the last line.
//!
//! ```rust
//! use billbook_core::validation::{validate_quantity, validate_reference};
//!
//! validate_reference("branch_id", "br-1").unwrap();
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{BPS_PER_UNIT, MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY, MAX_RATE_CENTS};

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_REFERENCE_LEN: usize = 64;
const MAX_PREFIX_LEN: usize = 16;

fn within(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        })
    }
}

fn bounded_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.is_empty() {
        Err(ValidationError::required(field))
    } else if value.chars().count() > max {
        Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        })
    } else {
        Ok(())
    }
}

/// An id naming another record. Surrounding whitespace does not count.
///
/// ```rust
/// use billbook_core::validation::validate_reference;
///
/// assert!(validate_reference("party_id", "cust-1").is_ok());
/// assert!(validate_reference("party_id", "  ").is_err());
/// ```
pub fn validate_reference(field: &str, id: &str) -> ValidationResult<()> {
    bounded_text(field, id.trim(), MAX_REFERENCE_LEN)
}

/// Branch or document-type prefix, e.g. `HQ` or `INV-`.
///
/// `/` is reserved for the fiscal-year suffix and whitespace would break
/// number parsing, so only ASCII letters, digits and `-` pass.
pub fn validate_prefix(field: &str, prefix: &str) -> ValidationResult<()> {
    bounded_text(field, prefix, MAX_PREFIX_LEN)?;
    if let Some(bad) = prefix
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("unexpected character {bad:?}"),
        });
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    within("quantity", quantity, 1, MAX_LINE_QUANTITY)
}

/// Unit rate, whether overridden on the line or taken from the item.
/// Zero is a free line.
pub fn validate_rate_cents(cents: i64) -> ValidationResult<()> {
    within("rate", cents, 0, MAX_RATE_CENTS)
}

/// Payment, allocation and return amounts.
pub fn validate_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents > 0 {
        Ok(())
    } else {
        Err(ValidationError::MustBePositive {
            field: field.to_string(),
        })
    }
}

/// A percentage in basis points, 0 to 100%.
pub fn validate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    within(field, i64::from(bps), 0, BPS_PER_UNIT)
}

pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::required("lines"));
    }
    let max = MAX_DOCUMENT_LINES as i64;
    within("lines", i64::try_from(count).unwrap_or(i64::MAX), 1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_is_trimmed_and_bounded() {
        assert!(validate_reference("branch_id", "br-1").is_ok());
        assert!(validate_reference("branch_id", " br-1 ").is_ok());
        assert_eq!(
            validate_reference("branch_id", " \t"),
            Err(ValidationError::required("branch_id"))
        );
        assert_eq!(
            validate_reference("branch_id", &"x".repeat(65)),
            Err(ValidationError::TooLong {
                field: "branch_id".into(),
                max: 64
            })
        );
    }

    #[test]
    fn test_prefix_characters() {
        for ok in ["HQ", "INV-", "GRN-", "B2"] {
            assert!(validate_prefix("prefix", ok).is_ok(), "{ok}");
        }
        for bad in ["", "IN V", "INV/", "ÜB", &"A".repeat(17)] {
            assert!(validate_prefix("prefix", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_quantity(-3).is_err());
        assert!(matches!(
            validate_quantity(MAX_LINE_QUANTITY + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_money_inputs() {
        assert!(validate_rate_cents(0).is_ok());
        assert!(validate_rate_cents(-1).is_err());
        assert!(validate_rate_cents(MAX_RATE_CENTS).is_ok());
        assert_eq!(
            validate_rate_cents(MAX_RATE_CENTS + 1),
            Err(ValidationError::OutOfRange {
                field: "rate".into(),
                min: 0,
                max: MAX_RATE_CENTS,
            })
        );
        assert!(validate_amount("amount_cents", 1).is_ok());
        assert!(validate_amount("amount_cents", 0).is_err());
        assert!(validate_bps("discount_bps", 10_000).is_ok());
        assert!(validate_bps("discount_bps", 10_001).is_err());
    }

    #[test]
    fn test_line_count() {
        assert!(validate_line_count(1).is_ok());
        assert_eq!(validate_line_count(0), Err(ValidationError::required("lines")));
        assert!(validate_line_count(MAX_DOCUMENT_LINES).is_ok());
        assert!(validate_line_count(MAX_DOCUMENT_LINES + 1).is_err());
    }
}
