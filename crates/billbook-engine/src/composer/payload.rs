//! Request bodies accepted by the composer and their shape checks.
//!
//! Everything here runs before any read or write, so a malformed request
//! never consumes a document number.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use billbook_core::tax::DocumentDiscount;
use billbook_core::validation::{
    validate_amount, validate_bps, validate_line_count, validate_quantity, validate_rate_cents,
    validate_reference,
};
use billbook_core::{DocumentLine, DocumentPolicy, DocumentStatus, Money, ValidationError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub company_id: String,
    pub branch_id: String,
    pub party_id: String,
    /// Defaults to today.
    #[serde(default)]
    pub document_date: Option<NaiveDate>,
    /// Quotation, order or GRN this document is raised from; the parent
    /// invoice or bill of a return.
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub lines: Vec<LinePayload>,
    #[serde(default)]
    pub discount_bps: Option<u32>,
    #[serde(default)]
    pub discount_cents: Option<i64>,
    /// Payments only.
    #[serde(default)]
    pub amount_cents: Option<i64>,
    /// Payments only.
    #[serde(default)]
    pub allocations: Vec<AllocationPayload>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinePayload {
    pub item_id: String,
    pub quantity: i64,
    /// Exclusive of tax; defaults to the item's sale or purchase rate.
    #[serde(default)]
    pub rate_cents: Option<i64>,
    #[serde(default)]
    pub discount_bps: u32,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPayload {
    pub document_id: String,
    pub amount_cents: i64,
}

/// Changes to an existing document.
///
/// A status change is applied on its own; lines, discount and notes may be
/// combined.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub lines: Option<Vec<LinePayload>>,
    #[serde(default)]
    pub discount_bps: Option<u32>,
    #[serde(default)]
    pub discount_cents: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DocumentPayload {
    pub(crate) fn validate(&self, policy: &DocumentPolicy) -> Result<(), ValidationError> {
        validate_reference("company_id", &self.company_id)?;
        validate_reference("branch_id", &self.branch_id)?;
        validate_reference("party_id", &self.party_id)?;

        if let Some(source_id) = &self.source_id {
            validate_reference("source_id", source_id)?;
        } else if policy.is_return() {
            return Err(ValidationError::required("source_id"));
        }

        if policy.has_lines {
            if self.amount_cents.is_some() || !self.allocations.is_empty() {
                return Err(ValidationError::mismatch(
                    "allocations",
                    format!("{} does not take a payment amount", policy.document_type),
                ));
            }
            validate_lines(&self.lines)?;
            validate_discount(self.discount_bps, self.discount_cents)?;
        } else {
            if !self.lines.is_empty() {
                return Err(ValidationError::mismatch(
                    "lines",
                    format!("{} has no lines", policy.document_type),
                ));
            }
            let amount = self
                .amount_cents
                .ok_or_else(|| ValidationError::required("amount_cents"))?;
            validate_amount("amount_cents", amount)?;

            let mut allocated = 0i64;
            for (index, allocation) in self.allocations.iter().enumerate() {
                validate_reference("allocations.document_id", &allocation.document_id)?;
                validate_amount("allocations.amount_cents", allocation.amount_cents)?;
                if self.allocations[..index]
                    .iter()
                    .any(|a| a.document_id == allocation.document_id)
                {
                    return Err(ValidationError::mismatch(
                        "allocations",
                        format!("{} is allocated twice", allocation.document_id),
                    ));
                }
                allocated = allocated.saturating_add(allocation.amount_cents);
            }
            if allocated > amount {
                return Err(ValidationError::mismatch(
                    "allocations",
                    format!(
                        "allocated {} exceeds the payment {}",
                        Money::from_cents(allocated),
                        Money::from_cents(amount)
                    ),
                ));
            }
        }

        Ok(())
    }

    pub(crate) fn discount(&self) -> DocumentDiscount {
        DocumentDiscount::resolve(self.discount_bps, self.discount_cents.map(Money::from_cents))
    }
}

impl DocumentPatch {
    pub(crate) fn changes_content(&self) -> bool {
        self.lines.is_some() || self.discount_bps.is_some() || self.discount_cents.is_some()
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.status.is_some() && (self.changes_content() || self.notes.is_some()) {
            return Err(ValidationError::mismatch(
                "status",
                "a status change cannot be combined with other changes",
            ));
        }
        if let Some(lines) = &self.lines {
            validate_lines(lines)?;
        }
        validate_discount(self.discount_bps, self.discount_cents)
    }
}

impl LinePayload {
    /// The payload that prices to `line` again.
    pub(crate) fn from_line(line: &DocumentLine) -> Self {
        LinePayload {
            item_id: line.item_id.clone(),
            quantity: line.quantity,
            rate_cents: Some(line.rate_cents),
            discount_bps: u32::try_from(line.discount_bps).unwrap_or_default(),
            description: Some(line.description.clone()),
        }
    }
}

fn validate_lines(lines: &[LinePayload]) -> Result<(), ValidationError> {
    validate_line_count(lines.len())?;
    for line in lines {
        validate_reference("item_id", &line.item_id)?;
        validate_quantity(line.quantity)?;
        if let Some(rate) = line.rate_cents {
            validate_rate_cents(rate)?;
        }
        validate_bps("discount_bps", line.discount_bps)?;
    }
    Ok(())
}

fn validate_discount(bps: Option<u32>, cents: Option<i64>) -> Result<(), ValidationError> {
    if let Some(bps) = bps {
        validate_bps("discount_bps", bps)?;
    }
    if let Some(cents) = cents {
        if cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: "discount_cents".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use billbook_core::DocumentType;

    fn line(item_id: &str, quantity: i64) -> LinePayload {
        LinePayload {
            item_id: item_id.into(),
            quantity,
            ..Default::default()
        }
    }

    fn invoice() -> DocumentPayload {
        DocumentPayload {
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            party_id: "cust-1".into(),
            lines: vec![line("item-1", 2)],
            ..Default::default()
        }
    }

    #[test]
    fn test_required_references() {
        let policy = DocumentType::Invoice.policy();
        assert!(invoice().validate(policy).is_ok());

        let missing_branch = DocumentPayload {
            branch_id: " ".into(),
            ..invoice()
        };
        assert_eq!(
            missing_branch.validate(policy),
            Err(ValidationError::required("branch_id"))
        );

        let no_lines = DocumentPayload {
            lines: vec![],
            ..invoice()
        };
        assert_eq!(no_lines.validate(policy), Err(ValidationError::required("lines")));

        let bad_quantity = DocumentPayload {
            lines: vec![line("item-1", 0)],
            ..invoice()
        };
        assert!(bad_quantity.validate(policy).is_err());
    }

    #[test]
    fn test_returns_need_a_parent() {
        let policy = DocumentType::CreditNote.policy();
        assert_eq!(invoice().validate(policy), Err(ValidationError::required("source_id")));

        let with_parent = DocumentPayload {
            source_id: Some("inv-1".into()),
            ..invoice()
        };
        assert!(with_parent.validate(policy).is_ok());
    }

    #[test]
    fn test_payment_shape() {
        let policy = DocumentType::Payment.policy();
        let payment = DocumentPayload {
            lines: vec![],
            amount_cents: Some(10_000),
            allocations: vec![
                AllocationPayload {
                    document_id: "inv-1".into(),
                    amount_cents: 6_000,
                },
                AllocationPayload {
                    document_id: "inv-2".into(),
                    amount_cents: 4_000,
                },
            ],
            ..invoice()
        };
        assert!(payment.validate(policy).is_ok());

        let over = DocumentPayload {
            amount_cents: Some(9_999),
            ..payment.clone()
        };
        assert!(over.validate(policy).is_err());

        let mut twice = payment.clone();
        twice.allocations[1].document_id = "inv-1".into();
        assert!(twice.validate(policy).is_err());

        let with_lines = DocumentPayload {
            lines: vec![line("item-1", 1)],
            ..payment
        };
        assert!(with_lines.validate(policy).is_err());
    }

    #[test]
    fn test_percentage_discount_wins() {
        let payload = DocumentPayload {
            discount_bps: Some(500),
            discount_cents: Some(1_000),
            ..invoice()
        };
        assert_eq!(payload.discount(), DocumentDiscount::Percentage(500));
    }

    #[test]
    fn test_patch_rejects_mixed_status_change() {
        let patch = DocumentPatch {
            status: Some(DocumentStatus::Confirmed),
            notes: Some("late".into()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let content = DocumentPatch {
            lines: Some(vec![line("item-1", 3)]),
            discount_bps: Some(20_000),
            ..Default::default()
        };
        assert!(content.validate().is_err());
    }
}
