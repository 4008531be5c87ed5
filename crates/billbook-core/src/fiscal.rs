//! # Fiscal Years and Document Numbering
//!
//! Pure half of the sequence allocator: which fiscal year a date belongs
//! to, what number a call should receive given the stored sequence row,
//! and how that number is rendered.
//!
//! ## Allocation Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stored row?                                                            │
//! │   ├── none ───────────────────────────► issue 1, INSERT stored=2        │
//! │   └── some                                                              │
//! │        ├── same FY ───────────────────► issue n, CAS n → n+1            │
//! │        ├── newer FY, yearly reset ────► issue 1, CAS n → 2, FY := new   │
//! │        ├── newer FY, never reset ─────► issue n, CAS n → n+1, FY := new │
//! │        └── older FY, yearly reset ────► ClosedFiscalYear                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Number Format
//! `{BRANCH}-{TYPE_PREFIX}{NUMBER:0pad}/{FY_SHORT}`, e.g. `HQ-INV-0007/24`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::document::DocumentType;
use crate::error::{CoreError, CoreResult, ValidationError};

/// First month of the fiscal year (April).
pub const FISCAL_YEAR_START_MONTH: u32 = 4;

// =============================================================================
// Fiscal Year
// =============================================================================

/// An April–March accounting year, identified by the calendar year it
/// starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiscalYear {
    start_year: i32,
}

impl FiscalYear {
    pub const fn starting(start_year: i32) -> Self {
        FiscalYear { start_year }
    }

    /// The fiscal year a date falls in.
    ///
    /// ```rust
    /// use billbook_core::FiscalYear;
    /// use chrono::NaiveDate;
    ///
    /// let march = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
    /// let april = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
    /// assert_eq!(FiscalYear::containing(march).to_string(), "2024-2025");
    /// assert_eq!(FiscalYear::containing(april).to_string(), "2025-2026");
    /// ```
    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= FISCAL_YEAR_START_MONTH {
            FiscalYear::starting(date.year())
        } else {
            FiscalYear::starting(date.year() - 1)
        }
    }

    #[inline]
    pub const fn start_year(&self) -> i32 {
        self.start_year
    }

    #[inline]
    pub const fn end_year(&self) -> i32 {
        self.start_year + 1
    }

    /// Two-digit suffix used in document numbers (`24` for 2024-2025).
    pub fn short(&self) -> String {
        format!("{:02}", self.start_year.rem_euclid(100))
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year())
    }
}

impl FromStr for FiscalYear {
    type Err = ValidationError;

    /// Parses the stored `2024-2025` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "fiscal_year".to_string(),
            reason: reason.to_string(),
        };

        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected START-END"))?;
        let start: i32 = start.parse().map_err(|_| invalid("start year is not a number"))?;
        let end: i32 = end.parse().map_err(|_| invalid("end year is not a number"))?;

        if end != start + 1 {
            return Err(invalid("end year must follow start year"));
        }
        Ok(FiscalYear::starting(start))
    }
}

// =============================================================================
// Reset Policy
// =============================================================================

/// Whether numbering restarts at 1 when the fiscal year rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ResetPolicy {
    #[default]
    Yearly,
    Never,
}

impl ResetPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResetPolicy::Yearly => "yearly",
            ResetPolicy::Never => "never",
        }
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yearly" => Ok(ResetPolicy::Yearly),
            "never" => Ok(ResetPolicy::Never),
            _ => Err(ValidationError::NotAllowed {
                field: "reset_policy".to_string(),
                allowed: vec!["yearly".to_string(), "never".to_string()],
            }),
        }
    }
}

// =============================================================================
// Document Sequence
// =============================================================================

/// Stored numbering state for one (company, branch, document type).
///
/// `current_number` is the next number to hand out, not the last one
/// issued.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DocumentSequence {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub document_type: DocumentType,
    pub prefix: String,
    pub current_number: i64,
    pub padding: i64,
    pub fiscal_year: String,
    pub reset_policy: ResetPolicy,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl DocumentSequence {
    pub fn fiscal_year(&self) -> CoreResult<FiscalYear> {
        Ok(self.fiscal_year.parse()?)
    }
}

/// How the stored row must change to commit an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceWrite {
    /// No row yet: insert one holding `stored_after`.
    Insert,
    /// Compare-and-swap: only succeeds if the row still holds these values.
    CompareAndSwap {
        expected_number: i64,
        expected_fiscal_year: String,
    },
}

/// Outcome of [`plan_allocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Number handed to the caller.
    pub issued: i64,
    /// Value persisted as the row's `current_number`.
    pub stored_after: i64,
    /// Fiscal year of the document, printed in its number.
    pub fiscal_year: FiscalYear,
    /// Fiscal year persisted on the row. Later than `fiscal_year` only for
    /// a backdated document on a never-resetting sequence.
    pub stored_fiscal_year: FiscalYear,
    pub write: SequenceWrite,
}

/// Decides the number to issue for a document dated in `requested`.
pub fn plan_allocation(
    current: Option<&DocumentSequence>,
    requested: FiscalYear,
) -> CoreResult<AllocationPlan> {
    let Some(row) = current else {
        return Ok(AllocationPlan {
            issued: 1,
            stored_after: 2,
            fiscal_year: requested,
            stored_fiscal_year: requested,
            write: SequenceWrite::Insert,
        });
    };

    let stored_year = row.fiscal_year()?;
    let write = SequenceWrite::CompareAndSwap {
        expected_number: row.current_number,
        expected_fiscal_year: row.fiscal_year.clone(),
    };
    // A row can only hold 0 if written by hand; never issue 0.
    let next = row.current_number.max(1);

    match (row.reset_policy, requested.cmp(&stored_year)) {
        (ResetPolicy::Yearly, std::cmp::Ordering::Less) => Err(CoreError::ClosedFiscalYear {
            requested: requested.to_string(),
            current: stored_year.to_string(),
        }),
        (ResetPolicy::Yearly, std::cmp::Ordering::Greater) => Ok(AllocationPlan {
            issued: 1,
            stored_after: 2,
            fiscal_year: requested,
            stored_fiscal_year: requested,
            write,
        }),
        (ResetPolicy::Never, _) => Ok(AllocationPlan {
            issued: next,
            stored_after: next + 1,
            fiscal_year: requested,
            // the row never moves back a year
            stored_fiscal_year: requested.max(stored_year),
            write,
        }),
        (ResetPolicy::Yearly, std::cmp::Ordering::Equal) => Ok(AllocationPlan {
            issued: next,
            stored_after: next + 1,
            fiscal_year: stored_year,
            stored_fiscal_year: stored_year,
            write,
        }),
    }
}

/// Renders a document number.
///
/// ```rust
/// use billbook_core::fiscal::{format_document_number, FiscalYear};
///
/// let fy = FiscalYear::starting(2024);
/// assert_eq!(format_document_number("HQ", "INV-", 7, 4, fy), "HQ-INV-0007/24");
/// ```
pub fn format_document_number(
    branch_prefix: &str,
    type_prefix: &str,
    number: i64,
    padding: u32,
    fiscal_year: FiscalYear,
) -> String {
    format!(
        "{}-{}{:0width$}/{}",
        branch_prefix,
        type_prefix,
        number,
        fiscal_year.short(),
        width = padding as usize
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
