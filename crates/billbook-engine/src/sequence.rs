//! # Sequence Allocator
//!
//! Hands out document numbers per (company, branch, type, fiscal year).
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1                                                              │
//! │    read row ──► plan_allocation (core) ──► INSERT / compare-and-swap    │
//! │                                              │                          │
//! │                              won ◄───────────┤                          │
//! │                                              │ lost                     │
//! │  attempt 2                                   ▼                          │
//! │    re-read row ──► plan ──► write ──► won, or SequenceContention        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A lost write never consumes a number: the loser re-reads and plans
//! again from what the winner stored.

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use billbook_core::fiscal::{format_document_number, plan_allocation, AllocationPlan, SequenceWrite};
use billbook_core::{Branch, DocumentSequence, DocumentType, FiscalYear, DEFAULT_SEQUENCE_PADDING};
use billbook_db::Database;

use crate::config::NumberingSettings;
use crate::error::{EngineError, EngineResult};

/// Reads-and-writes tried before giving up with
/// [`EngineError::SequenceContention`].
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 2;

/// A number that now belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedNumber {
    /// Formatted, e.g. `HQ-INV-0007/24`.
    pub document_number: String,
    pub sequence_number: i64,
    pub fiscal_year: FiscalYear,
}

#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    db: Database,
    numbering: NumberingSettings,
}

impl SequenceAllocator {
    pub fn new(db: Database, numbering: NumberingSettings) -> Self {
        SequenceAllocator { db, numbering }
    }

    /// Allocates the next number for a document of `document_type` dated
    /// `as_of` at `branch`.
    pub async fn allocate(
        &self,
        company_id: &str,
        branch: &Branch,
        document_type: DocumentType,
        as_of: NaiveDate,
    ) -> EngineResult<AllocatedNumber> {
        let requested = FiscalYear::containing(as_of);
        let repo = self.db.sequences();

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let current = repo.get(company_id, &branch.id, document_type).await?;
            let plan = plan_allocation(current.as_ref(), requested)?;

            let (won, prefix, padding) = match (&plan.write, current) {
                (SequenceWrite::Insert, _) => {
                    let row = self.first_row(company_id, &branch.id, document_type, &plan);
                    let won = repo.try_insert(&row).await?;
                    (won, row.prefix, row.padding)
                }
                (
                    SequenceWrite::CompareAndSwap {
                        expected_number,
                        expected_fiscal_year,
                    },
                    Some(row),
                ) => {
                    let won = repo
                        .compare_and_swap(
                            &row.id,
                            *expected_number,
                            expected_fiscal_year,
                            plan.stored_after,
                            plan.stored_fiscal_year,
                        )
                        .await?;
                    (won, row.prefix, row.padding)
                }
                // plan_allocation only asks for a swap when a row was read
                (SequenceWrite::CompareAndSwap { .. }, None) => (false, String::new(), 0),
            };

            if won {
                let padding = u32::try_from(padding).unwrap_or(DEFAULT_SEQUENCE_PADDING);
                let document_number = format_document_number(
                    &branch.document_prefix,
                    &prefix,
                    plan.issued,
                    padding,
                    plan.fiscal_year,
                );
                info!(
                    branch_id = %branch.id,
                    document_type = %document_type,
                    number = %document_number,
                    "Allocated document number"
                );
                return Ok(AllocatedNumber {
                    document_number,
                    sequence_number: plan.issued,
                    fiscal_year: plan.fiscal_year,
                });
            }

            warn!(
                branch_id = %branch.id,
                document_type = %document_type,
                attempt,
                "Sequence write lost to a concurrent allocation"
            );
        }

        Err(EngineError::SequenceContention {
            document_type,
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    fn first_row(
        &self,
        company_id: &str,
        branch_id: &str,
        document_type: DocumentType,
        plan: &AllocationPlan,
    ) -> DocumentSequence {
        let now = Utc::now();
        DocumentSequence {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            branch_id: branch_id.to_string(),
            document_type,
            prefix: self.numbering.prefix_for(document_type).to_string(),
            current_number: plan.stored_after,
            padding: i64::from(self.numbering.padding),
            fiscal_year: plan.stored_fiscal_year.to_string(),
            reset_policy: self.numbering.reset_policy,
            created_at: now,
            updated_at: now,
        }
    }
}
