//! # Compensation Journal
//!
//! Every write the composer makes across tables is followed by an entry
//! describing how to undo it. When a later step fails the journal is
//! replayed newest-first.
//!
//! ```text
//! insert header ──► insert lines ──► stock ──► source status ──► ledger
//!      │                               │            │               │
//!      ▼                               ▼            ▼               ▼
//!  DeleteDocument                 Stock(rev)   Status(back)    Post(opposite)
//!
//!  failure at any step: undo entries run in reverse, each failure is
//!  logged, the original error is returned
//! ```

use tracing::{error, warn};

use billbook_core::{Document, DocumentLine, DocumentStatus, EntrySide, Money};
use billbook_db::{Database, StockChange};

use crate::balance::BalanceLedger;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryLedger;

/// How to undo one completed write.
#[derive(Debug, Clone)]
pub(crate) enum Undo {
    /// Removes a header; lines and allocations cascade.
    DeleteDocument { id: String },
    /// Applies this stock change.
    Stock(StockChange),
    Status {
        document_id: String,
        current: DocumentStatus,
        restore: DocumentStatus,
    },
    Payment { document_id: String, delta: Money },
    Advance { party_id: String, delta: Money },
    /// Posts this ledger entry.
    Post {
        party_id: String,
        amount: Money,
        side: EntrySide,
        reference_type: String,
        reference_id: String,
    },
    Lines {
        document_id: String,
        lines: Vec<DocumentLine>,
    },
    Header(Box<Document>),
}

/// The services compensation needs.
pub(crate) struct Compensator<'a> {
    pub db: &'a Database,
    pub inventory: &'a InventoryLedger,
    pub balances: &'a BalanceLedger,
}

#[derive(Debug)]
pub(crate) struct Journal {
    operation: &'static str,
    document_id: String,
    steps: Vec<Undo>,
}

impl Journal {
    pub fn new(operation: &'static str, document_id: &str) -> Self {
        Journal {
            operation,
            document_id: document_id.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, undo: Undo) {
        self.steps.push(undo);
    }

    /// Undoes every recorded write, newest first. Failures are logged and
    /// the remaining steps still run.
    pub async fn rollback(self, services: &Compensator<'_>, cause: &EngineError) {
        warn!(
            operation = self.operation,
            document_id = %self.document_id,
            steps = self.steps.len(),
            cause = %cause,
            "Compensating partial document operation"
        );

        let mut failed = 0usize;
        for step in self.steps.into_iter().rev() {
            if let Err(err) = undo(services, &step).await {
                failed += 1;
                error!(
                    operation = self.operation,
                    document_id = %self.document_id,
                    step = ?step,
                    error = %err,
                    "Compensation step failed"
                );
            }
        }

        if failed > 0 {
            error!(
                operation = self.operation,
                document_id = %self.document_id,
                failed,
                "Compensation incomplete; manual repair required"
            );
        }
    }
}

async fn undo(services: &Compensator<'_>, step: &Undo) -> EngineResult<()> {
    match step {
        Undo::DeleteDocument { id } => services.db.documents().delete(id).await?,
        Undo::Stock(change) => {
            services.inventory.apply(change).await?;
        }
        Undo::Status {
            document_id,
            current,
            restore,
        } => {
            let moved = services
                .db
                .documents()
                .set_status(document_id, *current, *restore)
                .await?;
            if !moved {
                return Err(EngineError::DocumentLocked {
                    id: document_id.clone(),
                    reason: format!("no longer {current}"),
                });
            }
        }
        Undo::Payment { document_id, delta } => {
            services.balances.apply_to_document(document_id, *delta).await?;
        }
        Undo::Advance { party_id, delta } => {
            services.balances.adjust_advance(party_id, *delta).await?;
        }
        Undo::Post {
            party_id,
            amount,
            side,
            reference_type,
            reference_id,
        } => {
            services
                .balances
                .post_entry(
                    party_id,
                    *amount,
                    *side,
                    reference_type,
                    reference_id,
                    Some("Compensation".to_string()),
                )
                .await?;
        }
        Undo::Lines { document_id, lines } => {
            services.db.documents().replace_lines(document_id, lines).await?
        }
        Undo::Header(document) => services.db.documents().update(document).await?,
    }
    Ok(())
}
