//! # Repository Module
//!
//! One repository per table family. Each holds a clone of the pool and
//! exposes the atomic storage primitives the engine composes.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Engine (composer)                                                      │
//! │       │                                                                 │
//! │       │  db.items().apply_stock(&StockChange::outbound(..))             │
//! │       ▼                                                                 │
//! │  ItemRepository          guarded UPDATE + movement INSERT, one tx       │
//! │  SequenceRepository      lazy INSERT + compare-and-swap                 │
//! │  LedgerRepository        INSERT … SELECT running balance, one tx        │
//! │  DocumentRepository      headers, lines, allocations, guarded payment   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CompanyRepository`], [`BranchRepository`] - Issuing entities
//! - [`PartyRepository`] - Customers and vendors
//! - [`ItemRepository`] - Items and atomic stock changes
//! - [`InventoryRepository`] - Movement history
//! - [`SequenceRepository`] - Document numbering rows
//! - [`DocumentRepository`] - Documents, lines, payment allocations
//! - [`LedgerRepository`] - Party ledger

pub mod company;
pub mod document;
pub mod inventory;
pub mod item;
pub mod ledger;
pub mod party;
pub mod sequence;

pub use company::{BranchRepository, CompanyRepository};
pub use document::DocumentRepository;
pub use inventory::InventoryRepository;
pub use item::{ItemRepository, StockChange, StockOutcome};
pub use ledger::{LedgerPosting, LedgerRepository, ReferenceNet};
pub use party::PartyRepository;
pub use sequence::SequenceRepository;

/// Rows shared by the repository tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, Utc};

    use crate::Database;
    use billbook_core::{
        Branch, Company, Document, DocumentLine, DocumentStatus, DocumentType, Item, Party,
        PartyKind, PaymentStatus,
    };

    pub async fn company(db: &Database, id: &str, tax_id: Option<&str>) -> Company {
        let company = Company {
            id: id.into(),
            name: format!("Company {id}"),
            tax_id: tax_id.map(Into::into),
            created_at: Utc::now(),
        };
        db.companies().insert(&company).await.unwrap();
        company
    }

    pub async fn branch(db: &Database, company_id: &str, id: &str, prefix: &str) -> Branch {
        let branch = Branch {
            id: id.into(),
            company_id: company_id.into(),
            name: format!("Branch {id}"),
            document_prefix: prefix.into(),
            created_at: Utc::now(),
        };
        db.branches().insert(&branch).await.unwrap();
        branch
    }

    pub async fn party(
        db: &Database,
        company_id: &str,
        id: &str,
        kind: PartyKind,
        tax_id: Option<&str>,
    ) -> Party {
        let now = Utc::now();
        let party = Party {
            id: id.into(),
            company_id: company_id.into(),
            kind,
            name: format!("Party {id}"),
            tax_id: tax_id.map(Into::into),
            billing_address: None,
            shipping_address: None,
            balance_cents: 0,
            advance_cents: 0,
            created_at: now,
            updated_at: now,
        };
        db.parties().insert(&party).await.unwrap();
        party
    }

    pub async fn item(
        db: &Database,
        company_id: &str,
        id: &str,
        current: i64,
        reserved: i64,
    ) -> Item {
        let now = Utc::now();
        let item = Item {
            id: id.into(),
            company_id: company_id.into(),
            code: id.to_uppercase(),
            name: format!("Item {id}"),
            tax_code: None,
            tax_rate_bps: 1_800,
            sale_rate_cents: 10_000,
            purchase_rate_cents: 8_000,
            rate_includes_tax: false,
            tracks_inventory: true,
            current_stock: current,
            reserved_stock: reserved,
            available_stock: (current - reserved).max(0),
            created_at: now,
            updated_at: now,
        };
        db.items().insert(&item).await.unwrap();
        item
    }

    /// Draft invoice for `cust-1` at `br-1`, tax-free so `subtotal == total`.
    pub fn invoice_header(id: &str, sequence_number: i64, total_cents: i64) -> Document {
        let now = Utc::now();
        Document {
            id: id.into(),
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            document_type: DocumentType::Invoice,
            document_number: format!("HQ-INV-{sequence_number:04}/24"),
            sequence_number,
            fiscal_year: "2024-2025".into(),
            document_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            party_id: "cust-1".into(),
            source_id: None,
            status: DocumentStatus::Draft,
            payment_status: PaymentStatus::Unpaid,
            is_interstate: false,
            subtotal_cents: total_cents,
            cgst_cents: 0,
            sgst_cents: 0,
            igst_cents: 0,
            tax_cents: 0,
            discount_bps: 0,
            discount_cents: 0,
            total_cents,
            paid_cents: 0,
            balance_cents: total_cents,
            applied_cents: 0,
            advance_cents: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line(
        document_id: &str,
        line_number: i64,
        item_id: &str,
        quantity: i64,
        taxable_cents: i64,
        tax_cents: i64,
    ) -> DocumentLine {
        DocumentLine {
            id: format!("{document_id}-{line_number}"),
            document_id: document_id.into(),
            line_number,
            item_id: item_id.into(),
            description: format!("Line {line_number}"),
            quantity,
            rate_cents: taxable_cents / quantity,
            discount_bps: 0,
            tax_rate_bps: 0,
            cgst_rate_bps: 0,
            sgst_rate_bps: 0,
            igst_rate_bps: 0,
            taxable_cents,
            cgst_cents: tax_cents / 2,
            sgst_cents: tax_cents - tax_cents / 2,
            igst_cents: 0,
            tax_cents,
            line_total_cents: taxable_cents + tax_cents,
            created_at: Utc::now(),
        }
    }
}
