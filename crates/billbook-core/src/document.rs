//! # Documents and the Per-Type Policy Table
//!
//! Every document type runs through the same composer; what differs is
//! captured here as data.
//!
//! ## Policy Table
//! ```text
//! ┌──────────────┬────────┬──────────┬──────────┬─────────┬────────────────────────────┐
//! │ type         │ prefix │ party    │ stock    │ ledger  │ statuses                   │
//! ├──────────────┼────────┼──────────┼──────────┼─────────┼────────────────────────────┤
//! │ quotation    │ QT-    │ customer │ -        │ -       │ draft → converted/expired  │
//! │ sales_order  │ SO-    │ customer │ reserve  │ -       │ pending → invoiced/cancel  │
//! │ invoice      │ INV-   │ customer │ out      │ debit   │ draft → confirmed          │
//! │ purchase_ord │ PO-    │ vendor   │ -        │ -       │ pending → received/cancel  │
//! │ bill         │ BILL-  │ vendor   │ in       │ credit  │ draft → confirmed          │
//! │ grn          │ GRN-   │ vendor   │ in       │ -       │ pending → verified         │
//! │ credit_note  │ CN-    │ customer │ in       │ credit  │ pending | approved (auto)  │
//! │ debit_note   │ DN-    │ vendor   │ out      │ debit   │ pending | approved (auto)  │
//! │ payment      │ PY-    │ either   │ -        │ settle  │ confirmed                  │
//! └──────────────┴────────┴──────────┴──────────┴─────────┴────────────────────────────┘
//! ```
//!
//! Invoices and bills additionally carry a payment status
//! (unpaid → partial → paid) derived from `paid` against `total`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::EntrySide;
use crate::money::Money;
use crate::types::PartyKind;

// =============================================================================
// Document Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DocumentType {
    Quotation,
    SalesOrder,
    Invoice,
    PurchaseOrder,
    Bill,
    Grn,
    CreditNote,
    DebitNote,
    Payment,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        DocumentType::Quotation,
        DocumentType::SalesOrder,
        DocumentType::Invoice,
        DocumentType::PurchaseOrder,
        DocumentType::Bill,
        DocumentType::Grn,
        DocumentType::CreditNote,
        DocumentType::DebitNote,
        DocumentType::Payment,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quotation => "quotation",
            DocumentType::SalesOrder => "sales_order",
            DocumentType::Invoice => "invoice",
            DocumentType::PurchaseOrder => "purchase_order",
            DocumentType::Bill => "bill",
            DocumentType::Grn => "grn",
            DocumentType::CreditNote => "credit_note",
            DocumentType::DebitNote => "debit_note",
            DocumentType::Payment => "payment",
        }
    }

    /// Behaviour of this type.
    pub fn policy(&self) -> &'static DocumentPolicy {
        match self {
            DocumentType::Quotation => &QUOTATION,
            DocumentType::SalesOrder => &SALES_ORDER,
            DocumentType::Invoice => &INVOICE,
            DocumentType::PurchaseOrder => &PURCHASE_ORDER,
            DocumentType::Bill => &BILL,
            DocumentType::Grn => &GRN,
            DocumentType::CreditNote => &CREDIT_NOTE,
            DocumentType::DebitNote => &DEBIT_NOTE,
            DocumentType::Payment => &PAYMENT,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "document_type".to_string(),
                allowed: DocumentType::ALL.iter().map(|t| t.to_string()).collect(),
            })
    }
}

// =============================================================================
// Document Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DocumentStatus {
    Draft,
    Pending,
    Confirmed,
    Converted,
    Expired,
    Invoiced,
    Cancelled,
    Received,
    Verified,
    Approved,
}

impl DocumentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Pending => "pending",
            DocumentStatus::Confirmed => "confirmed",
            DocumentStatus::Converted => "converted",
            DocumentStatus::Expired => "expired",
            DocumentStatus::Invoiced => "invoiced",
            DocumentStatus::Cancelled => "cancelled",
            DocumentStatus::Received => "received",
            DocumentStatus::Verified => "verified",
            DocumentStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    NotApplicable,
}

impl PaymentStatus {
    /// Derives the status by comparing what was paid against the total.
    ///
    /// ```rust
    /// use billbook_core::{Money, PaymentStatus};
    ///
    /// let total = Money::from_cents(10_000);
    /// assert_eq!(PaymentStatus::derive(total, Money::zero()), PaymentStatus::Unpaid);
    /// assert_eq!(PaymentStatus::derive(total, Money::from_cents(1)), PaymentStatus::Partial);
    /// assert_eq!(PaymentStatus::derive(total, total), PaymentStatus::Paid);
    /// ```
    pub fn derive(total: Money, paid: Money) -> Self {
        if paid >= total {
            PaymentStatus::Paid
        } else if paid.is_positive() {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::NotApplicable => "not_applicable",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Policy
// =============================================================================

/// What a document does to inventory when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    /// Decrements current stock (sale, purchase return).
    Outbound,
    /// Increments current stock (receipt, sales return).
    Inbound,
    /// Earmarks stock without moving it (sales order).
    Reserve,
}

/// What a document does to the party's running balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    /// The party owes more (invoice, purchase return).
    Debit,
    /// The party is owed more (bill, sales return).
    Credit,
    /// Settles the party's open documents; side depends on the party kind.
    Settlement,
}

/// Per-type behaviour consumed by the composer.
#[derive(Debug)]
pub struct DocumentPolicy {
    pub document_type: DocumentType,
    /// Default number prefix, including its trailing dash.
    pub prefix: &'static str,
    /// Required party kind; `None` accepts either.
    pub party_kind: Option<PartyKind>,
    pub stock: StockEffect,
    pub balance: BalanceEffect,
    pub initial_status: DocumentStatus,
    pub statuses: &'static [DocumentStatus],
    /// Transitions a caller may request through an update.
    pub transitions: &'static [(DocumentStatus, DocumentStatus)],
    /// Statuses only the engine sets (as a side effect of another document).
    pub system_statuses: &'static [DocumentStatus],
    /// Statuses in which the document can no longer be changed or deleted.
    pub locked_statuses: &'static [DocumentStatus],
    /// Types this document may be raised from.
    pub sources: &'static [DocumentType],
    /// Type of the document a return must reference.
    pub parent: Option<DocumentType>,
    pub has_lines: bool,
    pub tracks_payment: bool,
}

static QUOTATION: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::Quotation,
    prefix: "QT-",
    party_kind: Some(PartyKind::Customer),
    stock: StockEffect::None,
    balance: BalanceEffect::None,
    initial_status: DocumentStatus::Draft,
    statuses: &[
        DocumentStatus::Draft,
        DocumentStatus::Converted,
        DocumentStatus::Expired,
    ],
    transitions: &[(DocumentStatus::Draft, DocumentStatus::Expired)],
    system_statuses: &[DocumentStatus::Converted],
    locked_statuses: &[DocumentStatus::Converted],
    sources: &[],
    parent: None,
    has_lines: true,
    tracks_payment: false,
};

static SALES_ORDER: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::SalesOrder,
    prefix: "SO-",
    party_kind: Some(PartyKind::Customer),
    stock: StockEffect::Reserve,
    balance: BalanceEffect::None,
    initial_status: DocumentStatus::Pending,
    statuses: &[
        DocumentStatus::Pending,
        DocumentStatus::Invoiced,
        DocumentStatus::Cancelled,
    ],
    transitions: &[(DocumentStatus::Pending, DocumentStatus::Cancelled)],
    system_statuses: &[DocumentStatus::Invoiced],
    locked_statuses: &[DocumentStatus::Invoiced],
    sources: &[DocumentType::Quotation],
    parent: None,
    has_lines: true,
    tracks_payment: false,
};

static INVOICE: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::Invoice,
    prefix: "INV-",
    party_kind: Some(PartyKind::Customer),
    stock: StockEffect::Outbound,
    balance: BalanceEffect::Debit,
    initial_status: DocumentStatus::Draft,
    statuses: &[DocumentStatus::Draft, DocumentStatus::Confirmed],
    transitions: &[(DocumentStatus::Draft, DocumentStatus::Confirmed)],
    system_statuses: &[],
    locked_statuses: &[],
    sources: &[DocumentType::Quotation, DocumentType::SalesOrder],
    parent: None,
    has_lines: true,
    tracks_payment: true,
};

static PURCHASE_ORDER: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::PurchaseOrder,
    prefix: "PO-",
    party_kind: Some(PartyKind::Vendor),
    stock: StockEffect::None,
    balance: BalanceEffect::None,
    initial_status: DocumentStatus::Pending,
    statuses: &[
        DocumentStatus::Pending,
        DocumentStatus::Received,
        DocumentStatus::Cancelled,
    ],
    transitions: &[(DocumentStatus::Pending, DocumentStatus::Cancelled)],
    system_statuses: &[DocumentStatus::Received],
    locked_statuses: &[DocumentStatus::Received],
    sources: &[],
    parent: None,
    has_lines: true,
    tracks_payment: false,
};

static BILL: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::Bill,
    prefix: "BILL-",
    party_kind: Some(PartyKind::Vendor),
    stock: StockEffect::Inbound,
    balance: BalanceEffect::Credit,
    initial_status: DocumentStatus::Draft,
    statuses: &[DocumentStatus::Draft, DocumentStatus::Confirmed],
    transitions: &[(DocumentStatus::Draft, DocumentStatus::Confirmed)],
    system_statuses: &[],
    locked_statuses: &[],
    sources: &[DocumentType::PurchaseOrder, DocumentType::Grn],
    parent: None,
    has_lines: true,
    tracks_payment: true,
};

static GRN: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::Grn,
    prefix: "GRN-",
    party_kind: Some(PartyKind::Vendor),
    stock: StockEffect::Inbound,
    balance: BalanceEffect::None,
    initial_status: DocumentStatus::Pending,
    statuses: &[DocumentStatus::Pending, DocumentStatus::Verified],
    transitions: &[(DocumentStatus::Pending, DocumentStatus::Verified)],
    system_statuses: &[],
    locked_statuses: &[DocumentStatus::Verified],
    sources: &[DocumentType::PurchaseOrder],
    parent: None,
    has_lines: true,
    tracks_payment: false,
};

static CREDIT_NOTE: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::CreditNote,
    prefix: "CN-",
    party_kind: Some(PartyKind::Customer),
    stock: StockEffect::Inbound,
    balance: BalanceEffect::Credit,
    initial_status: DocumentStatus::Pending,
    statuses: &[DocumentStatus::Pending, DocumentStatus::Approved],
    transitions: &[],
    system_statuses: &[DocumentStatus::Pending, DocumentStatus::Approved],
    locked_statuses: &[],
    sources: &[],
    parent: Some(DocumentType::Invoice),
    has_lines: true,
    tracks_payment: false,
};

static DEBIT_NOTE: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::DebitNote,
    prefix: "DN-",
    party_kind: Some(PartyKind::Vendor),
    stock: StockEffect::Outbound,
    balance: BalanceEffect::Debit,
    initial_status: DocumentStatus::Pending,
    statuses: &[DocumentStatus::Pending, DocumentStatus::Approved],
    transitions: &[],
    system_statuses: &[DocumentStatus::Pending, DocumentStatus::Approved],
    locked_statuses: &[],
    sources: &[],
    parent: Some(DocumentType::Bill),
    has_lines: true,
    tracks_payment: false,
};

static PAYMENT: DocumentPolicy = DocumentPolicy {
    document_type: DocumentType::Payment,
    prefix: "PY-",
    party_kind: None,
    stock: StockEffect::None,
    balance: BalanceEffect::Settlement,
    initial_status: DocumentStatus::Confirmed,
    statuses: &[DocumentStatus::Confirmed],
    transitions: &[],
    system_statuses: &[],
    locked_statuses: &[],
    sources: &[],
    parent: None,
    has_lines: false,
    tracks_payment: false,
};

impl DocumentPolicy {
    /// Whether this type is a return against a parent document.
    #[inline]
    pub fn is_return(&self) -> bool {
        self.parent.is_some()
    }

    /// Ledger side posted for a party of `kind`, if the type touches the ledger.
    ///
    /// A payment received from a customer reduces what they owe (credit); a
    /// payment made to a vendor reduces what the company owes (debit).
    pub fn entry_side(&self, kind: PartyKind) -> Option<EntrySide> {
        match self.balance {
            BalanceEffect::None => None,
            BalanceEffect::Debit => Some(EntrySide::Debit),
            BalanceEffect::Credit => Some(EntrySide::Credit),
            BalanceEffect::Settlement => Some(match kind {
                PartyKind::Customer => EntrySide::Credit,
                PartyKind::Vendor => EntrySide::Debit,
            }),
        }
    }

    /// Type of the documents a payment from/to a party of `kind` settles.
    pub fn settles(kind: PartyKind) -> DocumentType {
        match kind {
            PartyKind::Customer => DocumentType::Invoice,
            PartyKind::Vendor => DocumentType::Bill,
        }
    }

    /// Checks a caller-requested status change.
    ///
    /// Setting the current status again is a no-op and always allowed.
    pub fn check_transition(&self, from: DocumentStatus, to: DocumentStatus) -> CoreResult<()> {
        let allowed = from == to
            || (!self.system_statuses.contains(&to) && self.transitions.contains(&(from, to)));
        if allowed {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                document_type: self.document_type,
                from,
                to,
            })
        }
    }

    /// Whether a document of this type may be raised from `source`.
    ///
    /// Quotations, orders and purchase orders are consumed once: they must
    /// still be in their initial status. A GRN can back a bill in any status;
    /// the engine allows one live bill per GRN.
    pub fn accepts_source(&self, source_type: DocumentType, source_status: DocumentStatus) -> bool {
        if !self.sources.contains(&source_type) {
            return false;
        }
        source_type == DocumentType::Grn
            || source_status == source_type.policy().initial_status
    }

    /// Status the source moves to once a document of this type consumes it.
    pub fn consumed_source_status(&self, source_type: DocumentType) -> Option<DocumentStatus> {
        match (self.document_type, source_type) {
            (_, DocumentType::Quotation) => Some(DocumentStatus::Converted),
            (DocumentType::Invoice, DocumentType::SalesOrder) => Some(DocumentStatus::Invoiced),
            (_, DocumentType::PurchaseOrder) => Some(DocumentStatus::Received),
            _ => None,
        }
    }

    /// Status of a new return, chosen from the parent's payment state.
    pub fn return_status(parent_payment: PaymentStatus) -> DocumentStatus {
        if parent_payment == PaymentStatus::Paid {
            DocumentStatus::Approved
        } else {
            DocumentStatus::Pending
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

/// Document header.
///
/// ## Invariants
/// - `total = subtotal + tax − discount`
/// - `balance = total − paid`
/// - `tax = cgst + sgst + igst`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Document {
    pub id: String,
    pub company_id: String,
    pub branch_id: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub sequence_number: i64,
    pub fiscal_year: String,
    #[ts(as = "String")]
    pub document_date: NaiveDate,
    pub party_id: String,
    /// Quotation/order/GRN this document was raised from, or the parent of a return.
    pub source_id: Option<String>,
    pub status: DocumentStatus,
    pub payment_status: PaymentStatus,
    pub is_interstate: bool,
    pub subtotal_cents: i64,
    pub cgst_cents: i64,
    pub sgst_cents: i64,
    pub igst_cents: i64,
    pub tax_cents: i64,
    pub discount_bps: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub balance_cents: i64,
    /// Returns: amount applied against the parent's open balance.
    /// Payments: amount allocated to documents.
    pub applied_cents: i64,
    /// Amount credited to the party's advance.
    pub advance_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    #[inline]
    pub fn policy(&self) -> &'static DocumentPolicy {
        self.document_type.policy()
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    /// Why the document can no longer be changed or deleted, if it can't.
    pub fn lock_reason(&self) -> Option<String> {
        let policy = self.policy();
        if self.document_type == DocumentType::Bill
            && self.status == DocumentStatus::Confirmed
            && self.payment_status == PaymentStatus::Paid
        {
            return Some("bill is confirmed and fully paid".to_string());
        }
        if policy.locked_statuses.contains(&self.status) {
            return Some(format!("{} is {}", self.document_type, self.status));
        }
        if policy.tracks_payment && self.paid_cents > 0 {
            return Some(format!("{} has {} applied", self.document_type, self.paid()));
        }
        None
    }

    /// Fails with [`CoreError::DocumentLocked`] when [`Self::lock_reason`] is set.
    pub fn ensure_unlocked(&self) -> CoreResult<()> {
        match self.lock_reason() {
            Some(reason) => Err(CoreError::DocumentLocked {
                id: self.id.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// A document line with its stored tax split.
///
/// `line_total = taxable + tax`; amounts are the per-line rounded view,
/// header totals are rounded from exact values.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DocumentLine {
    pub id: String,
    pub document_id: String,
    pub line_number: i64,
    pub item_id: String,
    pub description: String,
    pub quantity: i64,
    pub rate_cents: i64,
    pub discount_bps: i64,
    pub tax_rate_bps: i64,
    pub cgst_rate_bps: i64,
    pub sgst_rate_bps: i64,
    pub igst_rate_bps: i64,
    pub taxable_cents: i64,
    pub cgst_cents: i64,
    pub sgst_cents: i64,
    pub igst_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Part of a payment applied to one invoice or bill.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentAllocation {
    pub id: String,
    pub payment_id: String,
    pub document_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A header with everything it owns, as returned by the composer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentDetail {
    pub document: Document,
    pub lines: Vec<DocumentLine>,
    pub allocations: Vec<PaymentAllocation>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn document(document_type: DocumentType, status: DocumentStatus, paid: i64) -> Document {
        let now = Utc::now();
        let total = 10_000;
        Document {
            id: "doc-1".into(),
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            document_type,
            document_number: "HQ-X-0001/24".into(),
            sequence_number: 1,
            fiscal_year: "2024-2025".into(),
            document_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            party_id: "party-1".into(),
            source_id: None,
            status,
            payment_status: if document_type.policy().tracks_payment {
                PaymentStatus::derive(Money::from_cents(total), Money::from_cents(paid))
            } else {
                PaymentStatus::NotApplicable
            },
            is_interstate: false,
            subtotal_cents: total,
            cgst_cents: 0,
            sgst_cents: 0,
            igst_cents: 0,
            tax_cents: 0,
            discount_bps: 0,
            discount_cents: 0,
            total_cents: total,
            paid_cents: paid,
            balance_cents: total - paid,
            applied_cents: 0,
            advance_cents: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_type_round_trips_through_str() {
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), t);
            assert_eq!(t.policy().document_type, t);
        }
        assert!("receipt".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_policy_initial_status_is_allowed() {
        for t in DocumentType::ALL {
            let policy = t.policy();
            assert!(policy.statuses.contains(&policy.initial_status), "{t}");
            for (from, to) in policy.transitions {
                assert!(policy.statuses.contains(from) && policy.statuses.contains(to));
            }
        }
    }

    #[test]
    fn test_default_prefixes() {
        assert_eq!(DocumentType::Invoice.policy().prefix, "INV-");
        assert_eq!(DocumentType::Quotation.policy().prefix, "QT-");
        assert_eq!(DocumentType::SalesOrder.policy().prefix, "SO-");
        assert_eq!(DocumentType::PurchaseOrder.policy().prefix, "PO-");
        assert_eq!(DocumentType::DebitNote.policy().prefix, "DN-");
        assert_eq!(DocumentType::CreditNote.policy().prefix, "CN-");
        assert_eq!(DocumentType::Payment.policy().prefix, "PY-");
    }

    #[test]
    fn test_transitions() {
        let so = DocumentType::SalesOrder.policy();
        assert!(so.check_transition(DocumentStatus::Pending, DocumentStatus::Cancelled).is_ok());
        assert!(so.check_transition(DocumentStatus::Pending, DocumentStatus::Pending).is_ok());
        assert!(so.check_transition(DocumentStatus::Cancelled, DocumentStatus::Pending).is_err());
        // system-only
        assert!(so.check_transition(DocumentStatus::Pending, DocumentStatus::Invoiced).is_err());

        let invoice = DocumentType::Invoice.policy();
        assert!(invoice.check_transition(DocumentStatus::Draft, DocumentStatus::Confirmed).is_ok());
        assert!(invoice.check_transition(DocumentStatus::Confirmed, DocumentStatus::Draft).is_err());

        let note = DocumentType::CreditNote.policy();
        assert!(note.check_transition(DocumentStatus::Pending, DocumentStatus::Approved).is_err());
    }

    #[test]
    fn test_entry_sides() {
        let c = PartyKind::Customer;
        let v = PartyKind::Vendor;
        assert_eq!(DocumentType::Invoice.policy().entry_side(c), Some(EntrySide::Debit));
        assert_eq!(DocumentType::Bill.policy().entry_side(v), Some(EntrySide::Credit));
        assert_eq!(DocumentType::CreditNote.policy().entry_side(c), Some(EntrySide::Credit));
        assert_eq!(DocumentType::DebitNote.policy().entry_side(v), Some(EntrySide::Debit));
        assert_eq!(DocumentType::Payment.policy().entry_side(c), Some(EntrySide::Credit));
        assert_eq!(DocumentType::Payment.policy().entry_side(v), Some(EntrySide::Debit));
        assert_eq!(DocumentType::Quotation.policy().entry_side(c), None);
    }

    #[test]
    fn test_sources() {
        let invoice = DocumentType::Invoice.policy();
        assert!(invoice.accepts_source(DocumentType::SalesOrder, DocumentStatus::Pending));
        assert!(!invoice.accepts_source(DocumentType::SalesOrder, DocumentStatus::Cancelled));
        assert!(invoice.accepts_source(DocumentType::Quotation, DocumentStatus::Draft));
        assert!(!invoice.accepts_source(DocumentType::Quotation, DocumentStatus::Expired));
        assert!(!invoice.accepts_source(DocumentType::PurchaseOrder, DocumentStatus::Pending));

        let bill = DocumentType::Bill.policy();
        assert!(bill.accepts_source(DocumentType::Grn, DocumentStatus::Verified));
        assert_eq!(bill.consumed_source_status(DocumentType::Grn), None);
        assert_eq!(
            bill.consumed_source_status(DocumentType::PurchaseOrder),
            Some(DocumentStatus::Received)
        );
        assert_eq!(
            invoice.consumed_source_status(DocumentType::SalesOrder),
            Some(DocumentStatus::Invoiced)
        );
    }

    #[test]
    fn test_return_status_follows_parent_payment() {
        assert_eq!(DocumentPolicy::return_status(PaymentStatus::Paid), DocumentStatus::Approved);
        assert_eq!(DocumentPolicy::return_status(PaymentStatus::Partial), DocumentStatus::Pending);
        assert_eq!(DocumentPolicy::return_status(PaymentStatus::Unpaid), DocumentStatus::Pending);
    }

    #[test]
    fn test_locked_documents() {
        let paid_bill = document(DocumentType::Bill, DocumentStatus::Confirmed, 10_000);
        assert!(matches!(
            paid_bill.ensure_unlocked(),
            Err(CoreError::DocumentLocked { .. })
        ));

        let verified = document(DocumentType::Grn, DocumentStatus::Verified, 0);
        assert!(verified.lock_reason().is_some());

        let partly_paid = document(DocumentType::Invoice, DocumentStatus::Draft, 1);
        assert!(partly_paid.lock_reason().is_some());

        let fresh = document(DocumentType::Invoice, DocumentStatus::Confirmed, 0);
        assert!(fresh.ensure_unlocked().is_ok());

        let pending_grn = document(DocumentType::Grn, DocumentStatus::Pending, 0);
        assert!(pending_grn.ensure_unlocked().is_ok());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::NotApplicable).unwrap();
        assert_eq!(json, "\"not_applicable\"");
        assert_eq!(DocumentType::PurchaseOrder.to_string(), "purchase_order");
    }
}
