//! # billbook-core: Pure Business Logic for the Document Engine
//!
//! Every rule of the transactional document engine that can be expressed
//! without touching storage lives here: tax splitting, fiscal years and
//! document numbering, the per-type document policy table, stock and
//! ledger arithmetic.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Billbook Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 billbook-engine (Composer)                      │   │
//! │  │   create_document, update_document, delete_document, stock ops  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ billbook-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐ ┌────────┐  │   │
//! │  │   │  money  │ │   tax   │ │  fiscal  │ │document │ │ledger  │  │   │
//! │  │   │  Money  │ │LineTax  │ │FiscalYear│ │ Policy  │ │replay  │  │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └─────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 billbook-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic, sub-cent accumulator
//! - [`tax`] - Intra/inter-state tax splitting and aggregate rounding
//! - [`fiscal`] - Fiscal years, sequence planning, document numbers
//! - [`document`] - Document types, statuses, policy table, rows
//! - [`inventory`] - Stock arithmetic and movement rows
//! - [`ledger`] - Ledger rows and running-balance replay
//! - [`types`] - Referenced master entities (company, branch, party, item)
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use billbook_core::tax::{compute_line, LineInput};
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
//!
//! let rounded = line.rounded()?;
//! assert_eq!(rounded.taxable.cents(), 90_000);
//! assert_eq!(rounded.cgst.cents(), 8_100);
//! assert_eq!(rounded.line_total.cents(), 106_200);
//! # Ok::<(), billbook_core::ValidationError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod document;
pub mod error;
pub mod fiscal;
pub mod inventory;
pub mod ledger;
pub mod money;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use document::{
    BalanceEffect, Document, DocumentDetail, DocumentLine, DocumentPolicy, DocumentStatus,
    DocumentType, PaymentAllocation, PaymentStatus, StockEffect,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use fiscal::{DocumentSequence, FiscalYear, ResetPolicy};
pub use inventory::{InventoryMovement, MovementType, StockAdjustMode, StockLevels};
pub use ledger::{EntrySide, LedgerEntry};
pub use money::{Money, PreciseAmount};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Zero-padding width of the numeric part of a document number.
///
/// `HQ-INV-0007/24` uses the default of 4 digits.
pub const DEFAULT_SEQUENCE_PADDING: u32 = 4;

/// Maximum quantity on a single document line.
///
/// ## Business Reason
/// Guards against keying errors (1000000 instead of 100); large enough for
/// wholesale purchase orders.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Maximum number of lines on one document.
pub const MAX_DOCUMENT_LINES: usize = 500;

/// Maximum unit rate in cents (10,000,000.00).
///
/// With [`MAX_LINE_QUANTITY`] and [`MAX_DOCUMENT_LINES`] the largest
/// document subtotal is 5e17 cents, so even a 100% tax on it stays inside
/// `i64`.
pub const MAX_RATE_CENTS: i64 = 1_000_000_000;

/// Basis points in 100%.
pub const BPS_PER_UNIT: i64 = 10_000;
