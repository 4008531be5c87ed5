//! # Rule Violations
//!
//! `CoreError` is what the pure rules in this crate can refuse.
//! `ValidationError` is the narrower case of malformed input; it converts
//! into `CoreError` with `?`. The engine maps both onto its own
//! `EngineError`, next to storage failures from `billbook-db`.

use thiserror::Error;

use crate::document::{DocumentStatus, DocumentType};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// `requested` exceeds `current_stock - reserved_stock`.
    #[error("Insufficient stock for {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    #[error("{document_type} cannot move from {from} to {to}")]
    InvalidTransition {
        document_type: DocumentType,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Finalized, paid, consumed or still referenced.
    #[error("Document {id} is locked: {reason}")]
    DocumentLocked { id: String, reason: String },

    /// The sequence already numbers a later fiscal year.
    #[error("Fiscal year {requested} is closed for numbering (sequence is in {current})")]
    ClosedFiscalYear { requested: String, current: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Malformed input, caught before any storage call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Fiscal-year labels, prefixes.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Unknown enum label, e.g. a reset policy read from config.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two references that must agree do not: an allocation against
    /// another party's invoice, a credit note pointing at a bill.
    #[error("{field} is inconsistent: {reason}")]
    Mismatch { field: String, reason: String },

    #[error("{field} exceeds the representable amount")]
    Overflow { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn overflow(field: impl Into<String>) -> Self {
        ValidationError::Overflow {
            field: field.into(),
        }
    }

    pub fn mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Mismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
