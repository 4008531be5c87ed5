//! # Engine Error Type
//!
//! The typed error returned by every exposed engine operation.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► EngineError ──► code()            │
//! │  sqlx::Error ──► DbError ────────┘        │                             │
//! │                                           ▼                             │
//! │                              "SEQUENCE_CONTENTION", "NOT_FOUND", …      │
//! │                                                                         │
//! │  Retry guidance                                                         │
//! │  ──────────────                                                         │
//! │  SEQUENCE_CONTENTION  → caller may retry the whole operation            │
//! │  everything else      → surfaced as-is, nothing is retried internally   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use billbook_core::{CoreError, DocumentStatus, DocumentType, ValidationError};
use billbook_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or inconsistent input; nothing was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced branch, party, item or document does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Another writer advanced the sequence twice in a row.
    #[error("Sequence contention for {document_type} after {attempts} attempts")]
    SequenceContention {
        document_type: DocumentType,
        attempts: u32,
    },

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

    #[error("Document {id} is locked: {reason}")]
    DocumentLocked { id: String, reason: String },

    #[error("Fiscal year {requested} is closed for numbering (sequence is in {current})")]
    ClosedFiscalYear { requested: String, current: String },

    /// Storage failure; any rows already written by the operation were
    /// compensated before this was returned.
    #[error("Persistence failure: {0}")]
    Persistence(DbError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::SequenceContention { .. } => "SEQUENCE_CONTENTION",
            EngineError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::DocumentLocked { .. } => "DOCUMENT_LOCKED",
            EngineError::ClosedFiscalYear { .. } => "CLOSED_FISCAL_YEAR",
            EngineError::Persistence(_) => "PERSISTENCE_FAILURE",
            EngineError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SequenceContention { .. })
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                item_id,
                available,
                requested,
            } => EngineError::InsufficientStock {
                item_id,
                available,
                requested,
            },
            CoreError::InvalidTransition {
                document_type,
                from,
                to,
            } => EngineError::InvalidTransition {
                document_type,
                from,
                to,
            },
            CoreError::DocumentLocked { id, reason } => EngineError::DocumentLocked { id, reason },
            CoreError::ClosedFiscalYear { requested, current } => {
                EngineError::ClosedFiscalYear { requested, current }
            }
            CoreError::Validation(err) => EngineError::Validation(err),
        }
    }
}

/// `NotFound` keeps its identity; everything else is a persistence failure.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Persistence(other),
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
