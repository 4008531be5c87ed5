//! # Storage Errors
//!
//! `DbError` classifies what SQLite reports so the engine can tell a
//! missing row from a constraint that held.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sqlx::Error::RowNotFound ─────────────────────► NotFound              │
//! │  sqlx::Error::Database(msg)                                             │
//! │     "UNIQUE constraint failed: t.c, …" ────────► UniqueViolation       │
//! │     "FOREIGN KEY constraint failed" ───────────► ForeignKeyViolation   │
//! │     "CHECK constraint failed: …" ──────────────► CheckViolation        │
//! │     RAISE(ABORT, msg) from a trigger ──────────► Rejected              │
//! │     anything else ─────────────────────────────► QueryFailed           │
//! │  sqlx::Error::PoolTimedOut ────────────────────► PoolExhausted         │
//! │  sqlx::Error::PoolClosed ──────────────────────► ConnectionFailed      │
//! │                                                                         │
//! │  billbook-engine keeps NotFound, wraps the rest as Persistence          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A second sequence row, document number or item code.
    #[error("Duplicate value for {columns}")]
    UniqueViolation { columns: String },

    /// A line pointing at a missing item, or a source document that is
    /// still referenced.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A stored invariant refused the row (`total = subtotal + tax −
    /// discount`, `available_stock >= 0`, …).
    #[error("Check constraint failed: {0}")]
    CheckViolation(String),

    /// A trigger aborted the statement, e.g. an update to an append-only
    /// ledger table.
    #[error("Rejected by storage: {0}")]
    Rejected(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    #[inline]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// Maps a SQLite error message onto a variant.
    fn classify(message: &str) -> Self {
        const UNIQUE: &str = "UNIQUE constraint failed: ";
        const CHECK: &str = "CHECK constraint failed: ";

        if let Some(columns) = message.strip_prefix(UNIQUE) {
            DbError::UniqueViolation {
                columns: columns.to_string(),
            }
        } else if let Some(rule) = message.strip_prefix(CHECK) {
            DbError::CheckViolation(rule.to_string())
        } else if message.contains("FOREIGN KEY constraint failed") {
            DbError::ForeignKeyViolation(message.to_string())
        } else if message.contains("constraint failed") {
            DbError::QueryFailed(message.to_string())
        } else {
            // RAISE(ABORT, ...) surfaces its own text with no prefix
            DbError::Rejected(message.to_string())
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => DbError::classify(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            sqlx::Error::Io(io) => DbError::ConnectionFailed(io.to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
