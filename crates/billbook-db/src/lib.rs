//! # billbook-db: Storage Layer for the Document Engine
//!
//! SQLite persistence through sqlx. Every primitive here is a single
//! atomic step (one statement, or one short transaction); composing them
//! into a document operation is the engine's job.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Billbook Data Flow                                │
//! │                                                                         │
//! │  billbook-engine (create_document)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   billbook-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ItemRepo      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SequenceRepo  │    │ 001_initial  │  │   │
//! │  │   │ WAL, FKs on   │    │ LedgerRepo    │    │ _schema.sql  │  │   │
//! │  │   │               │    │ DocumentRepo  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billbook_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("billbook.db")).await?;
//! let item = db.items().get("item-1", "co-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{
    BranchRepository, CompanyRepository, DocumentRepository, InventoryRepository,
    ItemRepository, LedgerPosting, LedgerRepository, PartyRepository, ReferenceNet,
    SequenceRepository, StockChange, StockOutcome,
};
