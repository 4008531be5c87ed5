//! Embedded schema migrations.
//!
//! The SQL under `migrations/sqlite/` is compiled into the binary, so a
//! fresh database file is usable without shipping any SQL next to it.
//! Applied versions are tracked by sqlx in `_sqlx_migrations`.
//!
//! Migrations are append-only: a change to the schema is a new
//! `NNN_description.sql`, never an edit to one that has shipped.

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every embedded migration not yet recorded.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (embedded, applied) = migration_status(pool).await?;
    if embedded == applied {
        debug!(applied, "Schema up to date");
        return Ok(());
    }

    MIGRATOR.run(pool).await?;
    info!(from = applied, to = embedded, "Schema migrated");
    Ok(())
}

/// `(embedded, applied)` migration counts.
///
/// A database that has never been migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let tracked: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master \
         WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    let applied: i64 = if tracked {
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    } else {
        0
    };

    Ok((MIGRATOR.migrations.len(), usize::try_from(applied).unwrap_or_default()))
}
