//! # Document Sequence Repository
//!
//! Storage primitives for the sequence allocator: lazy creation of the
//! row and a compare-and-swap update.
//!
//! ## Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE document_sequences                                              │
//! │     SET current_number = :new, fiscal_year = :new_fy                    │
//! │   WHERE id = :id                                                        │
//! │     AND current_number = :seen            ◄── value read by the caller  │
//! │     AND fiscal_year    = :seen_fy                                       │
//! │                                                                         │
//! │  rows_affected = 1 → the caller owns the number it planned              │
//! │  rows_affected = 0 → somebody else advanced the row first               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use billbook_core::{DocumentSequence, DocumentType, FiscalYear};

const SEQUENCE_COLUMNS: &str = r#"
    id, company_id, branch_id, document_type, prefix, current_number, padding,
    fiscal_year, reset_policy, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    pub async fn get(
        &self,
        company_id: &str,
        branch_id: &str,
        document_type: DocumentType,
    ) -> DbResult<Option<DocumentSequence>> {
        let sql = format!(
            "SELECT {SEQUENCE_COLUMNS} FROM document_sequences \
             WHERE company_id = ?1 AND branch_id = ?2 AND document_type = ?3"
        );
        let row = sqlx::query_as::<_, DocumentSequence>(&sql)
            .bind(company_id)
            .bind(branch_id)
            .bind(document_type)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Inserts the first row for a (company, branch, type).
    ///
    /// Returns `false` when another caller created it first.
    pub async fn try_insert(&self, sequence: &DocumentSequence) -> DbResult<bool> {
        debug!(
            branch_id = %sequence.branch_id,
            document_type = %sequence.document_type,
            "Creating document sequence"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO document_sequences (
                id, company_id, branch_id, document_type, prefix, current_number,
                padding, fiscal_year, reset_policy, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (company_id, branch_id, document_type) DO NOTHING
            "#,
        )
        .bind(&sequence.id)
        .bind(&sequence.company_id)
        .bind(&sequence.branch_id)
        .bind(sequence.document_type)
        .bind(&sequence.prefix)
        .bind(sequence.current_number)
        .bind(sequence.padding)
        .bind(&sequence.fiscal_year)
        .bind(sequence.reset_policy)
        .bind(sequence.created_at)
        .bind(sequence.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Advances the row only if it still holds the values the caller read.
    pub async fn compare_and_swap(
        &self,
        id: &str,
        expected_number: i64,
        expected_fiscal_year: &str,
        new_number: i64,
        new_fiscal_year: FiscalYear,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE document_sequences
            SET current_number = ?4, fiscal_year = ?5, updated_at = ?6
            WHERE id = ?1 AND current_number = ?2 AND fiscal_year = ?3
            "#,
        )
        .bind(id)
        .bind(expected_number)
        .bind(expected_fiscal_year)
        .bind(new_number)
        .bind(new_fiscal_year.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let swapped = result.rows_affected() == 1;
        debug!(id = %id, expected_number, new_number, swapped, "Sequence compare-and-swap");
        Ok(swapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::{Database, DbConfig};
    use billbook_core::ResetPolicy;

    fn row(id: &str, current_number: i64) -> DocumentSequence {
        let now = Utc::now();
        DocumentSequence {
            id: id.into(),
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            document_type: DocumentType::Invoice,
            prefix: "INV-".into(),
            current_number,
            padding: 4,
            fiscal_year: "2024-2025".into(),
            reset_policy: ResetPolicy::Yearly,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_is_first_writer_wins() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        fixtures::company(&db, "co-1", None).await;
        fixtures::branch(&db, "co-1", "br-1", "HQ").await;
        let repo = db.sequences();

        assert!(repo.try_insert(&row("seq-a", 2)).await.unwrap());
        assert!(!repo.try_insert(&row("seq-b", 2)).await.unwrap());

        let stored = repo.get("co-1", "br-1", DocumentType::Invoice).await.unwrap().unwrap();
        assert_eq!(stored.id, "seq-a");
        assert!(repo.get("co-1", "br-1", DocumentType::Bill).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_values() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        fixtures::company(&db, "co-1", None).await;
        fixtures::branch(&db, "co-1", "br-1", "HQ").await;
        let repo = db.sequences();
        repo.try_insert(&row("seq-a", 4)).await.unwrap();

        let fy = FiscalYear::starting(2024);
        assert!(repo.compare_and_swap("seq-a", 4, "2024-2025", 5, fy).await.unwrap());
        // second writer saw 4 as well
        assert!(!repo.compare_and_swap("seq-a", 4, "2024-2025", 5, fy).await.unwrap());
        // stale fiscal year
        assert!(!repo.compare_and_swap("seq-a", 5, "2023-2024", 6, fy).await.unwrap());

        let next = FiscalYear::starting(2025);
        assert!(repo.compare_and_swap("seq-a", 5, "2024-2025", 2, next).await.unwrap());
        let stored = repo.get("co-1", "br-1", DocumentType::Invoice).await.unwrap().unwrap();
        assert_eq!(stored.current_number, 2);
        assert_eq!(stored.fiscal_year, "2025-2026");
    }
}
