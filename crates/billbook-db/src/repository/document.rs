//! # Document Repository
//!
//! Headers, lines and payment allocations.
//!
//! Headers and lines are written by separate calls so the composer can
//! compensate between them; a multi-row write (all lines of a document,
//! all allocations of a payment) is one transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use billbook_core::{Document, DocumentLine, DocumentStatus, DocumentType, PaymentAllocation};

const DOCUMENT_COLUMNS: &str = r#"
    id, company_id, branch_id, document_type, document_number, sequence_number,
    fiscal_year, document_date, party_id, source_id, status, payment_status,
    is_interstate, subtotal_cents, cgst_cents, sgst_cents, igst_cents, tax_cents,
    discount_bps, discount_cents, total_cents, paid_cents, balance_cents,
    applied_cents, advance_cents, notes, created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, document_id, line_number, item_id, description, quantity, rate_cents,
    discount_bps, tax_rate_bps, cgst_rate_bps, sgst_rate_bps, igst_rate_bps,
    taxable_cents, cgst_cents, sgst_cents, igst_cents, tax_cents, line_total_cents,
    created_at
"#;

#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    // =========================================================================
    // Headers
    // =========================================================================

    pub async fn get(&self, id: &str) -> DbResult<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(document)
    }

    /// Documents raised from (or returned against) `source_id`.
    pub async fn find_by_source(&self, source_id: &str) -> DbResult<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE source_id = ?1 ORDER BY created_at"
        );
        let documents = sqlx::query_as::<_, Document>(&sql)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(documents)
    }

    pub async fn count(&self, company_id: &str, document_type: DocumentType) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE company_id = ?1 AND document_type = ?2",
        )
        .bind(company_id)
        .bind(document_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn insert(&self, document: &Document) -> DbResult<()> {
        debug!(
            id = %document.id,
            number = %document.document_number,
            "Inserting document header"
        );

        sqlx::query(
            r#"
            INSERT INTO documents (
                id, company_id, branch_id, document_type, document_number, sequence_number,
                fiscal_year, document_date, party_id, source_id, status, payment_status,
                is_interstate, subtotal_cents, cgst_cents, sgst_cents, igst_cents, tax_cents,
                discount_bps, discount_cents, total_cents, paid_cents, balance_cents,
                applied_cents, advance_cents, notes, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28
            )
            "#,
        )
        .bind(&document.id)
        .bind(&document.company_id)
        .bind(&document.branch_id)
        .bind(document.document_type)
        .bind(&document.document_number)
        .bind(document.sequence_number)
        .bind(&document.fiscal_year)
        .bind(document.document_date)
        .bind(&document.party_id)
        .bind(&document.source_id)
        .bind(document.status)
        .bind(document.payment_status)
        .bind(document.is_interstate)
        .bind(document.subtotal_cents)
        .bind(document.cgst_cents)
        .bind(document.sgst_cents)
        .bind(document.igst_cents)
        .bind(document.tax_cents)
        .bind(document.discount_bps)
        .bind(document.discount_cents)
        .bind(document.total_cents)
        .bind(document.paid_cents)
        .bind(document.balance_cents)
        .bind(document.applied_cents)
        .bind(document.advance_cents)
        .bind(&document.notes)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites the mutable header fields (status, totals, payment state).
    pub async fn update(&self, document: &Document) -> DbResult<()> {
        debug!(id = %document.id, "Updating document header");

        let result = sqlx::query(
            r#"
            UPDATE documents SET
                status = ?2,
                payment_status = ?3,
                is_interstate = ?4,
                subtotal_cents = ?5,
                cgst_cents = ?6,
                sgst_cents = ?7,
                igst_cents = ?8,
                tax_cents = ?9,
                discount_bps = ?10,
                discount_cents = ?11,
                total_cents = ?12,
                paid_cents = ?13,
                balance_cents = ?14,
                applied_cents = ?15,
                advance_cents = ?16,
                notes = ?17,
                updated_at = ?18
            WHERE id = ?1
            "#,
        )
        .bind(&document.id)
        .bind(document.status)
        .bind(document.payment_status)
        .bind(document.is_interstate)
        .bind(document.subtotal_cents)
        .bind(document.cgst_cents)
        .bind(document.sgst_cents)
        .bind(document.igst_cents)
        .bind(document.tax_cents)
        .bind(document.discount_bps)
        .bind(document.discount_cents)
        .bind(document.total_cents)
        .bind(document.paid_cents)
        .bind(document.balance_cents)
        .bind(document.applied_cents)
        .bind(document.advance_cents)
        .bind(&document.notes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document", &document.id));
        }

        Ok(())
    }

    /// Moves a document from `expected` to `status`.
    ///
    /// Returns `false` if the document is no longer in `expected`.
    pub async fn set_status(
        &self,
        id: &str,
        expected: DocumentStatus,
        status: DocumentStatus,
    ) -> DbResult<bool> {
        debug!(id = %id, from = %expected, to = %status, "Changing document status");

        let result = sqlx::query(
            "UPDATE documents SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(expected)
        .bind(status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adds `delta` to `paid_cents` unless that would take it outside
    /// `0..=total`; balance and payment status follow in the same statement.
    ///
    /// Returns the updated header, or `None` when the guard rejected it.
    pub async fn apply_payment(&self, id: &str, delta: i64) -> DbResult<Option<Document>> {
        debug!(id = %id, delta = delta, "Applying payment to document");

        let sql = format!(
            r#"
            UPDATE documents SET
                paid_cents = paid_cents + ?2,
                balance_cents = total_cents - (paid_cents + ?2),
                payment_status = CASE
                    WHEN payment_status = 'not_applicable' THEN payment_status
                    WHEN paid_cents + ?2 >= total_cents THEN 'paid'
                    WHEN paid_cents + ?2 > 0 THEN 'partial'
                    ELSE 'unpaid'
                END,
                updated_at = ?3
            WHERE id = ?1
              AND paid_cents + ?2 >= 0
              AND paid_cents + ?2 <= total_cents
            RETURNING {DOCUMENT_COLUMNS}
            "#
        );
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .bind(delta)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(document)
    }

    /// Deletes a header; its lines and allocations cascade.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting document");

        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document", id));
        }

        Ok(())
    }

    // =========================================================================
    // Lines
    // =========================================================================

    pub async fn lines(&self, document_id: &str) -> DbResult<Vec<DocumentLine>> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM document_lines WHERE document_id = ?1 ORDER BY line_number"
        );
        let lines = sqlx::query_as::<_, DocumentLine>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    /// Inserts all lines of a document, or none of them.
    pub async fn insert_lines(&self, lines: &[DocumentLine]) -> DbResult<()> {
        debug!(count = lines.len(), "Inserting document lines");

        let mut tx = self.pool.begin().await?;
        for line in lines {
            insert_line(&mut tx, line).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Swaps a document's lines for a new set atomically.
    pub async fn replace_lines(&self, document_id: &str, lines: &[DocumentLine]) -> DbResult<()> {
        debug!(document_id = %document_id, count = lines.len(), "Replacing document lines");

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_lines WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        for line in lines {
            insert_line(&mut tx, line).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    // =========================================================================
    // Payment Allocations
    // =========================================================================

    pub async fn allocations(&self, payment_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT id, payment_id, document_id, amount_cents, created_at
            FROM payment_allocations
            WHERE payment_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    pub async fn insert_allocations(&self, allocations: &[PaymentAllocation]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for allocation in allocations {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (id, payment_id, document_id, amount_cents, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&allocation.id)
            .bind(&allocation.payment_id)
            .bind(&allocation.document_id)
            .bind(allocation.amount_cents)
            .bind(allocation.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

async fn insert_line(conn: &mut SqliteConnection, line: &DocumentLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO document_lines (
            id, document_id, line_number, item_id, description, quantity, rate_cents,
            discount_bps, tax_rate_bps, cgst_rate_bps, sgst_rate_bps, igst_rate_bps,
            taxable_cents, cgst_cents, sgst_cents, igst_cents, tax_cents, line_total_cents,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
    )
    .bind(&line.id)
    .bind(&line.document_id)
    .bind(line.line_number)
    .bind(&line.item_id)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(line.rate_cents)
    .bind(line.discount_bps)
    .bind(line.tax_rate_bps)
    .bind(line.cgst_rate_bps)
    .bind(line.sgst_rate_bps)
    .bind(line.igst_rate_bps)
    .bind(line.taxable_cents)
    .bind(line.cgst_cents)
    .bind(line.sgst_cents)
    .bind(line.igst_cents)
    .bind(line.tax_cents)
    .bind(line.line_total_cents)
    .bind(line.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::{Database, DbConfig};
    use billbook_core::{PartyKind, PaymentStatus};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        fixtures::company(&db, "co-1", None).await;
        fixtures::branch(&db, "co-1", "br-1", "HQ").await;
        fixtures::party(&db, "co-1", "cust-1", PartyKind::Customer, None).await;
        fixtures::item(&db, "co-1", "item-1", 100, 0).await;
        db
    }

    #[tokio::test]
    async fn test_header_and_lines_round_trip() {
        let db = setup().await;
        let repo = db.documents();
        let header = fixtures::invoice_header("doc-1", 1, 11_800);
        repo.insert(&header).await.unwrap();
        repo.insert_lines(&[fixtures::line("doc-1", 1, "item-1", 1, 10_000, 1_800)])
            .await
            .unwrap();

        let stored = repo.get("doc-1").await.unwrap().unwrap();
        assert_eq!(stored.document_number, header.document_number);
        assert_eq!(stored.document_date, header.document_date);
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
        assert_eq!(repo.lines("doc-1").await.unwrap().len(), 1);

        repo.delete("doc-1").await.unwrap();
        assert!(repo.get("doc-1").await.unwrap().is_none());
        assert!(repo.lines("doc-1").await.unwrap().is_empty());
        assert!(matches!(repo.delete("doc-1").await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_number_is_rejected() {
        let db = setup().await;
        let repo = db.documents();
        repo.insert(&fixtures::invoice_header("doc-1", 7, 100)).await.unwrap();

        let err = repo.insert(&fixtures::invoice_header("doc-2", 7, 100)).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_line_batch_is_all_or_nothing() {
        let db = setup().await;
        let repo = db.documents();
        repo.insert(&fixtures::invoice_header("doc-1", 1, 20_000)).await.unwrap();

        let good = fixtures::line("doc-1", 1, "item-1", 1, 10_000, 0);
        let bad = fixtures::line("doc-1", 2, "no-such-item", 1, 10_000, 0);
        assert!(repo.insert_lines(&[good, bad]).await.is_err());
        assert!(repo.lines("doc-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_payment_is_guarded() {
        let db = setup().await;
        let repo = db.documents();
        repo.insert(&fixtures::invoice_header("doc-1", 1, 10_000)).await.unwrap();

        let partial = repo.apply_payment("doc-1", 4_000).await.unwrap().unwrap();
        assert_eq!(partial.payment_status, PaymentStatus::Partial);
        assert_eq!(partial.balance_cents, 6_000);

        assert!(repo.apply_payment("doc-1", 6_001).await.unwrap().is_none());

        let paid = repo.apply_payment("doc-1", 6_000).await.unwrap().unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.balance_cents, 0);

        let reverted = repo.apply_payment("doc-1", -10_000).await.unwrap().unwrap();
        assert_eq!(reverted.payment_status, PaymentStatus::Unpaid);
        assert!(repo.apply_payment("doc-1", -1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_checks_expected() {
        let db = setup().await;
        let repo = db.documents();
        repo.insert(&fixtures::invoice_header("doc-1", 1, 100)).await.unwrap();

        assert!(repo
            .set_status("doc-1", DocumentStatus::Draft, DocumentStatus::Confirmed)
            .await
            .unwrap());
        assert!(!repo
            .set_status("doc-1", DocumentStatus::Draft, DocumentStatus::Confirmed)
            .await
            .unwrap());
    }
}
