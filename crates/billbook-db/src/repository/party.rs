//! # Party Repository
//!
//! Customers and vendors. The engine only writes two counters here:
//! `balance_cents` (kept in step with the ledger by [`LedgerRepository`])
//! and `advance_cents`.
//!
//! [`LedgerRepository`]: crate::repository::LedgerRepository

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use billbook_core::Party;

const PARTY_COLUMNS: &str = r#"
    id, company_id, kind, name, tax_id, billing_address, shipping_address,
    balance_cents, advance_cents, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PartyRepository {
    pool: SqlitePool,
}

impl PartyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PartyRepository { pool }
    }

    /// Resolves a party within a company.
    pub async fn get(&self, id: &str, company_id: &str) -> DbResult<Option<Party>> {
        let sql = format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = ?1 AND company_id = ?2");
        let party = sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(party)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Party>> {
        let sql = format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = ?1");
        let party = sqlx::query_as::<_, Party>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(party)
    }

    pub async fn insert(&self, party: &Party) -> DbResult<()> {
        debug!(id = %party.id, kind = %party.kind, "Inserting party");

        sqlx::query(
            r#"
            INSERT INTO parties (
                id, company_id, kind, name, tax_id, billing_address, shipping_address,
                balance_cents, advance_cents, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&party.id)
        .bind(&party.company_id)
        .bind(party.kind)
        .bind(&party.name)
        .bind(&party.tax_id)
        .bind(&party.billing_address)
        .bind(&party.shipping_address)
        .bind(party.balance_cents)
        .bind(party.advance_cents)
        .bind(party.created_at)
        .bind(party.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds `delta` to the party's advance and returns the new advance.
    ///
    /// Single statement; concurrent callers cannot lose an update.
    pub async fn adjust_advance(&self, id: &str, delta: i64) -> DbResult<i64> {
        debug!(id = %id, delta = delta, "Adjusting party advance");

        let advance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE parties
            SET advance_cents = advance_cents + ?2, updated_at = ?3
            WHERE id = ?1
            RETURNING advance_cents
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        advance.ok_or_else(|| DbError::not_found("Party", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::{Database, DbConfig};
    use billbook_core::PartyKind;

    #[tokio::test]
    async fn test_party_lookup_and_advance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let company = fixtures::company(&db, "co-1", None).await;
        let party = fixtures::party(&db, &company.id, "cust-1", PartyKind::Customer, None).await;

        let found = db.parties().get(&party.id, "co-1").await.unwrap().unwrap();
        assert_eq!(found.kind, PartyKind::Customer);
        assert!(db.parties().get(&party.id, "co-x").await.unwrap().is_none());

        assert_eq!(db.parties().adjust_advance(&party.id, 500).await.unwrap(), 500);
        assert_eq!(db.parties().adjust_advance(&party.id, -200).await.unwrap(), 300);

        let err = db.parties().adjust_advance("missing", 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
