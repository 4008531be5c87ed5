//! # Ledger Repository
//!
//! Append-only party ledger with a running balance.
//!
//! ## Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │  INSERT INTO ledger_entries (..., balance_cents, ...)                   │
//! │  SELECT ..., COALESCE(latest balance of party, 0) + debit − credit      │
//! │  RETURNING *                          ◄── read and append in one step   │
//! │                                                                         │
//! │  UPDATE parties SET balance_cents = <new balance>                       │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write lock is taken by the INSERT itself, so two postings for one
//! party cannot both read the same previous balance.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use billbook_core::{EntrySide, LedgerEntry, Money};

const ENTRY_COLUMNS: &str = r#"
    id, seq, party_id, entry_date, debit_cents, credit_cents, balance_cents,
    reference_type, reference_id, description, created_at
"#;

/// A ledger row to be appended.
#[derive(Debug, Clone)]
pub struct LedgerPosting {
    pub party_id: String,
    pub entry_date: NaiveDate,
    pub side: EntrySide,
    pub amount: Money,
    pub reference_type: String,
    pub reference_id: String,
    pub description: Option<String>,
}

/// Net effect of a reference on one party.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ReferenceNet {
    pub party_id: String,
    /// Sum of `debit − credit` for the reference.
    pub net_cents: i64,
}

#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends an entry and moves the party's stored balance to match.
    pub async fn post(&self, posting: &LedgerPosting) -> DbResult<LedgerEntry> {
        let (debit, credit) = posting.side.split(posting.amount);
        debug!(
            party_id = %posting.party_id,
            reference_id = %posting.reference_id,
            debit = debit.cents(),
            credit = credit.cents(),
            "Posting ledger entry"
        );

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO ledger_entries (
                id, party_id, entry_date, debit_cents, credit_cents, balance_cents,
                reference_type, reference_id, description, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5,
                   COALESCE((
                       SELECT balance_cents FROM ledger_entries
                       WHERE party_id = ?2
                       ORDER BY entry_date DESC, seq DESC
                       LIMIT 1
                   ), 0) + ?4 - ?5,
                   ?6, ?7, ?8, ?9
            RETURNING {ENTRY_COLUMNS}
            "#
        );
        let entry = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&posting.party_id)
            .bind(posting.entry_date)
            .bind(debit.cents())
            .bind(credit.cents())
            .bind(&posting.reference_type)
            .bind(&posting.reference_id)
            .bind(&posting.description)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE parties SET balance_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&posting.party_id)
            .bind(entry.balance_cents)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Party", &posting.party_id));
        }

        tx.commit().await?;
        Ok(entry)
    }

    /// Full history of a party in ledger order.
    pub async fn entries_for_party(&self, party_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE party_id = ?1 ORDER BY entry_date, seq"
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(party_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    pub async fn entries_for_reference(&self, reference_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE reference_id = ?1 ORDER BY seq"
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Latest running balance of a party; zero with no history.
    pub async fn latest_balance(&self, party_id: &str) -> DbResult<Money> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT balance_cents FROM ledger_entries
            WHERE party_id = ?1
            ORDER BY entry_date DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(party_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Money::from_cents(balance.unwrap_or(0)))
    }

    /// Non-zero net effects of a reference, per party.
    pub async fn net_for_reference(&self, reference_id: &str) -> DbResult<Vec<ReferenceNet>> {
        let nets = sqlx::query_as::<_, ReferenceNet>(
            r#"
            SELECT party_id, SUM(debit_cents - credit_cents) AS net_cents
            FROM ledger_entries
            WHERE reference_id = ?1
            GROUP BY party_id
            HAVING SUM(debit_cents - credit_cents) != 0
            ORDER BY MIN(seq)
            "#,
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(nets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::{Database, DbConfig};
    use billbook_core::ledger::{first_inconsistency, replay};
    use billbook_core::PartyKind;

    fn posting(side: EntrySide, cents: i64, reference: &str) -> LedgerPosting {
        LedgerPosting {
            party_id: "cust-1".into(),
            entry_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            side,
            amount: Money::from_cents(cents),
            reference_type: "invoice".into(),
            reference_id: reference.into(),
            description: None,
        }
    }

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        fixtures::company(&db, "co-1", None).await;
        fixtures::party(&db, "co-1", "cust-1", PartyKind::Customer, None).await;
        db
    }

    #[tokio::test]
    async fn test_running_balance_and_party_counter() {
        let db = setup().await;
        let ledger = db.ledger();

        let first = ledger.post(&posting(EntrySide::Debit, 10_000, "inv-1")).await.unwrap();
        assert_eq!(first.balance_cents, 10_000);
        let second = ledger.post(&posting(EntrySide::Credit, 3_000, "pay-1")).await.unwrap();
        assert_eq!(second.balance_cents, 7_000);
        assert!(second.seq > first.seq);

        let party = db.parties().get_by_id("cust-1").await.unwrap().unwrap();
        assert_eq!(party.balance_cents, 7_000);
        assert_eq!(ledger.latest_balance("cust-1").await.unwrap().cents(), 7_000);

        let history = ledger.entries_for_party("cust-1").await.unwrap();
        assert_eq!(replay(&history).cents(), 7_000);
        assert!(first_inconsistency(&history).is_none());
    }

    #[tokio::test]
    async fn test_net_for_reference() {
        let db = setup().await;
        let ledger = db.ledger();

        ledger.post(&posting(EntrySide::Debit, 5_000, "inv-1")).await.unwrap();
        ledger.post(&posting(EntrySide::Debit, 2_000, "inv-2")).await.unwrap();

        let nets = ledger.net_for_reference("inv-1").await.unwrap();
        assert_eq!(nets, vec![ReferenceNet { party_id: "cust-1".into(), net_cents: 5_000 }]);

        ledger.post(&posting(EntrySide::Credit, 5_000, "inv-1")).await.unwrap();
        assert!(ledger.net_for_reference("inv-1").await.unwrap().is_empty());
        assert_eq!(ledger.entries_for_reference("inv-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_entries_cannot_be_rewritten() {
        let db = setup().await;
        db.ledger().post(&posting(EntrySide::Debit, 100, "inv-1")).await.unwrap();

        let result = sqlx::query("DELETE FROM ledger_entries").execute(db.pool()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_post_for_unknown_party_fails() {
        let db = setup().await;
        let mut bad = posting(EntrySide::Debit, 100, "inv-1");
        bad.party_id = "ghost".into();
        assert!(db.ledger().post(&bad).await.is_err());
        assert!(db.ledger().entries_for_reference("inv-1").await.unwrap().is_empty());
    }
}
