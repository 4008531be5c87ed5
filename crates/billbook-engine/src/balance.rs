//! # Balance Ledger
//!
//! Running-balance postings for customers and vendors, payment application
//! to open documents and the party advance.
//!
//! ## Sign Convention
//! ```text
//! balance > 0   the party owes the company      (invoice, debit note)
//! balance < 0   the company owes the party      (bill, credit note)
//!
//! balance_n = balance_(n-1) + debit − credit    ordered by (entry_date, seq)
//! ```
//!
//! Reversal never edits or deletes an entry: it posts the opposite of
//! whatever a reference still nets to, so reversing twice is a no-op.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use billbook_core::ledger::{first_inconsistency, replay};
use billbook_core::validation::{validate_amount, validate_reference};
use billbook_core::{Document, EntrySide, LedgerEntry, Money, ValidationError};
use billbook_db::{Database, LedgerPosting};

use crate::error::{EngineError, EngineResult};

/// Result of replaying a party's history against what is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReplay {
    pub party_id: String,
    pub entries: usize,
    /// Sum of `debit − credit` over the full history.
    pub replayed: Money,
    /// Balance on the latest entry.
    pub latest: Money,
    /// Balance cached on the party row.
    pub cached: Money,
    /// First entry whose running balance disagrees with the replay.
    pub first_mismatch: Option<String>,
}

impl BalanceReplay {
    pub fn is_consistent(&self) -> bool {
        self.first_mismatch.is_none() && self.replayed == self.latest && self.latest == self.cached
    }
}

#[derive(Debug, Clone)]
pub struct BalanceLedger {
    db: Database,
}

impl BalanceLedger {
    pub fn new(db: Database) -> Self {
        BalanceLedger { db }
    }

    /// Appends one entry and returns it; `balance_cents` is the party's
    /// new running balance.
    pub async fn post_entry(
        &self,
        party_id: &str,
        amount: Money,
        side: EntrySide,
        reference_type: &str,
        reference_id: &str,
        description: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        validate_reference("party_id", party_id)?;
        validate_reference("reference_id", reference_id)?;
        validate_amount("amount", amount.cents())?;

        let entry = self
            .db
            .ledger()
            .post(&LedgerPosting {
                party_id: party_id.to_string(),
                entry_date: Utc::now().date_naive(),
                side,
                amount,
                reference_type: reference_type.to_string(),
                reference_id: reference_id.to_string(),
                description,
            })
            .await?;

        info!(
            party_id = %party_id,
            reference_id = %reference_id,
            side = %side,
            amount = %amount,
            balance = entry.balance_cents,
            "Posted ledger entry"
        );
        Ok(entry)
    }

    /// Posts the opposite of what `reference_id` still nets to for each
    /// party and returns the new entries.
    pub async fn reverse_entries_for_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> EngineResult<Vec<LedgerEntry>> {
        let nets = self.db.ledger().net_for_reference(reference_id).await?;

        let mut reversals = Vec::with_capacity(nets.len());
        for net in nets {
            let delta = Money::from_cents(net.net_cents);
            let side = EntrySide::for_delta(delta).opposite();
            let entry = self
                .post_entry(
                    &net.party_id,
                    delta.abs(),
                    side,
                    reference_type,
                    reference_id,
                    Some(format!("Reversal of {reference_type} {reference_id}")),
                )
                .await?;
            reversals.push(entry);
        }

        if !reversals.is_empty() {
            info!(
                reference_id = %reference_id,
                count = reversals.len(),
                "Reversed ledger entries"
            );
        }
        Ok(reversals)
    }

    /// Recomputes a party's balance from its full history.
    pub async fn replay_balance(&self, party_id: &str) -> EngineResult<BalanceReplay> {
        let party = self
            .db
            .parties()
            .get_by_id(party_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Party", party_id))?;
        let entries = self.db.ledger().entries_for_party(party_id).await?;

        let replayed = replay(&entries);
        let latest = self.db.ledger().latest_balance(party_id).await?;
        let first_mismatch = first_inconsistency(&entries).map(|e| e.id.clone());

        let result = BalanceReplay {
            party_id: party.id.clone(),
            entries: entries.len(),
            replayed,
            latest,
            cached: party.balance(),
            first_mismatch,
        };
        if !result.is_consistent() {
            warn!(
                party_id = %party_id,
                replayed = %result.replayed,
                latest = %result.latest,
                cached = %result.cached,
                "Ledger replay disagrees with stored balance"
            );
        }
        Ok(result)
    }

    /// Moves `delta` onto a document's paid amount; the stored guard keeps
    /// `0 <= paid <= total`.
    pub async fn apply_to_document(&self, document_id: &str, delta: Money) -> EngineResult<Document> {
        match self.db.documents().apply_payment(document_id, delta.cents()).await? {
            Some(document) => Ok(document),
            None => {
                let document = self
                    .db
                    .documents()
                    .get(document_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("Document", document_id))?;
                Err(ValidationError::mismatch(
                    "amount",
                    format!(
                        "{} against {} with balance {}",
                        delta,
                        document.document_number,
                        document.balance()
                    ),
                )
                .into())
            }
        }
    }

    /// Adds `delta` to the party's advance and returns the new advance.
    pub async fn adjust_advance(&self, party_id: &str, delta: Money) -> EngineResult<Money> {
        let advance = self.db.parties().adjust_advance(party_id, delta.cents()).await?;
        info!(party_id = %party_id, delta = %delta, advance, "Adjusted party advance");
        Ok(Money::from_cents(advance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn cents(value: i64) -> Money {
        Money::from_cents(value)
    }

    #[tokio::test]
    async fn test_running_balance_follows_postings() {
        let engine = testing::seeded().await;
        let ledger = engine.balances();

        let first = ledger
            .post_entry("cust-1", cents(10_000), EntrySide::Debit, "invoice", "inv-1", None)
            .await
            .unwrap();
        assert_eq!(first.balance_cents, 10_000);

        let second = ledger
            .post_entry("cust-1", cents(2_500), EntrySide::Credit, "payment", "py-1", None)
            .await
            .unwrap();
        assert_eq!(second.balance_cents, 7_500);

        let party = engine.database().parties().get_by_id("cust-1").await.unwrap().unwrap();
        assert_eq!(party.balance_cents, 7_500);

        let zero = ledger
            .post_entry("cust-1", Money::zero(), EntrySide::Debit, "invoice", "inv-2", None)
            .await
            .unwrap_err();
        assert_eq!(zero.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_reversal_nets_reference_to_zero() {
        let engine = testing::seeded().await;
        let ledger = engine.balances();

        ledger
            .post_entry("cust-1", cents(4_000), EntrySide::Debit, "invoice", "inv-1", None)
            .await
            .unwrap();
        ledger
            .post_entry("cust-1", cents(1_000), EntrySide::Debit, "invoice", "inv-2", None)
            .await
            .unwrap();

        let reversals = ledger.reverse_entries_for_reference("invoice", "inv-1").await.unwrap();
        assert_eq!(reversals.len(), 1);
        assert_eq!(reversals[0].credit_cents, 4_000);
        assert_eq!(reversals[0].balance_cents, 1_000);

        assert!(ledger
            .reverse_entries_for_reference("invoice", "inv-1")
            .await
            .unwrap()
            .is_empty());

        let history = engine.database().ledger().entries_for_party("cust-1").await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_replay_matches_stored_balance() {
        let engine = testing::seeded().await;
        let ledger = engine.balances();

        let postings = [
            (EntrySide::Debit, 12_000, "inv-1"),
            (EntrySide::Credit, 5_000, "py-1"),
            (EntrySide::Debit, 800, "inv-2"),
            (EntrySide::Credit, 9_000, "cn-1"),
        ];
        for (side, amount, reference) in postings {
            ledger
                .post_entry("cust-1", cents(amount), side, "test", reference, None)
                .await
                .unwrap();
        }
        ledger.reverse_entries_for_reference("test", "py-1").await.unwrap();

        let replayed = ledger.replay_balance("cust-1").await.unwrap();
        assert!(replayed.is_consistent(), "{replayed:?}");
        assert_eq!(replayed.entries, 5);
        assert_eq!(replayed.replayed, cents(3_800));

        let missing = ledger.replay_balance("ghost").await.unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_advance_moves_both_ways() {
        let engine = testing::seeded().await;
        let ledger = engine.balances();

        assert_eq!(ledger.adjust_advance("cust-1", cents(700)).await.unwrap(), cents(700));
        assert_eq!(ledger.adjust_advance("cust-1", cents(-200)).await.unwrap(), cents(500));
        assert_eq!(
            ledger.adjust_advance("ghost", cents(1)).await.unwrap_err().code(),
            "NOT_FOUND"
        );
    }
}
