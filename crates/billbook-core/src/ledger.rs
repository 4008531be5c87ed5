//! # Balance Ledger Arithmetic
//!
//! Running-balance convention: `balance = previous + debit − credit`.
//! A positive balance means the party owes the company; a negative one
//! means the company owes the party.
//!
//! Entries are ordered by `(entry_date, seq)`; `seq` is the insertion
//! order assigned by storage.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    /// The side that cancels this one.
    pub const fn opposite(&self) -> Self {
        match self {
            EntrySide::Debit => EntrySide::Credit,
            EntrySide::Credit => EntrySide::Debit,
        }
    }

    /// `(debit, credit)` columns for an amount posted on this side.
    pub fn split(&self, amount: Money) -> (Money, Money) {
        match self {
            EntrySide::Debit => (amount, Money::zero()),
            EntrySide::Credit => (Money::zero(), amount),
        }
    }

    /// Side that moves the balance by `delta` (debit for positive).
    pub fn for_delta(delta: Money) -> Self {
        if delta.is_negative() {
            EntrySide::Credit
        } else {
            EntrySide::Debit
        }
    }
}

impl fmt::Display for EntrySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntrySide::Debit => "debit",
            EntrySide::Credit => "credit",
        })
    }
}

/// Append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    /// Insertion order; tie-breaker within a date.
    pub seq: i64,
    pub party_id: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub debit_cents: i64,
    pub credit_cents: i64,
    pub balance_cents: i64,
    pub reference_type: String,
    pub reference_id: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `debit − credit`.
    #[inline]
    pub fn delta(&self) -> Money {
        Money::from_cents(self.debit_cents - self.credit_cents)
    }

    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }
}

/// Recomputes a party's balance from its full history.
///
/// Sorts by `(entry_date, seq)` first, so callers may pass entries in any
/// order.
pub fn replay(entries: &[LedgerEntry]) -> Money {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| (e.entry_date, e.seq));
    ordered.iter().map(|e| e.delta()).sum()
}

/// First entry whose stored balance disagrees with the replayed prefix.
pub fn first_inconsistency(entries: &[LedgerEntry]) -> Option<&LedgerEntry> {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| (e.entry_date, e.seq));
    let mut running = Money::zero();
    for entry in ordered {
        running += entry.delta();
        if running != entry.balance() {
            return Some(entry);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: i64, day: u32, debit: i64, credit: i64, balance: i64) -> LedgerEntry {
        LedgerEntry {
            id: format!("le-{seq}"),
            seq,
            party_id: "party-1".into(),
            entry_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            debit_cents: debit,
            credit_cents: credit,
            balance_cents: balance,
            reference_type: "invoice".into(),
            reference_id: "doc-1".into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_replay_matches_latest_balance() {
        let entries = vec![
            entry(3, 2, 0, 4_000, 6_000),
            entry(1, 1, 10_000, 0, 10_000),
            entry(2, 2, 0, 0, 10_000),
        ];
        assert_eq!(replay(&entries).cents(), 6_000);
        assert!(first_inconsistency(&entries).is_none());
    }

    #[test]
    fn test_inconsistency_is_detected() {
        let entries = vec![entry(1, 1, 10_000, 0, 10_000), entry(2, 1, 0, 500, 9_000)];
        assert_eq!(first_inconsistency(&entries).map(|e| e.seq), Some(2));
    }

    #[test]
    fn test_sides() {
        let amount = Money::from_cents(250);
        assert_eq!(EntrySide::Debit.split(amount), (amount, Money::zero()));
        assert_eq!(EntrySide::Credit.split(amount), (Money::zero(), amount));
        assert_eq!(EntrySide::Debit.opposite(), EntrySide::Credit);
        assert_eq!(EntrySide::for_delta(Money::from_cents(-1)), EntrySide::Credit);
    }
}
