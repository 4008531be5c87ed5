//! # Referenced Master Types
//!
//! Entities the document engine reads but does not own: companies,
//! branches, parties (customers/vendors) and items. Their CRUD lives
//! outside the engine; the engine only resolves them and mutates the
//! counters it is responsible for (item stock, party balances).
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐ │
//! │  │   Company    │   │    Branch    │   │    Party     │   │   Item   │ │
//! │  │  tax_id ─────┼───┼──────────────┼──►│  tax_id      │   │ stock    │ │
//! │  │  (state code)│   │  doc prefix  │   │  balance     │   │ reserved │ │
//! │  └──────────────┘   └──────────────┘   │  advance     │   │ tax_rate │ │
//! │                                        └──────────────┘   └──────────┘ │
//! │   first two chars of both tax ids differ  ⇒  inter-state supply        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::inventory::StockLevels;
use crate::money::Money;
use crate::tax;

/// GST rate in basis points: `1_800` is 18%.
///
/// The intra-state CGST/SGST split halves this value; an odd rate gives
/// SGST the extra basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Company
// =============================================================================

/// The legal entity issuing documents.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Company {
    pub id: String,
    pub name: String,
    /// Tax identification number; its first two characters are the state code.
    pub tax_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Branch
// =============================================================================

/// A branch of a company; numbering is kept per branch.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Leading segment of every document number issued here (`HQ`).
    pub document_prefix: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Party
// =============================================================================

/// Which side of trade a party sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Vendor,
}

impl PartyKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Vendor => "vendor",
        }
    }
}

impl std::fmt::Display for PartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer or vendor.
///
/// `balance_cents` mirrors the running balance on the party's latest
/// ledger entry: positive means the party owes the company, negative means
/// the company owes the party. `advance_cents` is unallocated credit held
/// for the party.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Party {
    pub id: String,
    pub company_id: String,
    pub kind: PartyKind,
    pub name: String,
    pub tax_id: Option<String>,
    pub billing_address: Option<String>,
    pub shipping_address: Option<String>,
    pub balance_cents: i64,
    pub advance_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Party {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    #[inline]
    pub fn advance(&self) -> Money {
        Money::from_cents(self.advance_cents)
    }
}

// =============================================================================
// Item
// =============================================================================

/// A catalog item.
///
/// Stock counters are mutated exclusively through the inventory ledger;
/// `available_stock` is stored so listings need no arithmetic, and is
/// recomputed with every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Item {
    pub id: String,
    pub company_id: String,
    /// Business identifier (unique per company).
    pub code: String,
    pub name: String,
    /// HSN/SAC or equivalent classification code.
    pub tax_code: Option<String>,
    pub tax_rate_bps: i64,
    /// Default selling rate in cents.
    pub sale_rate_cents: i64,
    /// Default purchase rate in cents.
    pub purchase_rate_cents: i64,
    /// Master rates include tax and must be back-calculated for lines.
    pub rate_includes_tax: bool,
    pub tracks_inventory: bool,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub available_stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps.clamp(0, u32::MAX as i64) as u32)
    }

    /// Current stock counters as a value type.
    #[inline]
    pub fn levels(&self) -> StockLevels {
        StockLevels::new(self.current_stock, self.reserved_stock)
    }

    /// Default line rate for selling, exclusive of tax.
    pub fn default_sale_rate(&self) -> Money {
        self.exclusive(Money::from_cents(self.sale_rate_cents))
    }

    /// Default line rate for purchasing, exclusive of tax.
    pub fn default_purchase_rate(&self) -> Money {
        self.exclusive(Money::from_cents(self.purchase_rate_cents))
    }

    fn exclusive(&self, master_rate: Money) -> Money {
        if self.rate_includes_tax {
            tax::split_inclusive_price(master_rate, self.tax_rate()).taxable
        } else {
            master_rate
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
