//! # billbook-engine: Transactional Document Engine
//!
//! Ties the pure rules of `billbook-core` to the storage primitives of
//! `billbook-db` and exposes the document operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  caller ──► Engine                                                      │
//! │               │                                                         │
//! │               ├── DocumentComposer ──┬── SequenceAllocator              │
//! │               │   create / update /  ├── InventoryLedger                │
//! │               │   delete + Journal   └── BalanceLedger                  │
//! │               │                                                         │
//! │               ├── record_stock_movement / adjust_stock                  │
//! │               └── replay_balance                                        │
//! │                                                                         │
//! │  every component shares one Database (SqlitePool is Arc inside)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billbook_engine::{Engine, EngineConfig, DocumentPayload, LinePayload};
//! use billbook_core::DocumentType;
//!
//! let engine = Engine::open(&EngineConfig::load(None)?).await?;
//! let invoice = engine
//!     .create_document(DocumentType::Invoice, &DocumentPayload {
//!         company_id: "co-1".into(),
//!         branch_id: "br-1".into(),
//!         party_id: "cust-1".into(),
//!         lines: vec![LinePayload { item_id: "item-1".into(), quantity: 2, ..Default::default() }],
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{}", invoice.document.document_number);
//! ```

pub mod balance;
pub mod composer;
pub mod config;
pub mod error;
pub mod inventory;
pub mod sequence;

pub use balance::{BalanceLedger, BalanceReplay};
pub use composer::{AllocationPayload, DocumentComposer, DocumentPatch, DocumentPayload, LinePayload};
pub use config::{DatabaseSettings, EngineConfig, NumberingSettings};
pub use error::{EngineError, EngineResult};
pub use inventory::{AdjustStockPayload, InventoryLedger, MovementResult, StockMovementPayload};
pub use sequence::{AllocatedNumber, SequenceAllocator};

use tracing::info;

use billbook_core::{Document, DocumentDetail, DocumentType};
use billbook_db::Database;

/// Entry point for every document operation.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    sequences: SequenceAllocator,
    inventory: InventoryLedger,
    balances: BalanceLedger,
    composer: DocumentComposer,
}

impl Engine {
    pub fn new(db: Database, numbering: NumberingSettings) -> Self {
        let sequences = SequenceAllocator::new(db.clone(), numbering);
        let inventory = InventoryLedger::new(db.clone());
        let balances = BalanceLedger::new(db.clone());
        let composer = DocumentComposer::new(
            db.clone(),
            sequences.clone(),
            inventory.clone(),
            balances.clone(),
        );
        Engine {
            db,
            sequences,
            inventory,
            balances,
            composer,
        }
    }

    /// Opens the configured database (running migrations) and builds the
    /// engine on top of it.
    pub async fn open(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()?).await?;
        info!("Document engine ready");
        Ok(Engine::new(db, config.numbering.clone()))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn sequences(&self) -> &SequenceAllocator {
        &self.sequences
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    pub fn balances(&self) -> &BalanceLedger {
        &self.balances
    }

    // =========================================================================
    // Documents
    // =========================================================================

    pub async fn create_document(
        &self,
        document_type: DocumentType,
        payload: &DocumentPayload,
    ) -> EngineResult<DocumentDetail> {
        self.composer.create(document_type, payload).await
    }

    pub async fn update_document(
        &self,
        id: &str,
        patch: &DocumentPatch,
    ) -> EngineResult<DocumentDetail> {
        self.composer.update(id, patch).await
    }

    /// Returns the header as it was before deletion.
    pub async fn delete_document(&self, id: &str) -> EngineResult<Document> {
        self.composer.delete(id).await
    }

    pub async fn get_document(&self, id: &str) -> EngineResult<DocumentDetail> {
        self.composer.detail(id).await
    }

    // =========================================================================
    // Stock & Ledger
    // =========================================================================

    pub async fn record_stock_movement(
        &self,
        payload: &StockMovementPayload,
    ) -> EngineResult<MovementResult> {
        self.inventory.record_movement(payload).await
    }

    pub async fn adjust_stock(&self, payload: &AdjustStockPayload) -> EngineResult<MovementResult> {
        self.inventory.adjust_stock(payload).await
    }

    pub async fn replay_balance(&self, party_id: &str) -> EngineResult<BalanceReplay> {
        self.balances.replay_balance(party_id).await
    }
}

/// Engines and master data shared by the unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use chrono::{NaiveDate, Utc};

    use billbook_core::{
        Branch, Company, DocumentSequence, DocumentType, Item, Party, PartyKind, ResetPolicy,
    };
    use billbook_db::{Database, DbConfig};

    use super::{DocumentPayload, Engine, LinePayload, NumberingSettings};

    pub async fn engine() -> Engine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Engine::new(db, NumberingSettings::default())
    }

    pub async fn file_engine(path: &Path) -> Engine {
        let db = Database::new(DbConfig::new(path).max_connections(8)).await.unwrap();
        Engine::new(db, NumberingSettings::default())
    }

    /// Company `co-1` (state 27) with branch `br-1` numbered `HQ`.
    pub async fn hq(engine: &Engine) -> Branch {
        let db = engine.database();
        db.companies()
            .insert(&Company {
                id: "co-1".into(),
                name: "Billbook Traders".into(),
                tax_id: Some("27AAACB1234F1Z5".into()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let branch = Branch {
            id: "br-1".into(),
            company_id: "co-1".into(),
            name: "Head Office".into(),
            document_prefix: "HQ".into(),
            created_at: Utc::now(),
        };
        db.branches().insert(&branch).await.unwrap();
        branch
    }

    pub async fn sequence_row(
        engine: &Engine,
        document_type: DocumentType,
        current_number: i64,
        fiscal_year: &str,
        reset_policy: ResetPolicy,
    ) {
        let now = Utc::now();
        let row = DocumentSequence {
            id: format!("seq-{document_type}"),
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            document_type,
            prefix: document_type.policy().prefix.into(),
            current_number,
            padding: 4,
            fiscal_year: fiscal_year.into(),
            reset_policy,
            created_at: now,
            updated_at: now,
        };
        assert!(engine.database().sequences().try_insert(&row).await.unwrap());
    }

    async fn party(engine: &Engine, id: &str, kind: PartyKind, tax_id: &str) {
        let now = Utc::now();
        engine
            .database()
            .parties()
            .insert(&Party {
                id: id.into(),
                company_id: "co-1".into(),
                kind,
                name: format!("Party {id}"),
                tax_id: Some(tax_id.into()),
                billing_address: None,
                shipping_address: None,
                balance_cents: 0,
                advance_cents: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn item(engine: &Engine, id: &str, name: &str, rates: (i64, i64, i64), stock: Option<i64>) {
        let (tax_rate_bps, sale_rate_cents, purchase_rate_cents) = rates;
        let now = Utc::now();
        let current = stock.unwrap_or_default();
        engine
            .database()
            .items()
            .insert(&Item {
                id: id.into(),
                company_id: "co-1".into(),
                code: id.to_uppercase(),
                name: name.into(),
                tax_code: None,
                tax_rate_bps,
                sale_rate_cents,
                purchase_rate_cents,
                rate_includes_tax: false,
                tracks_inventory: stock.is_some(),
                current_stock: current,
                reserved_stock: 0,
                available_stock: current,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    /// `hq` plus two customers (`cust-2` in another state), a vendor, two
    /// stocked items and an untracked service.
    pub async fn seeded() -> Engine {
        let engine = engine().await;
        hq(&engine).await;
        party(&engine, "cust-1", PartyKind::Customer, "27AAAPC0001A1Z1").await;
        party(&engine, "cust-2", PartyKind::Customer, "29AAAPC0002A1Z2").await;
        party(&engine, "vend-1", PartyKind::Vendor, "27AAAPV0003A1Z3").await;
        item(&engine, "item-1", "Widget", (1_800, 10_000, 8_000), Some(50)).await;
        item(&engine, "item-2", "Gasket", (500, 2_500, 2_000), Some(20)).await;
        item(&engine, "svc-1", "Installation", (1_800, 50_000, 0), None).await;
        engine
    }

    /// Overwrites an item's counters.
    pub async fn set_levels(engine: &Engine, item_id: &str, current: i64, reserved: i64) {
        sqlx::query(
            "UPDATE items SET current_stock = ?2, reserved_stock = ?3, \
             available_stock = MAX(0, ?2 - ?3) WHERE id = ?1",
        )
        .bind(item_id)
        .bind(current)
        .bind(reserved)
        .execute(engine.database().pool())
        .await
        .unwrap();
    }

    pub fn line(item_id: &str, quantity: i64) -> LinePayload {
        LinePayload {
            item_id: item_id.into(),
            quantity,
            ..Default::default()
        }
    }

    /// A document for `party_id` at `br-1`, dated 2024-06-01.
    pub fn payload(party_id: &str, lines: Vec<LinePayload>) -> DocumentPayload {
        DocumentPayload {
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            party_id: party_id.into(),
            document_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            lines,
            ..Default::default()
        }
    }
}
