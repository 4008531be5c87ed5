//! # Item Repository
//!
//! Item resolution and the atomic stock primitives of the inventory ledger.
//!
//! ## Guarded Stock Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ONE TRANSACTION PER CHANGE                           │
//! │                                                                         │
//! │  1. UPDATE items                                                        │
//! │        SET current  = current + Δc,                                     │
//! │            reserved = max(0, reserved + Δr),                            │
//! │            available = max(0, current' − reserved')                    │
//! │      WHERE id = ? AND current − reserved >= required                    │
//! │      RETURNING current', reserved'                                      │
//! │                                                                         │
//! │     no row? → item missing (NotFound) or short (Insufficient)          │
//! │                                                                         │
//! │  2. INSERT INTO inventory_movements                                     │
//! │        stock_before = current' − Δc, stock_after = current'             │
//! │                                                                         │
//! │  COMMIT ← check, mutation and movement row are atomic                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A read-then-write in application code would let two outbound documents
//! both see the same available stock; the guard in the WHERE clause makes
//! the check and the decrement one step.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use billbook_core::{InventoryMovement, Item, MovementType, StockLevels};

const ITEM_COLUMNS: &str = r#"
    id, company_id, code, name, tax_code, tax_rate_bps, sale_rate_cents,
    purchase_rate_cents, rate_includes_tax, tracks_inventory, current_stock,
    reserved_stock, available_stock, created_at, updated_at
"#;

// =============================================================================
// Stock Change
// =============================================================================

/// One atomic change to an item's counters.
#[derive(Debug, Clone)]
pub struct StockChange {
    pub item_id: String,
    pub branch_id: String,
    pub current_delta: i64,
    pub reserved_delta: i64,
    /// Minimum `current − reserved` required before the change; `None`
    /// skips the check.
    pub min_available: Option<i64>,
    /// Recorded when `current_delta != 0`; `in`/`out` follow the sign of
    /// the delta unless this is `adjustment`.
    pub movement_type: MovementType,
    pub rate_cents: Option<i64>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

impl StockChange {
    fn new(item_id: &str, branch_id: &str, movement_type: MovementType) -> Self {
        StockChange {
            item_id: item_id.to_string(),
            branch_id: branch_id.to_string(),
            current_delta: 0,
            reserved_delta: 0,
            min_available: None,
            movement_type,
            rate_cents: None,
            reference_type: None,
            reference_id: None,
            notes: None,
        }
    }

    /// Ships stock; requires `available ≥ quantity`.
    pub fn outbound(item_id: &str, branch_id: &str, quantity: i64) -> Self {
        StockChange {
            current_delta: -quantity,
            min_available: Some(quantity),
            ..Self::new(item_id, branch_id, MovementType::Out)
        }
    }

    pub fn inbound(item_id: &str, branch_id: &str, quantity: i64) -> Self {
        StockChange {
            current_delta: quantity,
            ..Self::new(item_id, branch_id, MovementType::In)
        }
    }

    /// Earmarks stock; requires `available ≥ quantity`.
    pub fn reserve(item_id: &str, branch_id: &str, quantity: i64) -> Self {
        StockChange {
            reserved_delta: quantity,
            min_available: Some(quantity),
            ..Self::new(item_id, branch_id, MovementType::Out)
        }
    }

    /// Drops a reservation (clamped at zero reserved).
    pub fn release(item_id: &str, branch_id: &str, quantity: i64) -> Self {
        StockChange {
            reserved_delta: -quantity,
            ..Self::new(item_id, branch_id, MovementType::In)
        }
    }

    /// Ships `quantity`, of which `from_reservation` was already reserved.
    pub fn fulfil(item_id: &str, branch_id: &str, quantity: i64, from_reservation: i64) -> Self {
        StockChange {
            current_delta: -quantity,
            reserved_delta: -from_reservation,
            min_available: Some(quantity - from_reservation),
            ..Self::new(item_id, branch_id, MovementType::Out)
        }
    }

    /// Undoes [`StockChange::fulfil`]: stock comes back and is re-reserved.
    pub fn unfulfil(item_id: &str, branch_id: &str, quantity: i64, from_reservation: i64) -> Self {
        StockChange {
            current_delta: quantity,
            reserved_delta: from_reservation,
            ..Self::new(item_id, branch_id, MovementType::In)
        }
    }

    /// Unchecked signed correction.
    pub fn adjustment(item_id: &str, branch_id: &str, delta: i64) -> Self {
        StockChange {
            current_delta: delta,
            ..Self::new(item_id, branch_id, MovementType::Adjustment)
        }
    }

    pub fn with_reference(mut self, reference_type: &str, reference_id: &str) -> Self {
        self.reference_type = Some(reference_type.to_string());
        self.reference_id = Some(reference_id.to_string());
        self
    }

    pub fn with_rate(mut self, rate_cents: i64) -> Self {
        self.rate_cents = Some(rate_cents);
        self
    }

    /// The change that undoes this one.
    ///
    /// Only a reversal that takes stock away is guarded; putting stock or a
    /// reservation back restores a state that already existed.
    pub fn reversed(&self) -> Self {
        let movement_type = match self.movement_type {
            MovementType::Adjustment => MovementType::Adjustment,
            MovementType::In => MovementType::Out,
            MovementType::Out => MovementType::In,
        };
        StockChange {
            item_id: self.item_id.clone(),
            branch_id: self.branch_id.clone(),
            current_delta: -self.current_delta,
            reserved_delta: -self.reserved_delta,
            min_available: (self.current_delta > 0).then_some(self.current_delta),
            movement_type,
            rate_cents: self.rate_cents,
            reference_type: self.reference_type.clone(),
            reference_id: self.reference_id.clone(),
            notes: Some("reversal".to_string()),
        }
    }

    fn movement(&self, stock_after: i64) -> InventoryMovement {
        let (movement_type, quantity) = match self.movement_type {
            MovementType::Adjustment => (MovementType::Adjustment, self.current_delta),
            _ if self.current_delta >= 0 => (MovementType::In, self.current_delta),
            _ => (MovementType::Out, -self.current_delta),
        };
        InventoryMovement {
            id: Uuid::new_v4().to_string(),
            item_id: self.item_id.clone(),
            branch_id: self.branch_id.clone(),
            movement_type,
            quantity,
            stock_before: stock_after - self.current_delta,
            stock_after,
            rate_cents: self.rate_cents,
            reference_type: self.reference_type.clone(),
            reference_id: self.reference_id.clone(),
            notes: self.notes.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Result of [`ItemRepository::apply_stock`].
#[derive(Debug, Clone)]
pub enum StockOutcome {
    Applied {
        levels: StockLevels,
        movement: Option<InventoryMovement>,
    },
    /// The availability guard rejected the change; nothing was written.
    Insufficient { available: i64 },
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    /// Resolves an item within a company.
    pub async fn get(&self, id: &str, company_id: &str) -> DbResult<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 AND company_id = ?2");
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    pub async fn insert(&self, item: &Item) -> DbResult<()> {
        debug!(code = %item.code, "Inserting item");

        sqlx::query(
            r#"
            INSERT INTO items (
                id, company_id, code, name, tax_code, tax_rate_bps, sale_rate_cents,
                purchase_rate_cents, rate_includes_tax, tracks_inventory, current_stock,
                reserved_stock, available_stock, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&item.id)
        .bind(&item.company_id)
        .bind(&item.code)
        .bind(&item.name)
        .bind(&item.tax_code)
        .bind(item.tax_rate_bps)
        .bind(item.sale_rate_cents)
        .bind(item.purchase_rate_cents)
        .bind(item.rate_includes_tax)
        .bind(item.tracks_inventory)
        .bind(item.current_stock)
        .bind(item.reserved_stock)
        .bind(item.levels().available())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies a guarded stock change and records its movement atomically.
    pub async fn apply_stock(&self, change: &StockChange) -> DbResult<StockOutcome> {
        debug!(
            item_id = %change.item_id,
            current_delta = change.current_delta,
            reserved_delta = change.reserved_delta,
            "Applying stock change"
        );

        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            UPDATE items
            SET current_stock = current_stock + ?2,
                reserved_stock = MAX(0, reserved_stock + ?3),
                available_stock = MAX(0, current_stock + ?2 - MAX(0, reserved_stock + ?3)),
                updated_at = ?4
            WHERE id = ?1
              AND (?5 IS NULL OR current_stock - reserved_stock >= ?5)
            RETURNING current_stock, reserved_stock
            "#,
        )
        .bind(&change.item_id)
        .bind(change.current_delta)
        .bind(change.reserved_delta)
        .bind(Utc::now())
        .bind(change.min_available)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((current, reserved)) = row else {
            let levels = read_levels(&mut tx, &change.item_id).await?;
            return match levels {
                Some(levels) => Ok(StockOutcome::Insufficient {
                    available: levels.available(),
                }),
                None => Err(DbError::not_found("Item", &change.item_id)),
            };
        };

        let movement = if change.current_delta != 0 {
            let movement = change.movement(current);
            insert_movement(&mut tx, &movement).await?;
            Some(movement)
        } else {
            None
        };

        tx.commit().await?;

        Ok(StockOutcome::Applied {
            levels: StockLevels::new(current, reserved),
            movement,
        })
    }

    /// Sets current stock to an absolute value, recording the difference
    /// as an adjustment movement.
    pub async fn set_stock(
        &self,
        item_id: &str,
        branch_id: &str,
        value: i64,
        notes: Option<String>,
    ) -> DbResult<(StockLevels, Option<InventoryMovement>)> {
        debug!(item_id = %item_id, value = value, "Setting stock");

        let mut tx = self.pool.begin().await?;

        // Write first so this transaction holds the write lock before reading.
        let touched = sqlx::query("UPDATE items SET updated_at = ?2 WHERE id = ?1")
            .bind(item_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found("Item", item_id));
        }

        let before = read_levels(&mut tx, item_id)
            .await?
            .ok_or_else(|| DbError::not_found("Item", item_id))?;
        let delta = value - before.current;

        if delta == 0 {
            tx.commit().await?;
            return Ok((before, None));
        }

        sqlx::query(
            r#"
            UPDATE items
            SET current_stock = ?2,
                available_stock = MAX(0, ?2 - reserved_stock)
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        let mut change = StockChange::adjustment(item_id, branch_id, delta);
        change.notes = notes;
        let movement = change.movement(value);
        insert_movement(&mut tx, &movement).await?;

        tx.commit().await?;

        Ok((StockLevels::new(value, before.reserved), Some(movement)))
    }
}

async fn read_levels(conn: &mut SqliteConnection, item_id: &str) -> DbResult<Option<StockLevels>> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT current_stock, reserved_stock FROM items WHERE id = ?1")
            .bind(item_id)
            .fetch_optional(conn)
            .await?;

    Ok(row.map(|(current, reserved)| StockLevels::new(current, reserved)))
}

async fn insert_movement(conn: &mut SqliteConnection, movement: &InventoryMovement) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, item_id, branch_id, movement_type, quantity, stock_before, stock_after,
            rate_cents, reference_type, reference_id, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.item_id)
    .bind(&movement.branch_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.stock_before)
    .bind(movement.stock_after)
    .bind(movement.rate_cents)
    .bind(&movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.notes)
    .bind(movement.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
