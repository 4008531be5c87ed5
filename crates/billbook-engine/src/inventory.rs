//! # Inventory Ledger
//!
//! Stock movements and manual adjustments. Every counter change goes
//! through [`ItemRepository::apply_stock`] or [`ItemRepository::set_stock`],
//! which write the movement row in the same transaction.
//!
//! [`ItemRepository::apply_stock`]: billbook_db::ItemRepository::apply_stock
//! [`ItemRepository::set_stock`]: billbook_db::ItemRepository::set_stock

use serde::{Deserialize, Serialize};
use tracing::info;

use billbook_core::validation::{validate_quantity, validate_reference};
use billbook_core::{
    InventoryMovement, Item, MovementType, StockAdjustMode, StockLevels, ValidationError,
};
use billbook_db::{Database, StockChange, StockOutcome};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Payloads
// =============================================================================

/// A stock movement not tied to a document line (stock-in, write-off…).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovementPayload {
    pub company_id: String,
    pub branch_id: String,
    pub item_id: String,
    pub movement_type: MovementType,
    /// Positive for `in`/`out`; signed for `adjustment`.
    pub quantity: i64,
    #[serde(default)]
    pub rate_cents: Option<i64>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockPayload {
    pub company_id: String,
    pub branch_id: String,
    pub item_id: String,
    pub mode: StockAdjustMode,
    pub value: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Counters after a movement.
#[derive(Debug, Clone, Serialize)]
pub struct MovementResult {
    pub stock_before: i64,
    pub stock_after: i64,
    pub levels: StockLevels,
    /// `None` when the change left current stock untouched.
    pub movement: Option<InventoryMovement>,
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone)]
pub struct InventoryLedger {
    db: Database,
}

impl InventoryLedger {
    pub fn new(db: Database) -> Self {
        InventoryLedger { db }
    }

    /// Applies one atomic change; a failed availability guard becomes
    /// [`EngineError::InsufficientStock`].
    pub async fn apply(&self, change: &StockChange) -> EngineResult<StockLevels> {
        match self.db.items().apply_stock(change).await? {
            StockOutcome::Applied { levels, .. } => Ok(levels),
            StockOutcome::Insufficient { available } => Err(EngineError::InsufficientStock {
                item_id: change.item_id.clone(),
                available,
                requested: change.min_available.unwrap_or_default(),
            }),
        }
    }

    pub async fn record_movement(
        &self,
        payload: &StockMovementPayload,
    ) -> EngineResult<MovementResult> {
        let item = self.resolve(&payload.company_id, &payload.branch_id, &payload.item_id).await?;

        let change = match payload.movement_type {
            MovementType::In => {
                validate_quantity(payload.quantity)?;
                StockChange::inbound(&item.id, &payload.branch_id, payload.quantity)
            }
            MovementType::Out => {
                validate_quantity(payload.quantity)?;
                StockChange::outbound(&item.id, &payload.branch_id, payload.quantity)
            }
            MovementType::Adjustment => {
                if payload.quantity == 0 {
                    return Err(ValidationError::MustBePositive {
                        field: "quantity".to_string(),
                    }
                    .into());
                }
                StockChange::adjustment(&item.id, &payload.branch_id, payload.quantity)
            }
        };

        let mut change = match (&payload.reference_type, &payload.reference_id) {
            (Some(kind), Some(id)) => change.with_reference(kind, id),
            _ => change,
        };
        if let Some(rate) = payload.rate_cents {
            change = change.with_rate(rate);
        }
        change.notes = payload.notes.clone();

        let outcome = self.db.items().apply_stock(&change).await?;
        let (levels, movement) = match outcome {
            StockOutcome::Applied { levels, movement } => (levels, movement),
            StockOutcome::Insufficient { available } => {
                return Err(EngineError::InsufficientStock {
                    item_id: item.id,
                    available,
                    requested: payload.quantity,
                })
            }
        };

        info!(
            item_id = %item.id,
            movement_type = %payload.movement_type,
            quantity = payload.quantity,
            stock_after = levels.current,
            "Recorded stock movement"
        );

        Ok(MovementResult {
            stock_before: levels.current - change.current_delta,
            stock_after: levels.current,
            levels,
            movement,
        })
    }

    pub async fn adjust_stock(&self, payload: &AdjustStockPayload) -> EngineResult<MovementResult> {
        let item = self.resolve(&payload.company_id, &payload.branch_id, &payload.item_id).await?;

        // validates the value against the mode
        item.levels().adjust(payload.mode, payload.value)?;

        let (levels, movement) = match payload.mode {
            StockAdjustMode::Set => {
                self.db
                    .items()
                    .set_stock(&item.id, &payload.branch_id, payload.value, payload.notes.clone())
                    .await?
            }
            StockAdjustMode::Increase | StockAdjustMode::Decrease => {
                let delta = if payload.mode == StockAdjustMode::Increase {
                    payload.value
                } else {
                    -payload.value
                };
                let mut change = StockChange::adjustment(&item.id, &payload.branch_id, delta);
                change.notes = payload.notes.clone();
                match self.db.items().apply_stock(&change).await? {
                    StockOutcome::Applied { levels, movement } => (levels, movement),
                    // adjustments carry no availability guard
                    StockOutcome::Insufficient { available } => {
                        return Err(EngineError::InsufficientStock {
                            item_id: item.id,
                            available,
                            requested: payload.value,
                        })
                    }
                }
            }
        };

        let stock_before = movement.as_ref().map_or(levels.current, |m| m.stock_before);
        info!(
            item_id = %item.id,
            mode = ?payload.mode,
            stock_before,
            stock_after = levels.current,
            "Adjusted stock"
        );

        Ok(MovementResult {
            stock_before,
            stock_after: levels.current,
            levels,
            movement,
        })
    }

    async fn resolve(&self, company_id: &str, branch_id: &str, item_id: &str) -> EngineResult<Item> {
        validate_reference("company_id", company_id)?;
        validate_reference("branch_id", branch_id)?;
        validate_reference("item_id", item_id)?;

        self.db
            .branches()
            .get(branch_id, company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Branch", branch_id))?;
        let item = self
            .db
            .items()
            .get(item_id, company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Item", item_id))?;

        if !item.tracks_inventory {
            return Err(ValidationError::mismatch("item_id", "item does not track inventory").into());
        }
        Ok(item)
    }
}
