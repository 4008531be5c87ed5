//! # Inventory Arithmetic
//!
//! Pure stock rules. The database layer applies the same rules as single
//! guarded statements; these functions define what those statements must
//! compute and are what the property tests exercise.
//!
//! ## Counters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   current_stock ─────────────────────────────────┐                      │
//! │   ├── reserved_stock (pending sales orders)      │                      │
//! │   └── available_stock = max(0, current − reserved)                     │
//! │                                                                         │
//! │   outbound q   : requires available ≥ q, current −= q                   │
//! │   inbound q    : current += q                                           │
//! │   reserve q    : requires available ≥ q, reserved += q                  │
//! │   release q    : reserved −= min(reserved, q)                           │
//! │   fulfil q     : reserved part r = min(reserved, q),                    │
//! │                  requires available ≥ q − r, current −= q, reserved −= r│
//! │   adjust       : set | increase | decrease, no availability check       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Stock Levels
// =============================================================================

/// Snapshot of an item's stock counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLevels {
    pub current: i64,
    pub reserved: i64,
}

impl StockLevels {
    #[inline]
    pub const fn new(current: i64, reserved: i64) -> Self {
        StockLevels { current, reserved }
    }

    /// `max(0, current − reserved)`.
    #[inline]
    pub fn available(&self) -> i64 {
        (self.current - self.reserved).max(0)
    }

    fn require_available(&self, item_id: &str, requested: i64) -> CoreResult<()> {
        if self.available() < requested {
            return Err(CoreError::InsufficientStock {
                item_id: item_id.to_string(),
                available: self.available(),
                requested,
            });
        }
        Ok(())
    }

    pub fn outbound(&self, item_id: &str, quantity: i64) -> CoreResult<StockLevels> {
        ensure_positive("quantity", quantity)?;
        self.require_available(item_id, quantity)?;
        Ok(StockLevels::new(self.current - quantity, self.reserved))
    }

    pub fn inbound(&self, quantity: i64) -> CoreResult<StockLevels> {
        ensure_positive("quantity", quantity)?;
        Ok(StockLevels::new(self.current + quantity, self.reserved))
    }

    pub fn reserve(&self, item_id: &str, quantity: i64) -> CoreResult<StockLevels> {
        ensure_positive("quantity", quantity)?;
        self.require_available(item_id, quantity)?;
        Ok(StockLevels::new(self.current, self.reserved + quantity))
    }

    pub fn release(&self, quantity: i64) -> StockLevels {
        StockLevels::new(self.current, self.reserved - quantity.clamp(0, self.reserved))
    }

    /// Ships `quantity` against an existing reservation.
    ///
    /// Anything beyond what is reserved ships from available stock.
    pub fn fulfil(&self, item_id: &str, quantity: i64) -> CoreResult<StockLevels> {
        ensure_positive("quantity", quantity)?;
        let from_reservation = quantity.min(self.reserved).max(0);
        self.require_available(item_id, quantity - from_reservation)?;
        Ok(StockLevels::new(
            self.current - quantity,
            self.reserved - from_reservation,
        ))
    }

    /// Manual correction. Returns the new levels and the signed change.
    pub fn adjust(&self, mode: StockAdjustMode, value: i64) -> CoreResult<(StockLevels, i64)> {
        let current = match mode {
            StockAdjustMode::Set => {
                if value < 0 {
                    return Err(ValidationError::OutOfRange {
                        field: "value".to_string(),
                        min: 0,
                        max: i64::MAX,
                    }
                    .into());
                }
                value
            }
            StockAdjustMode::Increase => {
                ensure_positive("value", value)?;
                self.current + value
            }
            StockAdjustMode::Decrease => {
                ensure_positive("value", value)?;
                self.current - value
            }
        };
        Ok((StockLevels::new(current, self.reserved), current - self.current))
    }
}

fn ensure_positive(field: &str, value: i64) -> CoreResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Movements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StockAdjustMode {
    Set,
    Increase,
    Decrease,
}

/// Append-only record of one stock change.
///
/// `quantity` is a magnitude for `in`/`out` and the signed delta for
/// `adjustment`, so `stock_after == stock_before + signed_quantity()`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    pub item_id: String,
    pub branch_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub rate_cents: Option<i64>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    pub fn signed_quantity(&self) -> i64 {
        match self.movement_type {
            MovementType::In => self.quantity,
            MovementType::Out => -self.quantity,
            MovementType::Adjustment => self.quantity,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
