//! # Inventory Movement Repository
//!
//! Read side of the append-only movement log. Rows are written only by
//! [`ItemRepository`](crate::repository::ItemRepository), inside the same
//! transaction as the counter change they describe.

use sqlx::SqlitePool;

use crate::error::DbResult;
use billbook_core::InventoryMovement;

const MOVEMENT_COLUMNS: &str = r#"
    id, item_id, branch_id, movement_type, quantity, stock_before, stock_after,
    rate_cents, reference_type, reference_id, notes, created_at
"#;

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Movement history of an item, oldest first.
    pub async fn for_item(&self, item_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE item_id = ?1 ORDER BY rowid"
        );
        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements caused by one document, oldest first.
    pub async fn for_reference(&self, reference_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE reference_id = ?1 ORDER BY rowid"
        );
        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }
}
