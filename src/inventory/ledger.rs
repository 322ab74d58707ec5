//! Atomic inventory upsert
//!
//! One IMMEDIATE transaction per update:
//! 1. write the denormalized copy on the survivor row
//! 2. look up the survivor's inventory record id
//! 3. insert a record if none exists, otherwise update it in place
//! 4. commit (only if nothing failed and the deadline still holds)
//!
//! "No record" means the lookup returned no row. Any other lookup failure is
//! a storage error and aborts the transaction; treating it as absence would
//! insert a second record.

use std::time::Duration;

use rusqlite::{params, OptionalExtension, Transaction};
use serde::Serialize;

use crate::core::error::{EngineError, Result};
use crate::core::types::{Inventory, SurvivorId};
use crate::store::{scoped_transaction, Store};

/// Confirmation returned after a committed update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryReceipt {
    pub survivor_id: SurvivorId,
    pub inventory: Inventory,
    /// True when this update created the survivor's inventory record
    pub created: bool,
    pub message: String,
}

impl InventoryReceipt {
    pub const MESSAGE: &'static str = "Survivor inventory updated successfully";

    fn new(survivor_id: SurvivorId, inventory: Inventory, created: bool) -> Self {
        Self {
            survivor_id,
            inventory,
            created,
            message: Self::MESSAGE.to_string(),
        }
    }
}

/// Owns the read-modify-write of survivor inventories
#[derive(Clone)]
pub struct InventoryLedger {
    store: Store,
    max_level_len: usize,
    budget: Duration,
}

impl InventoryLedger {
    pub fn new(store: Store, max_level_len: usize) -> Self {
        let budget = store.default_budget();
        Self {
            store,
            max_level_len,
            budget,
        }
    }

    /// Copy of this ledger whose operations must finish within `budget`
    pub fn with_deadline(&self, budget: Duration) -> Self {
        Self {
            budget,
            ..self.clone()
        }
    }

    /// Replace the survivor's inventory, creating the record if missing
    ///
    /// On success exactly one inventory record exists for `id` and the
    /// survivor row carries the same values. On any failure nothing from
    /// this call is visible.
    pub async fn update_inventory(
        &self,
        id: SurvivorId,
        inventory: Inventory,
    ) -> Result<InventoryReceipt> {
        inventory.validate(self.max_level_len)?;

        let created = self
            .store
            .run(self.budget, {
                let inventory = inventory.clone();
                move |conn, deadline| {
                    scoped_transaction(conn, deadline, |tx| upsert(tx, id, &inventory))
                }
            })
            .await?;

        if created {
            tracing::info!("Created inventory record for survivor {}", id);
        } else {
            tracing::debug!("Updated inventory record for survivor {}", id);
        }
        Ok(InventoryReceipt::new(id, inventory, created))
    }

    /// The survivor's canonical inventory record, if it has one
    pub async fn current(&self, id: SurvivorId) -> Result<Option<Inventory>> {
        self.store
            .run(self.budget, move |conn, _| {
                let found = conn
                    .query_row(
                        "SELECT water, food, medication, ammunition FROM inventory WHERE survivor_id = ?1",
                        params![id.get()],
                        |row| {
                            Ok(Inventory {
                                water: row.get(0)?,
                                food: row.get(1)?,
                                medication: row.get(2)?,
                                ammunition: row.get(3)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(found)
            })
            .await
    }
}

/// Returns true when a new inventory record was inserted
fn upsert(tx: &Transaction<'_>, id: SurvivorId, inventory: &Inventory) -> Result<bool> {
    let touched = tx.execute(
        "UPDATE survivors SET water = ?1, food = ?2, medication = ?3, ammunition = ?4 WHERE id = ?5",
        params![
            inventory.water,
            inventory.food,
            inventory.medication,
            inventory.ammunition,
            id.get()
        ],
    )?;
    if touched == 0 {
        return Err(EngineError::NotFound(id));
    }

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM inventory WHERE survivor_id = ?1",
            params![id.get()],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            tx.execute(
                "INSERT INTO inventory (survivor_id, water, food, medication, ammunition)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.get(),
                    inventory.water,
                    inventory.food,
                    inventory.medication,
                    inventory.ammunition
                ],
            )?;
            Ok(true)
        }
        Some(record_id) => {
            tx.execute(
                "UPDATE inventory SET water = ?1, food = ?2, medication = ?3, ammunition = ?4 WHERE id = ?5",
                params![
                    inventory.water,
                    inventory.food,
                    inventory.medication,
                    inventory.ammunition,
                    record_id
                ],
            )?;
            Ok(false)
        }
    }
}
