//! Survivor registry
//!
//! Creates survivors together with their initial inventory record, moves
//! them between locations, and reads them back. It never writes the
//! infection fields (new rows take the schema defaults) nor touches an
//! existing inventory.

use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::core::error::{EngineError, Result};
use crate::core::types::{Inventory, Location, NewSurvivor, Survivor, SurvivorId};
use crate::store::{scoped_transaction, Store};

const SELECT_SURVIVOR: &str = "
    SELECT s.id, s.name, s.age, s.gender, l.latitude, l.longitude,
           s.infected, s.contamination_reports,
           s.water, s.food, s.medication, s.ammunition
    FROM survivors s
    LEFT JOIN locations l ON l.id = s.location_id";

#[derive(Clone)]
pub struct SurvivorRegistry {
    store: Store,
    max_level_len: usize,
    budget: Duration,
}

impl SurvivorRegistry {
    pub fn new(store: Store, max_level_len: usize) -> Self {
        let budget = store.default_budget();
        Self {
            store,
            max_level_len,
            budget,
        }
    }

    pub fn with_deadline(&self, budget: Duration) -> Self {
        Self {
            budget,
            ..self.clone()
        }
    }

    /// Register a survivor and its initial inventory in one transaction
    pub async fn register(&self, survivor: NewSurvivor) -> Result<Survivor> {
        survivor.validate(self.max_level_len)?;

        let id = self
            .store
            .run(self.budget, {
                let survivor = survivor.clone();
                move |conn, deadline| {
                    scoped_transaction(conn, deadline, |tx| insert_survivor(tx, &survivor))
                }
            })
            .await?;
        tracing::info!("Registered survivor {} ({})", id, survivor.name);

        Ok(Survivor {
            id,
            name: survivor.name,
            age: survivor.age,
            gender: survivor.gender,
            location: Some(survivor.location),
            infected: false,
            contamination_reports: 0,
            inventory: survivor.inventory,
        })
    }

    /// Move a survivor to `location`, creating the location row if needed
    pub async fn update_location(&self, id: SurvivorId, location: Location) -> Result<()> {
        location.validate()?;
        self.store
            .run(self.budget, move |conn, deadline| {
                scoped_transaction(conn, deadline, |tx| {
                    let location_id = resolve_location(tx, location)?;
                    let touched = tx.execute(
                        "UPDATE survivors SET location_id = ?1 WHERE id = ?2",
                        params![location_id, id.get()],
                    )?;
                    if touched == 0 {
                        return Err(EngineError::NotFound(id));
                    }
                    Ok(())
                })
            })
            .await?;
        tracing::debug!(
            "Survivor {} moved to ({}, {})",
            id,
            location.latitude,
            location.longitude
        );
        Ok(())
    }

    pub async fn get(&self, id: SurvivorId) -> Result<Survivor> {
        self.store
            .run(self.budget, move |conn, _| {
                conn.query_row(
                    &format!("{} WHERE s.id = ?1", SELECT_SURVIVOR),
                    params![id.get()],
                    survivor_from_row,
                )
                .optional()?
                .ok_or(EngineError::NotFound(id))
            })
            .await
    }

    /// All survivors with the given infection flag, ordered by id
    pub async fn list(&self, infected: bool) -> Result<Vec<Survivor>> {
        self.store
            .run(self.budget, move |conn, _| list_by_flag(conn, infected))
            .await
    }
}

fn insert_survivor(tx: &Transaction<'_>, survivor: &NewSurvivor) -> Result<SurvivorId> {
    let location_id = resolve_location(tx, survivor.location)?;
    let inventory = &survivor.inventory;

    let raw_id: i64 = tx.query_row(
        "INSERT INTO survivors (name, age, gender, location_id, water, food, medication, ammunition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING id",
        params![
            survivor.name,
            survivor.age,
            survivor.gender,
            location_id,
            inventory.water,
            inventory.food,
            inventory.medication,
            inventory.ammunition
        ],
        |row| row.get(0),
    )?;
    let id = SurvivorId::new(raw_id)?;

    tx.execute(
        "INSERT INTO inventory (survivor_id, water, food, medication, ammunition)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            raw_id,
            inventory.water,
            inventory.food,
            inventory.medication,
            inventory.ammunition
        ],
    )?;
    Ok(id)
}

/// Id of the location row for these coordinates, inserting it if absent
fn resolve_location(tx: &Transaction<'_>, location: Location) -> Result<i64> {
    tx.execute(
        "INSERT OR IGNORE INTO locations (latitude, longitude) VALUES (?1, ?2)",
        params![location.latitude, location.longitude],
    )?;
    Ok(tx.query_row(
        "SELECT id FROM locations WHERE latitude = ?1 AND longitude = ?2",
        params![location.latitude, location.longitude],
        |row| row.get(0),
    )?)
}

fn list_by_flag(conn: &Connection, infected: bool) -> Result<Vec<Survivor>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE s.infected = ?1 ORDER BY s.id",
        SELECT_SURVIVOR
    ))?;
    let survivors = stmt
        .query_map(params![infected], survivor_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(survivors)
}

fn survivor_from_row(row: &Row<'_>) -> rusqlite::Result<Survivor> {
    let raw_id: i64 = row.get(0)?;
    let latitude: Option<f64> = row.get(4)?;
    let longitude: Option<f64> = row.get(5)?;
    Ok(Survivor {
        // Row ids from AUTOINCREMENT are always positive
        id: SurvivorId::new(raw_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        location: latitude.zip(longitude).map(|(lat, lon)| Location::new(lat, lon)),
        infected: row.get(6)?,
        contamination_reports: row.get(7)?,
        inventory: Inventory {
            water: row.get(8)?,
            food: row.get(9)?,
            medication: row.get(10)?,
            ammunition: row.get(11)?,
        },
    })
}
