//! Shared helpers for integration tests
//!
//! Seeding and inspection go straight to the database file through a side
//! connection, so assertions never depend on the code under test.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use survivor_ledger::{AfterInfection, Engine, EngineConfig, Inventory, SurvivorId};
use tempfile::TempDir;

pub fn temp_config(dir: &TempDir, after_infection: AfterInfection) -> EngineConfig {
    let mut config = EngineConfig::with_database(dir.path().join("survivors.db"));
    config.reports.after_infection = after_infection;
    config.store.max_connections = 4;
    config.store.operation_timeout_ms = 10_000;
    config
}

pub fn temp_engine(after_infection: AfterInfection) -> (Engine, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let engine = Engine::open(&temp_config(&dir, after_infection)).expect("failed to open engine");
    (engine, dir)
}

pub fn raw(engine: &Engine) -> Connection {
    let conn = Connection::open(engine.store().path()).unwrap();
    conn.busy_timeout(std::time::Duration::from_secs(10)).unwrap();
    conn
}

pub fn seed_survivor(
    engine: &Engine,
    id: i64,
    reports: u32,
    infected: bool,
    with_inventory: bool,
) -> SurvivorId {
    let conn = raw(engine);
    conn.execute(
        "INSERT INTO survivors (id, name, age, gender, infected, contamination_reports, water, food, medication, ammunition)
         VALUES (?1, 'Seeded', 40, 'M', ?2, ?3, 'some', 'some', 'some', 'some')",
        params![id, infected, reports],
    )
    .unwrap();
    if with_inventory {
        conn.execute(
            "INSERT INTO inventory (survivor_id, water, food, medication, ammunition)
             VALUES (?1, 'some', 'some', 'some', 'some')",
            params![id],
        )
        .unwrap();
    }
    SurvivorId::new(id).unwrap()
}

pub fn seeded_inventory() -> Inventory {
    Inventory::new("some", "some", "some", "some")
}

pub fn reports_and_flag(engine: &Engine, id: SurvivorId) -> (u32, bool) {
    raw(engine)
        .query_row(
            "SELECT contamination_reports, infected FROM survivors WHERE id = ?1",
            params![id.get()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
}

/// The inventory copy stored on the survivor row
pub fn denormalized_inventory(engine: &Engine, id: SurvivorId) -> Inventory {
    raw(engine)
        .query_row(
            "SELECT water, food, medication, ammunition FROM survivors WHERE id = ?1",
            params![id.get()],
            |row| {
                Ok(Inventory::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .unwrap()
}

pub fn inventory_rows(engine: &Engine, id: SurvivorId) -> Vec<Inventory> {
    let conn = raw(engine);
    let mut stmt = conn
        .prepare("SELECT water, food, medication, ammunition FROM inventory WHERE survivor_id = ?1")
        .unwrap();
    let rows = stmt
        .query_map(params![id.get()], |row| {
            Ok(Inventory::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    rows
}
