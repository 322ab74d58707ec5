//! Survivor Ledger - contamination escalation and inventory consistency engine

pub mod core;
pub mod engine;
pub mod infection;
pub mod inventory;
pub mod store;
pub mod survivors;

pub use crate::core::{
    AfterInfection, EngineConfig, EngineError, ErrorKind, InfectionState, Inventory, Location,
    NewSurvivor, Result, Survivor, SurvivorId,
};
pub use engine::Engine;
pub use infection::{InfectionStateMachine, ReportOutcome, Transition, CONTAMINATION_THRESHOLD};
pub use inventory::{InventoryLedger, InventoryReceipt};
pub use store::{Deadline, Store};
pub use survivors::SurvivorRegistry;
