//! Survivor supply inventory
//!
//! Each survivor has exactly one inventory record, mirrored onto the
//! survivor row. `InventoryLedger` is the only writer of both copies.

pub mod ledger;

pub use ledger::{InventoryLedger, InventoryReceipt};
