//! Engine facade
//!
//! Opens one store and hands out the components that own its rows. The
//! components never call each other; the facade only wires them to the
//! same connection pool.

use std::time::Duration;

use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::infection::InfectionStateMachine;
use crate::inventory::InventoryLedger;
use crate::store::Store;
use crate::survivors::SurvivorRegistry;

#[derive(Clone)]
pub struct Engine {
    store: Store,
    infection: InfectionStateMachine,
    inventory: InventoryLedger,
    survivors: SurvivorRegistry,
}

impl Engine {
    /// Validate `config`, open its store and build the components
    pub fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = Store::open(&config.store)?;
        let max_level_len = config.inventory.max_level_len;

        Ok(Self {
            infection: InfectionStateMachine::new(store.clone(), config.reports.after_infection),
            inventory: InventoryLedger::new(store.clone(), max_level_len),
            survivors: SurvivorRegistry::new(store.clone(), max_level_len),
            store,
        })
    }

    /// Same engine with every operation bounded by `budget`
    pub fn with_deadline(&self, budget: Duration) -> Self {
        Self {
            store: self.store.clone(),
            infection: self.infection.with_deadline(budget),
            inventory: self.inventory.with_deadline(budget),
            survivors: self.survivors.with_deadline(budget),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn infection(&self) -> &InfectionStateMachine {
        &self.infection
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    pub fn survivors(&self) -> &SurvivorRegistry {
        &self.survivors
    }
}
