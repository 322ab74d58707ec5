pub mod config;
pub mod error;
pub mod types;

pub use config::{AfterInfection, EngineConfig};
pub use error::{EngineError, ErrorKind, Result};
pub use types::{InfectionState, Inventory, Location, NewSurvivor, Survivor, SurvivorId};
