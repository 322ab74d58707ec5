//! Core type definitions used throughout the codebase

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};

/// Unique identifier for survivors
///
/// Always positive; values come from the store's row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SurvivorId(i64);

impl SurvivorId {
    pub fn new(raw: i64) -> Result<Self> {
        if raw <= 0 {
            return Err(EngineError::Validation(format!(
                "survivor id must be positive, got {}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for SurvivorId {
    type Err = EngineError;

    /// Parse an id as it arrives in a request path segment
    fn from_str(s: &str) -> Result<Self> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| EngineError::Validation(format!("invalid survivor id: {:?}", s)))?;
        Self::new(raw)
    }
}

impl TryFrom<i64> for SurvivorId {
    type Error = EngineError;

    fn try_from(raw: i64) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<SurvivorId> for i64 {
    fn from(id: SurvivorId) -> i64 {
        id.0
    }
}

impl fmt::Display for SurvivorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default upper bound on the length of a resource level label
pub const DEFAULT_MAX_LEVEL_LEN: usize = 32;

/// Supply levels a survivor holds
///
/// Each field is a short qualitative label ("none", "low", "plenty"), not a
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub water: String,
    pub food: String,
    pub medication: String,
    pub ammunition: String,
}

impl Inventory {
    pub fn new(
        water: impl Into<String>,
        food: impl Into<String>,
        medication: impl Into<String>,
        ammunition: impl Into<String>,
    ) -> Self {
        Self {
            water: water.into(),
            food: food.into(),
            medication: medication.into(),
            ammunition: ammunition.into(),
        }
    }

    /// Field name / value pairs in column order
    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("water", self.water.as_str()),
            ("food", self.food.as_str()),
            ("medication", self.medication.as_str()),
            ("ammunition", self.ammunition.as_str()),
        ]
    }

    /// Reject blank or oversized level labels
    pub fn validate(&self, max_level_len: usize) -> Result<()> {
        for (field, level) in self.fields() {
            if level.trim().is_empty() {
                return Err(EngineError::Validation(format!("{} level must not be empty", field)));
            }
            let len = level.chars().count();
            if len > max_level_len {
                return Err(EngineError::Validation(format!(
                    "{} level is {} characters, limit is {}",
                    field, len, max_level_len
                )));
            }
        }
        Ok(())
    }
}

/// Geographic position of a survivor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(EngineError::Validation(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(EngineError::Validation(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Infection status of a survivor
///
/// `Infected` is terminal: no operation moves a survivor back to `Clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfectionState {
    Clean,
    Infected,
}

impl InfectionState {
    pub fn from_flag(infected: bool) -> Self {
        if infected {
            InfectionState::Infected
        } else {
            InfectionState::Clean
        }
    }

    pub fn is_infected(self) -> bool {
        self == InfectionState::Infected
    }
}

/// A survivor as stored, including the denormalized inventory copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survivor {
    pub id: SurvivorId,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub location: Option<Location>,
    pub infected: bool,
    pub contamination_reports: u32,
    pub inventory: Inventory,
}

impl Survivor {
    pub fn state(&self) -> InfectionState {
        InfectionState::from_flag(self.infected)
    }
}

/// Registration payload for a new survivor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSurvivor {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub location: Location,
    pub inventory: Inventory,
}

impl NewSurvivor {
    pub fn validate(&self, max_level_len: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("name must not be empty".into()));
        }
        if self.gender.trim().is_empty() {
            return Err(EngineError::Validation("gender must not be empty".into()));
        }
        self.location.validate()?;
        self.inventory.validate(max_level_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_survivor_id_parsing() {
        assert_eq!("42".parse::<SurvivorId>().unwrap().get(), 42);
        assert_eq!(" 9 ".parse::<SurvivorId>().unwrap().get(), 9);

        for bad in ["", "abc", "0", "-3", "4.5", "99999999999999999999"] {
            let err = bad.parse::<SurvivorId>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "input {:?}", bad);
        }
    }

    #[test]
    fn test_survivor_id_serde_rejects_non_positive() {
        let id: SurvivorId = serde_json::from_str("12").unwrap();
        assert_eq!(id.get(), 12);
        assert!(serde_json::from_str::<SurvivorId>("0").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "12");
    }

    #[test]
    fn test_inventory_validation() {
        let ok = Inventory::new("low", "none", "none", "low");
        assert!(ok.validate(DEFAULT_MAX_LEVEL_LEN).is_ok());

        let blank = Inventory::new("low", "  ", "none", "low");
        let err = blank.validate(DEFAULT_MAX_LEVEL_LEN).unwrap_err();
        assert!(err.to_string().contains("food"));

        let long = Inventory::new("low", "none", "x".repeat(33), "low");
        let err = long.validate(DEFAULT_MAX_LEVEL_LEN).unwrap_err();
        assert!(err.to_string().contains("medication"));
    }

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(45.0, -120.0).validate().is_ok());
        assert!(Location::new(90.5, 0.0).validate().is_err());
        assert!(Location::new(0.0, 181.0).validate().is_err());
        assert!(Location::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_new_survivor_validation() {
        let mut survivor = NewSurvivor {
            name: "Ada".into(),
            age: 31,
            gender: "F".into(),
            location: Location::new(1.0, 2.0),
            inventory: Inventory::new("plenty", "low", "none", "low"),
        };
        assert!(survivor.validate(DEFAULT_MAX_LEVEL_LEN).is_ok());

        survivor.name = String::new();
        assert!(survivor.validate(DEFAULT_MAX_LEVEL_LEN).is_err());
    }

    #[test]
    fn test_infection_state_from_flag() {
        assert_eq!(InfectionState::from_flag(false), InfectionState::Clean);
        assert!(InfectionState::from_flag(true).is_infected());
        assert_eq!(serde_json::to_string(&InfectionState::Infected).unwrap(), "\"infected\"");
    }
}
