//! Survivor registration and lookups

pub mod registry;

pub use registry::SurvivorRegistry;
