//! Contamination escalation
//!
//! Reports accumulate on the survivor row; reaching the threshold flips the
//! survivor to `Infected`, which nothing ever reverses.

pub mod state_machine;

pub use state_machine::{InfectionStateMachine, ReportOutcome, Transition};

/// Contamination reports at which a survivor is marked infected
pub const CONTAMINATION_THRESHOLD: u32 = 3;

/// Whether a report count has reached the infection threshold
pub fn threshold_reached(reports: u32) -> bool {
    reports >= CONTAMINATION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        assert!(!threshold_reached(0));
        assert!(!threshold_reached(CONTAMINATION_THRESHOLD - 1));
        assert!(threshold_reached(CONTAMINATION_THRESHOLD));
        assert!(threshold_reached(CONTAMINATION_THRESHOLD + 10));
    }
}
